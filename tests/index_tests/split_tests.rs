//! Tests for block splitting
//!
//! These tests verify:
//! - Slot ownership: every slot points at the block whose id matches the
//!   slot's low `depth` bits
//! - Every key lives in exactly one block, the one its slot points at
//! - IndexFull when keys cannot be separated, with the index left readable

use std::collections::HashMap;

use exthash::handler::{LongKey, LongValue};
use exthash::{Config, HashIndex, IndexError};

// =============================================================================
// Helper Functions
// =============================================================================

fn long_index(index_size: usize, records_per_block: usize) -> HashIndex<LongKey, LongValue> {
    let config = Config::builder()
        .index_size(index_size)
        .records_per_block(records_per_block)
        .build();
    HashIndex::in_memory(&config, LongKey, LongValue).unwrap()
}

/// Check slot ownership and record placement across the whole index
fn assert_consistent(index: &HashIndex<LongKey, LongValue>, keys: &[i64]) {
    let mut headers = HashMap::new();
    for offset in index.block_offsets() {
        headers.insert(offset, index.block_header(offset).unwrap());
    }
    assert_eq!(headers.len(), index.block_count());

    for slot in 0..index.index_size() {
        let offset = index.slot_block(slot).unwrap();
        let header = headers.get(&offset).expect("slot points at an allocated block");
        let mask = (1usize << header.depth) - 1;
        assert_eq!(slot & mask, header.id as usize, "slot {} owned by wrong block", slot);
    }

    let mut seen = HashMap::new();
    for offset in index.block_offsets() {
        let entries = index.block_entries(offset).unwrap();
        assert_eq!(entries.len(), headers[&offset].fill_count);
        for (key, _) in entries {
            assert!(seen.insert(key, offset).is_none(), "key {} stored twice", key);
        }
    }

    for key in keys {
        let offset = index.block_offset_of(key).unwrap();
        assert_eq!(seen.get(key), Some(&offset), "key {} not in its block", key);
    }
    assert_eq!(seen.len(), keys.len());
}

// =============================================================================
// Split Tests
// =============================================================================

#[test]
fn test_split_on_full_block() {
    let mut index = long_index(8, 2);

    index.put(&1, &10).unwrap();
    index.put(&2, &20).unwrap();
    assert_eq!(index.block_count(), 1);

    index.put(&3, &30).unwrap();
    assert_eq!(index.block_count(), 2);

    // Key 1's hash has bit 0 set, keys 2 and 3 don't
    let new_block = index.block_header(index.block_offset_of(&1).unwrap()).unwrap();
    assert_eq!(new_block.id, 1);
    assert_eq!(new_block.depth, 1);
    assert_eq!(new_block.fill_count, 1);

    let old_block = index.block_header(index.block_offset_of(&2).unwrap()).unwrap();
    assert_eq!(old_block.id, 0);
    assert_eq!(old_block.depth, 1);
    assert_eq!(old_block.fill_count, 2);

    assert_consistent(&index, &[1, 2, 3]);
}

#[test]
fn test_cascading_splits_keep_every_key() {
    let mut index = long_index(8, 2);
    for key in 1..=5 {
        index.put(&key, &(key * 10)).unwrap();
    }

    assert_eq!(index.block_count(), 4);
    assert_consistent(&index, &[1, 2, 3, 4, 5]);
}

#[test]
fn test_split_compacts_tombstones() {
    let mut index = long_index(64, 4);
    for key in 0..4 {
        index.put(&key, &key).unwrap();
    }
    index.remove(&1).unwrap();
    index.remove(&2).unwrap();

    // Refill, then force splits
    for key in 10..40 {
        index.put(&key, &key).unwrap();
    }

    let mut keys: Vec<i64> = vec![0, 3];
    keys.extend(10..40);
    assert_consistent(&index, &keys);
    for key in [1, 2] {
        assert_eq!(index.get(&key).unwrap(), None);
    }
}

#[test]
fn test_large_index_consistency() {
    let mut index = long_index(256, 12);
    let keys: Vec<i64> = (0..800).map(|k| k * 7919).collect();
    for key in &keys {
        index.put(key, &(key + 1)).unwrap();
    }

    assert_consistent(&index, &keys);
    assert!(index.block_count() <= index.index_size());
    for key in &keys {
        assert_eq!(index.get(key).unwrap(), Some(key + 1));
    }
}

// =============================================================================
// IndexFull Tests
// =============================================================================

#[test]
fn test_index_full_when_hashes_share_all_address_bits() {
    // The hashes of 4 and 7 agree on their low 8 bits
    let mut index = long_index(256, 1);
    index.put(&4, &40).unwrap();

    let err = index.put(&7, &70).unwrap_err();
    match &err {
        IndexError::IndexFull {
            block_id,
            block_depth,
            index_size,
            diagnostics,
        } => {
            assert_eq!(*block_depth, 8);
            assert_eq!(*index_size, 256);
            assert_eq!(*block_id, 0b0001_0100);
            assert!(diagnostics.contains("block keys: [4]"));
            assert!(diagnostics.contains("records: 1"));
        }
        other => panic!("expected IndexFull, got {:?}", other),
    }
    assert!(err.to_string().contains("Index is full"));

    // Eight splits separated the other address bits before giving up
    assert_eq!(index.block_count(), 9);
    assert_eq!(index.get(&4).unwrap(), Some(40));
    assert_eq!(index.get(&7).unwrap(), None);
    assert_consistent(&index, &[4]);

    // Other keys can still be inserted
    index.put(&1, &10).unwrap();
    assert_eq!(index.get(&1).unwrap(), Some(10));
}

#[test]
fn test_index_of_size_one_cannot_split() {
    let mut index = long_index(1, 2);
    index.put(&1, &1).unwrap();
    index.put(&2, &2).unwrap();

    let result = index.put(&3, &3);
    assert!(matches!(
        result,
        Err(IndexError::IndexFull { block_depth: 0, index_size: 1, .. })
    ));
    assert_eq!(index.block_count(), 1);
    assert_eq!(index.get(&1).unwrap(), Some(1));
    assert_eq!(index.get(&2).unwrap(), Some(2));
}
