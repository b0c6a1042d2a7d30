//! Tests for the bucket array
//!
//! These tests verify:
//! - Bucket allocation across buffers and buffer release
//! - Block add/find/update/remove inside overflow chains
//! - Block relocation between buckets
//! - Bucket removal, abandoned overflow buckets and the highest id
//! - Stream round trip and rejection of corrupt streams

use exthash::bucket::{
    bucket_address, ABANDONED_BUCKET, ALLOCATION_FACTOR, BUCKET_DATA_OFFSET,
    BUFFER_HEADER_LENGTH, MAIN_HEADER_LENGTH, NO_BUCKET, OVERFLOW_BUCKET,
};
use exthash::bucket::{BlockPosition, BucketArray};
use exthash::handler::{BytesKey, BytesValue, LongKey, LongValue};
use exthash::IndexError;

// =============================================================================
// Helper Functions
// =============================================================================

const BLOCK_LENGTH: usize = 16;
const BUCKET_LENGTH: usize = BUCKET_DATA_OFFSET + 2 * BLOCK_LENGTH;

fn long_array(max_bucket_blocks: usize) -> BucketArray<LongKey, LongValue> {
    BucketArray::new(LongKey, LongValue, max_bucket_blocks).unwrap()
}

/// Address of the `index`th bucket of a buffer when buckets hold two blocks
fn nth_bucket(buffer_id: usize, index: usize) -> u64 {
    bucket_address(buffer_id, BUFFER_HEADER_LENGTH + index * BUCKET_LENGTH)
}

/// Offset of the `index`th block in a bucket
fn nth_block(index: usize) -> usize {
    BUCKET_DATA_OFFSET + index * BLOCK_LENGTH
}

fn snapshot(array: &BucketArray<LongKey, LongValue>) -> Vec<u8> {
    let mut out = Vec::new();
    array.write_to_stream(&mut out).unwrap();
    out
}

// =============================================================================
// Creation Tests
// =============================================================================

#[test]
fn test_new_array_geometry() {
    let array = long_array(2);

    assert_eq!(array.buffer_count(), 1);
    assert_eq!(array.bucket_count(), 0);
    assert_eq!(array.block_count(), 0);
    assert_eq!(array.block_length(), BLOCK_LENGTH);
    assert_eq!(array.max_bucket_length(), BUCKET_LENGTH);
    assert_eq!(
        array.max_buffer_length(),
        BUFFER_HEADER_LENGTH + ALLOCATION_FACTOR * BUCKET_LENGTH
    );
    assert_eq!(array.first_bucket_offset(), BUFFER_HEADER_LENGTH);
    assert_eq!(array.first_block_offset(), BUCKET_DATA_OFFSET);
    assert_eq!(array.capacity(), array.max_buffer_length());
    assert_eq!(array.size(), MAIN_HEADER_LENGTH + BUFFER_HEADER_LENGTH);
    assert_eq!(array.load_factor(), 0.0);
}

#[test]
fn test_new_rejects_zero_blocks() {
    let result = BucketArray::new(LongKey, LongValue, 0);
    assert!(matches!(result, Err(IndexError::InvalidArgument(_))));
}

#[test]
fn test_new_rejects_unaddressable_buffer() {
    let result = BucketArray::new(BytesKey::new(1 << 20), BytesValue::new(1 << 20), 64);
    assert!(matches!(
        result,
        Err(IndexError::InvalidArgument(msg)) if msg.contains("integer maximum")
    ));
}

#[test]
fn test_allocate_rejects_invalid_id_or_depth() {
    let mut array = long_array(2);

    assert!(matches!(array.allocate_new_bucket(-1, 0), Err(IndexError::InvalidArgument(_))));
    assert!(matches!(array.allocate_new_bucket(0, -2), Err(IndexError::InvalidArgument(_))));
    assert!(array.allocate_new_bucket(0, OVERFLOW_BUCKET).is_ok());
    assert_eq!(array.bucket_count(), 1);
}

// =============================================================================
// Block Tests
// =============================================================================

#[test]
fn test_add_find_read_update() {
    let mut array = long_array(2);
    let bucket = array.allocate_new_bucket(0, 0).unwrap();
    assert_eq!(bucket, nth_bucket(0, 0));
    assert_ne!(bucket, NO_BUCKET);

    assert!(array.add_block(bucket, &1, &10).unwrap());
    assert!(array.add_block(bucket, &2, &20).unwrap());

    let position = array.find(bucket, &2).unwrap().unwrap();
    assert_eq!(position, BlockPosition { bucket, offset: nth_block(1) });
    assert_eq!(array.read_key(bucket, position.offset).unwrap(), 2);
    assert_eq!(array.read_value(bucket, position.offset).unwrap(), 20);
    assert!(array.key_equals(bucket, position.offset, &2).unwrap());
    assert!(!array.key_equals(bucket, position.offset, &1).unwrap());

    array.update_value(bucket, position.offset, &21).unwrap();
    assert_eq!(array.read_value(bucket, position.offset).unwrap(), 21);

    assert_eq!(array.find(bucket, &3).unwrap(), None);
    assert_eq!(array.block_count(), 2);
    assert_eq!(array.bucket_fill_count(bucket).unwrap(), 2);
    assert_eq!(array.bucket_length(bucket).unwrap(), BUCKET_LENGTH);
}

#[test]
fn test_add_to_full_chain_then_overflow() {
    let mut array = long_array(2);
    let bucket = array.allocate_new_bucket(5, 3).unwrap();
    array.add_block(bucket, &1, &10).unwrap();
    array.add_block(bucket, &2, &20).unwrap();

    assert!(!array.add_block(bucket, &3, &30).unwrap());
    assert_eq!(array.block_count(), 2);

    let overflow = array.overflow(bucket).unwrap();
    assert_eq!(array.bucket_overflow_pointer(bucket).unwrap(), overflow);
    assert_eq!(array.bucket_id(overflow).unwrap(), 5);
    assert_eq!(array.bucket_depth(overflow).unwrap(), OVERFLOW_BUCKET);
    assert_eq!(array.bucket_overflow_count(bucket).unwrap(), 1);

    assert!(array.add_block(bucket, &3, &30).unwrap());
    assert_eq!(array.find(bucket, &3).unwrap().unwrap().bucket, overflow);
    assert_eq!(array.find(bucket, &1).unwrap().unwrap().bucket, bucket);
    assert_eq!(array.block_count(), 3);
    assert!((array.load_factor() - 0.75).abs() < f64::EPSILON);

    // A second overflow bucket goes to the end of the chain
    array.add_block(bucket, &4, &40).unwrap();
    let second = array.overflow(bucket).unwrap();
    assert_eq!(array.bucket_overflow_pointer(overflow).unwrap(), second);
    assert_eq!(array.bucket_overflow_count(bucket).unwrap(), 2);
}

#[test]
fn test_add_rejects_oversized_key() {
    let mut array = BucketArray::new(BytesKey::new(4), LongValue, 2).unwrap();
    let bucket = array.allocate_new_bucket(0, 0).unwrap();

    let result = array.add_block(bucket, b"abcde".as_slice(), &1);
    assert!(matches!(result, Err(IndexError::InvalidArgument(_))));
    assert_eq!(array.bucket_fill_count(bucket).unwrap(), 0);
    assert_eq!(array.block_count(), 0);
}

#[test]
fn test_remove_block_shifts_tail() {
    let mut array = long_array(3);
    let bucket = array.allocate_new_bucket(0, 0).unwrap();
    for key in 1..=3 {
        array.add_block(bucket, &key, &(key * 10)).unwrap();
    }

    assert_eq!(array.remove_block(bucket, array.first_block_offset()).unwrap(), 2);
    assert_eq!(array.block_count(), 2);
    assert_eq!(array.find(bucket, &1).unwrap(), None);
    assert_eq!(array.find(bucket, &2).unwrap().unwrap().offset, BUCKET_DATA_OFFSET);
    assert_eq!(array.find(bucket, &3).unwrap().unwrap().offset, BUCKET_DATA_OFFSET + BLOCK_LENGTH);

    // The freed slot is no longer a block
    let result = array.read_value(bucket, BUCKET_DATA_OFFSET + 2 * BLOCK_LENGTH);
    assert!(matches!(result, Err(IndexError::InvalidArgument(_))));
}

#[test]
fn test_invalid_addresses_rejected() {
    let mut array = long_array(2);
    array.allocate_new_bucket(0, 0).unwrap();

    assert!(matches!(array.bucket_fill_count(NO_BUCKET), Err(IndexError::InvalidArgument(_))));
    assert!(matches!(array.bucket_fill_count(nth_bucket(0, 1)), Err(IndexError::InvalidArgument(_))));
    assert!(matches!(array.bucket_fill_count(nth_bucket(3, 0)), Err(IndexError::InvalidArgument(_))));
    assert!(matches!(array.bucket_fill_count(nth_bucket(0, 0) + 1), Err(IndexError::InvalidArgument(_))));
}

// =============================================================================
// Relocation Tests
// =============================================================================

#[test]
fn test_relocate_block_into_full_chain_overflows() {
    let mut array = long_array(2);
    let source = array.allocate_new_bucket(0, 1).unwrap();
    let destination = array.allocate_new_bucket(1, 1).unwrap();
    array.add_block(source, &1, &10).unwrap();
    array.add_block(source, &2, &20).unwrap();
    array.add_block(destination, &3, &30).unwrap();
    array.add_block(destination, &4, &40).unwrap();

    array.relocate_block(source, nth_block(0), destination).unwrap();

    assert_eq!(array.bucket_fill_count(source).unwrap(), 1);
    assert_eq!(array.bucket_overflow_count(destination).unwrap(), 1);
    let moved = array.find(destination, &1).unwrap().unwrap();
    assert_eq!(moved.bucket, array.bucket_overflow_pointer(destination).unwrap());
    assert_eq!(array.read_value(moved.bucket, moved.offset).unwrap(), 10);
    assert_eq!(array.find(source, &1).unwrap(), None);
    assert_eq!(array.block_count(), 4);
}

#[test]
fn test_relocate_block_uses_free_space_first() {
    let mut array = long_array(2);
    let source = array.allocate_new_bucket(0, 1).unwrap();
    let destination = array.allocate_new_bucket(1, 1).unwrap();
    array.add_block(source, &1, &10).unwrap();

    array.relocate_block(source, nth_block(0), destination).unwrap();

    assert_eq!(array.bucket_overflow_count(destination).unwrap(), 0);
    assert_eq!(array.find(destination, &1).unwrap().unwrap().bucket, destination);
    assert_eq!(array.bucket_fill_count(source).unwrap(), 0);
    assert_eq!(array.bucket_count(), 2);
}

#[test]
fn test_relocate_blocks_from_bucket() {
    let mut array = long_array(3);
    let source = array.allocate_new_bucket(0, 0).unwrap();
    let destination = array.allocate_new_bucket(1, 0).unwrap();
    array.add_block(source, &1, &10).unwrap();
    array.add_block(source, &2, &20).unwrap();
    array.add_block(destination, &3, &30).unwrap();

    array.relocate_blocks_from_bucket(source, destination).unwrap();

    assert_eq!(array.bucket_fill_count(source).unwrap(), 0);
    assert_eq!(array.bucket_fill_count(destination).unwrap(), 3);
    let moved = array.find(destination, &2).unwrap().unwrap();
    assert_eq!(moved.offset, BUCKET_DATA_OFFSET + 2 * BLOCK_LENGTH);
    assert_eq!(array.read_value(destination, moved.offset).unwrap(), 20);
    assert_eq!(array.block_count(), 3);
}

#[test]
fn test_relocate_blocks_needs_room() {
    let mut array = long_array(2);
    let source = array.allocate_new_bucket(0, 0).unwrap();
    let destination = array.allocate_new_bucket(1, 0).unwrap();
    array.add_block(source, &1, &10).unwrap();
    array.add_block(destination, &2, &20).unwrap();
    array.add_block(destination, &3, &30).unwrap();

    let result = array.relocate_blocks_from_bucket(source, destination);
    assert!(matches!(result, Err(IndexError::InvalidArgument(msg)) if msg.contains("not enough space")));
    assert_eq!(array.bucket_fill_count(source).unwrap(), 1);

    let result = array.relocate_blocks_from_bucket(source, source);
    assert!(matches!(result, Err(IndexError::InvalidArgument(_))));
}

// =============================================================================
// Bucket Removal Tests
// =============================================================================

#[test]
fn test_remove_last_buckets() {
    let mut array = long_array(2);
    let first = array.allocate_new_bucket(0, 1).unwrap();
    let second = array.allocate_new_bucket(1, 1).unwrap();
    assert_eq!(array.highest_bucket_id(), 1);
    assert!(array.is_bucket_removable(second));
    assert!(!array.is_bucket_removable(first));

    assert_eq!(array.remove_bucket(second).unwrap(), first);
    assert_eq!(array.highest_bucket_id(), 0);
    assert_eq!(array.bucket_count(), 1);

    assert_eq!(array.remove_bucket(first).unwrap(), NO_BUCKET);
    assert_eq!(array.bucket_count(), 0);
    assert_eq!(array.buffer_count(), 1);
}

#[test]
fn test_remove_non_empty_bucket_fails() {
    let mut array = long_array(2);
    let bucket = array.allocate_new_bucket(0, 0).unwrap();
    array.add_block(bucket, &1, &10).unwrap();

    let result = array.remove_bucket(bucket);
    assert!(matches!(result, Err(IndexError::InvalidArgument(msg)) if msg.contains("not empty")));
    assert_eq!(array.bucket_count(), 1);
}

#[test]
fn test_remove_from_empty_buffer_fails() {
    let mut array = long_array(2);
    let result = array.remove_bucket(nth_bucket(0, 0));
    assert!(matches!(result, Err(IndexError::InvalidArgument(msg)) if msg.contains("No bucket")));
}

#[test]
fn test_emptied_overflow_bucket_is_abandoned() {
    let mut array = long_array(2);
    let bucket = array.allocate_new_bucket(0, 0).unwrap();
    let overflow = array.overflow(bucket).unwrap();
    let last = array.allocate_new_bucket(2, 1).unwrap();

    array.remove_overflow_bucket(bucket, overflow).unwrap();
    assert_eq!(array.bucket_overflow_pointer(bucket).unwrap(), NO_BUCKET);
    assert!(!array.is_bucket_removable(overflow));

    // Not the last bucket: marked and kept, the last bucket is next in line
    assert_eq!(array.remove_bucket(overflow).unwrap(), last);
    assert_eq!(array.bucket_depth(overflow).unwrap(), ABANDONED_BUCKET);
    assert_eq!(array.bucket_count(), 3);
    assert!(array.to_string().contains("Abandoned-Bucket-0"));

    assert_eq!(array.remove_bucket(last).unwrap(), overflow);
    assert_eq!(array.highest_bucket_id(), 0);
    assert_eq!(array.remove_bucket(overflow).unwrap(), bucket);
    assert_eq!(array.bucket_count(), 1);
}

#[test]
fn test_remove_overflow_bucket_mid_chain() {
    let mut array = long_array(1);
    let bucket = array.allocate_new_bucket(0, 0).unwrap();
    let first = array.overflow(bucket).unwrap();
    let second = array.overflow(bucket).unwrap();

    array.remove_overflow_bucket(bucket, first).unwrap();

    assert_eq!(array.bucket_overflow_pointer(bucket).unwrap(), second);
    assert_eq!(array.bucket_overflow_count(bucket).unwrap(), 1);
}

// =============================================================================
// Buffer Tests
// =============================================================================

#[test]
fn test_buckets_spill_into_new_buffer() {
    let mut array = long_array(2);
    let mut addresses = Vec::new();
    for id in 0..=ALLOCATION_FACTOR as i32 {
        addresses.push(array.allocate_new_bucket(id, 6).unwrap());
    }

    assert_eq!(array.buffer_count(), 2);
    assert_eq!(array.buffer_bucket_count(0), ALLOCATION_FACTOR);
    assert_eq!(array.buffer_bucket_count(1), 1);
    assert_eq!(addresses[ALLOCATION_FACTOR], nth_bucket(1, 0));
    assert_eq!(array.capacity(), 2 * array.max_buffer_length());
    assert_eq!(array.bucket_addresses(), addresses);
    assert_eq!(array.highest_bucket_id(), ALLOCATION_FACTOR as i32);

    // Removing the only bucket of the second buffer releases it
    let next = array.remove_bucket(addresses[ALLOCATION_FACTOR]).unwrap();
    assert_eq!(next, nth_bucket(0, ALLOCATION_FACTOR - 1));
    assert_eq!(array.buffer_count(), 1);
    assert_eq!(array.highest_bucket_id(), ALLOCATION_FACTOR as i32 - 1);

    // and the next bucket goes back into a fresh second buffer
    assert_eq!(array.allocate_new_bucket(40, 6).unwrap(), nth_bucket(1, 0));
    assert_eq!(array.highest_bucket_id(), 40);
}

#[test]
fn test_clear_releases_buffers() {
    let mut array = long_array(2);
    for id in 0..40 {
        let bucket = array.allocate_new_bucket(id, 6).unwrap();
        array.add_block(bucket, &(id as i64), &0).unwrap();
    }

    array.clear();

    assert_eq!(array.buffer_count(), 1);
    assert_eq!(array.bucket_count(), 0);
    assert_eq!(array.block_count(), 0);
    assert_eq!(array.highest_bucket_id(), 0);
    assert_eq!(array.allocate_new_bucket(0, 0).unwrap(), nth_bucket(0, 0));
}

#[test]
fn test_search_highest_bucket_id() {
    let mut array = long_array(2);
    array.allocate_new_bucket(3, 2).unwrap();
    array.allocate_new_bucket(7, 3).unwrap();
    array.allocate_new_bucket(1, 2).unwrap();

    assert_eq!(array.search_highest_bucket_id(), 7);
}

// =============================================================================
// Display Tests
// =============================================================================

#[test]
fn test_display_lists_buckets_and_blocks() {
    let mut array = long_array(2);
    let bucket = array.allocate_new_bucket(0, 0).unwrap();
    array.add_block(bucket, &1, &10).unwrap();
    array.add_block(bucket, &2, &20).unwrap();
    let overflow = array.overflow(bucket).unwrap();
    array.add_block(overflow, &3, &30).unwrap();

    assert_eq!(
        array.to_string(),
        "Bucket-0 [depth: 0, fill: 2/2] {1 => 10, 2 => 20}\n\
         Overflow-Bucket-0 [depth: -1, fill: 1/2] {3 => 30}\n"
    );
}

// =============================================================================
// Stream Tests
// =============================================================================

fn populated_array() -> BucketArray<LongKey, LongValue> {
    let mut array = long_array(2);
    for id in 0..ALLOCATION_FACTOR as i32 + 3 {
        let bucket = array.allocate_new_bucket(id, 6).unwrap();
        let key = id as i64 * 100;
        array.add_block(bucket, &key, &(key + 1)).unwrap();
    }
    let first = nth_bucket(0, 0);
    array.add_block(first, &-1, &-2).unwrap();
    let overflow = array.overflow(first).unwrap();
    array.add_block(overflow, &-3, &-4).unwrap();
    array
}

#[test]
fn test_stream_round_trip() {
    let source = populated_array();
    let bytes = snapshot(&source);
    assert_eq!(bytes.len(), source.size());

    let mut target = long_array(2);
    target.read_from_stream(&mut bytes.as_slice()).unwrap();

    assert_eq!(target.buffer_count(), source.buffer_count());
    assert_eq!(target.bucket_count(), source.bucket_count());
    assert_eq!(target.block_count(), source.block_count());
    assert_eq!(target.highest_bucket_id(), source.highest_bucket_id());
    assert_eq!(target.to_string(), source.to_string());

    let first = nth_bucket(0, 0);
    let position = target.find(first, &-3).unwrap().unwrap();
    assert_eq!(target.read_value(position.bucket, position.offset).unwrap(), -4);

    // Allocation continues where the source left off
    let next = target.allocate_new_bucket(100, 7).unwrap();
    assert_eq!(next, nth_bucket(1, 4));
}

#[test]
fn test_truncated_stream_keeps_contents() {
    let bytes = snapshot(&populated_array());

    let mut target = long_array(2);
    let bucket = target.allocate_new_bucket(9, 0).unwrap();
    target.add_block(bucket, &5, &50).unwrap();

    for cut in [0, MAIN_HEADER_LENGTH + 4, bytes.len() - 1] {
        let result = target.read_from_stream(&mut &bytes[..cut]);
        assert!(matches!(result, Err(IndexError::CorruptFormat(msg)) if msg.contains("Failed to read")));
    }

    assert_eq!(target.bucket_count(), 1);
    assert_eq!(target.highest_bucket_id(), 9);
    assert_eq!(target.read_value(bucket, BUCKET_DATA_OFFSET).unwrap(), 50);
}

#[test]
fn test_stream_with_wrong_counts_rejected() {
    let bytes = snapshot(&populated_array());
    let mut target = long_array(2);

    // Header bucket count
    let mut corrupt = bytes.clone();
    corrupt[4] = corrupt[4].wrapping_add(1);
    assert!(matches!(
        target.read_from_stream(&mut corrupt.as_slice()),
        Err(IndexError::CorruptFormat(_))
    ));

    // Fill count of the first bucket beyond max_bucket_blocks
    let mut corrupt = bytes.clone();
    let fill = MAIN_HEADER_LENGTH + BUFFER_HEADER_LENGTH;
    corrupt[fill..fill + 4].copy_from_slice(&99i32.to_le_bytes());
    assert!(matches!(
        target.read_from_stream(&mut corrupt.as_slice()),
        Err(IndexError::CorruptFormat(msg)) if msg.contains("claims 99 blocks")
    ));

    // Buffer claiming more buckets than fit
    let mut corrupt = bytes;
    corrupt[MAIN_HEADER_LENGTH..MAIN_HEADER_LENGTH + 4]
        .copy_from_slice(&(ALLOCATION_FACTOR as i32 + 1).to_le_bytes());
    assert!(matches!(
        target.read_from_stream(&mut corrupt.as_slice()),
        Err(IndexError::CorruptFormat(_))
    ));

    assert_eq!(target.bucket_count(), 0);
}
