//! Extensible hash index engine

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{IndexError, Result};
use crate::handler::{KeyHandler, ValueHandler};
use crate::layout::{
    index_table_length, read_i32, read_i64, slot_offset, write_i32, write_i64, BlockLayout,
    BLOCK_COUNT_OFFSET, BLOCK_FILL_COUNT_OFFSET, INDEX_OFFSET, RECORD_TYPE_OFFSET, TYPE_RECORD,
    TYPE_TOMBSTONE,
};
use crate::store::{BlockStore, FileStore, MemoryStore};

use super::header::{BlockHeader, IndexMetadata};
use super::scan::{scan_block, Visit};
use super::stats::IndexStats;

/// A key encoded and hashed for one operation
struct StagedKey {
    encoded: Vec<u8>,
    hash: u64,
}

/// Extensible hash index over two block stores
///
/// ## Addressing
/// `slot = hash(key) & (index_size - 1)` selects an index table slot, which
/// holds the offset of the block owning that slot. A block with depth `d`
/// owns every slot whose low `d` bits equal its id, so several slots share a
/// block until it is split.
///
/// ## Concurrency
/// Not thread-safe. Mutations take `&mut self`; share an index across
/// threads only behind an external lock (see [`crate::Shared`]).
pub struct HashIndex<K, V, S = MemoryStore> {
    /// Key codec
    keys: K,

    /// Value codec
    values: V,

    /// Index table: metadata header + block offsets
    table: S,

    /// Block region
    blocks: S,

    /// Record/block geometry
    layout: BlockLayout,

    /// Number of index table slots (power of two)
    index_size: usize,

    /// Cached from the index table header
    block_count: usize,
}

impl<K: KeyHandler, V: ValueHandler> HashIndex<K, V, MemoryStore> {
    /// Create an empty index backed by heap memory
    pub fn in_memory(config: &Config, keys: K, values: V) -> Result<Self> {
        Self::with_stores(config, keys, values, MemoryStore::new(), MemoryStore::new())
    }
}

impl<K: KeyHandler, V: ValueHandler> HashIndex<K, V, FileStore> {
    /// Open or create a file-backed index in `config.data_dir`
    pub fn open(config: &Config, keys: K, values: V) -> Result<Self> {
        let (table, blocks) = FileStore::open_pair(&config.data_dir, config.sync_on_flush)?;
        Self::with_stores(config, keys, values, table, blocks)
    }
}

impl<K: KeyHandler, V: ValueHandler, S: BlockStore> HashIndex<K, V, S> {
    /// Create an index on the given stores
    ///
    /// An empty table store gets a fresh index. Otherwise the stored
    /// metadata must match `config` and the handlers.
    pub fn with_stores(config: &Config, keys: K, values: V, table: S, blocks: S) -> Result<Self> {
        let layout = BlockLayout::new(
            keys.key_length(),
            values.value_length(),
            config.records_per_block,
        )?;

        let mut index = Self {
            keys,
            values,
            table,
            blocks,
            layout,
            index_size: config.effective_index_size(),
            block_count: 0,
        };

        if index.table.is_empty() {
            index.create()?;
        } else {
            index.open_existing()?;
        }

        Ok(index)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    fn create(&mut self) -> Result<()> {
        self.table.allocate(index_table_length(self.index_size))?;

        let metadata = IndexMetadata {
            index_size: self.index_size,
            block_length: self.layout.block_length(),
            key_length: self.layout.key_length(),
            value_length: self.layout.value_length(),
            block_count: 0,
        };
        metadata.write(self.table.load_mut(0, INDEX_OFFSET)?);

        self.reset_blocks()?;

        info!(
            index_size = self.index_size,
            block_length = self.layout.block_length(),
            records_per_block = self.layout.records_per_block(),
            "Created hash index"
        );
        Ok(())
    }

    fn open_existing(&mut self) -> Result<()> {
        let metadata = self.load_metadata()?;
        if let Err(mismatch) = self.check_metadata(&metadata) {
            return Err(IndexError::Config(format!(
                "Stored index does not match the configuration: {}",
                mismatch
            )));
        }
        self.block_count = metadata.block_count;

        info!(
            index_size = self.index_size,
            block_count = self.block_count,
            "Opened existing hash index"
        );
        Ok(())
    }

    /// Read the stored metadata and check the stores are large enough for it
    fn load_metadata(&self) -> Result<IndexMetadata> {
        if self.table.len() < INDEX_OFFSET as u64 {
            return Err(IndexError::CorruptFormat(format!(
                "Index table holds {} bytes, less than its header",
                self.table.len()
            )));
        }
        let metadata = IndexMetadata::read(self.table.load(0, INDEX_OFFSET)?)?;
        check_region_lengths(&metadata, self.table.len(), self.blocks.len())?;
        Ok(metadata)
    }

    /// Describe the first difference between stored metadata and this index
    pub(crate) fn check_metadata(&self, metadata: &IndexMetadata) -> std::result::Result<(), String> {
        let expected = [
            ("index size", metadata.index_size, self.index_size),
            ("block length", metadata.block_length, self.layout.block_length()),
            ("key length", metadata.key_length, self.layout.key_length()),
            ("value length", metadata.value_length, self.layout.value_length()),
        ];
        for (name, stored, actual) in expected {
            if stored != actual {
                return Err(format!("stored {} is {}, expected {}", name, stored, actual));
            }
        }
        Ok(())
    }

    /// Replace all blocks with one empty block shared by every slot
    fn reset_blocks(&mut self) -> Result<()> {
        let block_length = self.layout.block_length();

        self.blocks.clear()?;
        let offset = self.blocks.allocate(block_length)?;
        BlockHeader {
            fill_count: 0,
            id: 0,
            depth: 0,
        }
        .write(self.blocks.load_mut(offset, block_length)?);

        let table = self.table.load_mut(0, index_table_length(self.index_size))?;
        for slot in 0..self.index_size {
            write_i64(table, slot_offset(slot), offset as i64);
        }

        self.set_block_count(1)
    }

    fn set_block_count(&mut self, block_count: usize) -> Result<()> {
        self.block_count = block_count;
        let header = self.table.load_mut(0, INDEX_OFFSET)?;
        write_i32(header, BLOCK_COUNT_OFFSET, block_count as i32);
        Ok(())
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Look up a key
    ///
    /// Returns `Ok(None)` when the key is absent.
    pub fn get(&self, key: &K::Key) -> Result<Option<V::Owned>> {
        let staged = self.stage_key(key)?;
        let offset = self.block_offset(staged.hash)?;
        let block = self.blocks.load(offset, self.layout.block_length())?;

        let outcome = scan_block(block, &self.layout, |_, record| self.match_key(&staged, record));

        Ok(outcome.hit.map(|slot| {
            let record = self.layout.record_offset(slot);
            self.values
                .read_value(&block[record..][self.layout.value_range()])
        }))
    }

    /// Insert or update a key
    ///
    /// Returns `true` if an existing record was updated, `false` if a new
    /// record was inserted. Splits the target block as often as needed to
    /// make room.
    pub fn put(&mut self, key: &K::Key, value: &V::Value) -> Result<bool> {
        let staged = self.stage_key(key)?;
        let mut encoded_value = vec![0u8; self.layout.value_length()];
        self.values.write_value(value, &mut encoded_value)?;

        let layout = self.layout;
        let block_length = layout.block_length();

        loop {
            let offset = self.block_offset(staged.hash)?;
            let outcome = {
                let block = self.blocks.load(offset, block_length)?;
                scan_block(block, &layout, |_, record| self.match_key(&staged, record))
            };

            if let Some(slot) = outcome.hit {
                let block = self.blocks.load_mut(offset, block_length)?;
                let record = layout.record_offset(slot);
                block[record..][layout.value_range()].copy_from_slice(&encoded_value);
                return Ok(true);
            }

            if let Some(slot) = outcome.first_free {
                let block = self.blocks.load_mut(offset, block_length)?;
                let start = layout.record_offset(slot);
                {
                    let record = &mut block[start..start + layout.record_length()];
                    record[RECORD_TYPE_OFFSET] = TYPE_RECORD;
                    record[layout.key_range()].copy_from_slice(&staged.encoded);
                    record[layout.value_range()].copy_from_slice(&encoded_value);
                }
                let fill_count = read_i32(block, BLOCK_FILL_COUNT_OFFSET);
                write_i32(block, BLOCK_FILL_COUNT_OFFSET, fill_count + 1);
                return Ok(false);
            }

            self.split_block(offset)?;
        }
    }

    /// Remove a key
    ///
    /// Returns the removed value, or `Ok(None)` when the key is absent.
    pub fn remove(&mut self, key: &K::Key) -> Result<Option<V::Owned>> {
        let staged = self.stage_key(key)?;
        let offset = self.block_offset(staged.hash)?;
        let layout = self.layout;
        let block_length = layout.block_length();

        let outcome = {
            let block = self.blocks.load(offset, block_length)?;
            scan_block(block, &layout, |_, record| self.match_key(&staged, record))
        };
        let Some(slot) = outcome.hit else {
            return Ok(None);
        };

        let block = self.blocks.load_mut(offset, block_length)?;
        let start = layout.record_offset(slot);
        let value = self.values.read_value(&block[start..][layout.value_range()]);

        block[start + RECORD_TYPE_OFFSET] = TYPE_TOMBSTONE;
        let fill_count = read_i32(block, BLOCK_FILL_COUNT_OFFSET);
        write_i32(block, BLOCK_FILL_COUNT_OFFSET, fill_count - 1);

        Ok(Some(value))
    }

    /// Discard all records and start over with a single empty block
    pub fn clear(&mut self) -> Result<()> {
        self.reset_blocks()?;
        info!(index_size = self.index_size, "Cleared hash index");
        Ok(())
    }

    /// Persist both stores
    pub fn flush(&mut self) -> Result<()> {
        self.table.flush()?;
        self.blocks.flush()?;
        debug!(block_count = self.block_count, "Flushed hash index");
        Ok(())
    }

    /// Reload both stores and re-read the metadata
    ///
    /// Used after another process changed the backing medium. Both regions
    /// are read and checked before either is swapped in: a header that
    /// doesn't match this index's geometry, or a corrupt or truncated store,
    /// is reported as `CorruptFormat` and the index keeps its contents.
    pub fn reinit(&mut self) -> Result<()> {
        let table = self.table.read_persisted()?;
        let blocks = self.blocks.read_persisted()?;

        let metadata = IndexMetadata::read(&table)?;
        self.check_metadata(&metadata)
            .map_err(IndexError::CorruptFormat)?;
        check_region_lengths(&metadata, table.len() as u64, blocks.len() as u64)?;

        self.table.restore(table)?;
        self.blocks.restore(blocks)?;
        self.block_count = metadata.block_count;

        debug!(block_count = self.block_count, "Re-initialized hash index");
        Ok(())
    }

    // =========================================================================
    // Split
    // =========================================================================

    /// Split the block at `offset`, returning the offset of the new block
    ///
    /// Records whose hash has the split bit set move to the new block, the
    /// rest are compacted to the front of the old block, and every slot of
    /// the old block with the split bit set is repointed.
    fn split_block(&mut self, offset: u64) -> Result<u64> {
        let layout = self.layout;
        let block_length = layout.block_length();
        let source = self.blocks.load(offset, block_length)?.to_vec();
        let header = BlockHeader::read(&source);

        let address_bits = self.index_size.trailing_zeros();
        if header.depth >= address_bits {
            return Err(self.index_full(&source, header));
        }

        let split_bit = 1usize << header.depth;
        let new_id = header.id as usize | split_bit;
        if new_id >= self.index_size {
            return Err(self.index_full(&source, header));
        }

        let new_offset = self.blocks.allocate(block_length)?;

        let mut kept = vec![0u8; block_length];
        let mut moved = vec![0u8; block_length];
        let mut kept_count = 0usize;
        let mut moved_count = 0usize;

        let keys = &self.keys;
        scan_block(&source, &layout, |_, record| {
            let hash = keys.key_hash(&record[layout.key_range()]) as usize;
            let (target, count) = if hash & split_bit != 0 {
                (&mut moved, &mut moved_count)
            } else {
                (&mut kept, &mut kept_count)
            };
            let start = layout.record_offset(*count);
            target[start..start + layout.record_length()].copy_from_slice(record);
            *count += 1;
            Visit::Continue
        });

        BlockHeader {
            fill_count: kept_count,
            id: header.id,
            depth: header.depth + 1,
        }
        .write(&mut kept);
        BlockHeader {
            fill_count: moved_count,
            id: new_id as u32,
            depth: header.depth + 1,
        }
        .write(&mut moved);

        self.blocks.load_mut(offset, block_length)?.copy_from_slice(&kept);
        self.blocks.load_mut(new_offset, block_length)?.copy_from_slice(&moved);

        // Slots owned by the old block are congruent to its id modulo
        // 2^depth; the ones with the split bit set move to the new block.
        let table = self.table.load_mut(0, index_table_length(self.index_size))?;
        let mut repointed = 0usize;
        for slot in (new_id..self.index_size).step_by(split_bit << 1) {
            let at = slot_offset(slot);
            if read_i64(table, at) as u64 == offset {
                write_i64(table, at, new_offset as i64);
                repointed += 1;
            }
        }

        self.set_block_count(self.block_count + 1)?;

        debug!(
            block_id = header.id,
            new_block_id = new_id,
            depth = header.depth + 1,
            kept = kept_count,
            moved = moved_count,
            repointed,
            "Split block"
        );

        Ok(new_offset)
    }

    /// Build the `IndexFull` error for a block that cannot be split
    fn index_full(&self, block: &[u8], header: BlockHeader) -> IndexError {
        let layout = self.layout;
        let mut keys = Vec::with_capacity(header.fill_count);
        scan_block(block, &layout, |_, record| {
            keys.push(format!("{:?}", self.keys.read_key(&record[layout.key_range()])));
            Visit::Continue
        });

        let stats = match self.stats() {
            Ok(stats) => stats.to_string(),
            Err(e) => format!("statistics unavailable: {}", e),
        };

        warn!(
            block_id = header.id,
            block_depth = header.depth,
            index_size = self.index_size,
            "Index full, block cannot be split"
        );

        IndexError::IndexFull {
            block_id: header.id,
            block_depth: header.depth,
            index_size: self.index_size,
            diagnostics: format!("block keys: [{}]\n{}", keys.join(", "), stats),
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn stage_key(&self, key: &K::Key) -> Result<StagedKey> {
        let mut encoded = vec![0u8; self.layout.key_length()];
        self.keys.write_key(key, &mut encoded)?;
        let hash = self.keys.key_hash(&encoded);
        Ok(StagedKey { encoded, hash })
    }

    fn match_key(&self, staged: &StagedKey, record: &[u8]) -> Visit {
        if self
            .keys
            .key_equals(&staged.encoded, &record[self.layout.key_range()])
        {
            Visit::Stop
        } else {
            Visit::Continue
        }
    }

    /// Block offset stored in the slot selected by `hash`
    fn block_offset(&self, hash: u64) -> Result<u64> {
        let slot = (hash as usize) & (self.index_size - 1);
        let table = self.table.load(0, index_table_length(self.index_size))?;
        Ok(read_i64(table, slot_offset(slot)) as u64)
    }

    // =========================================================================
    // Snapshot Support
    // =========================================================================

    /// Index table and block region bytes, trimmed to the metadata lengths
    pub(crate) fn buffers(&self) -> Result<(&[u8], &[u8])> {
        let metadata = self.metadata();
        let table = self.table.load(0, metadata.table_length())?;
        let blocks = self.blocks.load(0, metadata.region_length())?;
        Ok((table, blocks))
    }

    /// Swap in snapshot buffers after checking their header against this
    /// index, then persist both stores
    pub(crate) fn restore(&mut self, table: Vec<u8>, blocks: Vec<u8>) -> Result<()> {
        let metadata = IndexMetadata::read(&table)?;
        self.check_metadata(&metadata)
            .map_err(IndexError::CorruptFormat)?;
        if table.len() != metadata.table_length() || blocks.len() != metadata.region_length() {
            return Err(IndexError::CorruptFormat(format!(
                "Snapshot buffers of {} and {} bytes don't match their header",
                table.len(),
                blocks.len()
            )));
        }

        self.table.restore(table)?;
        self.blocks.restore(blocks)?;
        self.block_count = metadata.block_count;

        // Keep the backing medium in step so a later reinit sees the snapshot
        self.flush()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn index_size(&self) -> usize {
        self.index_size
    }

    pub fn block_count(&self) -> usize {
        self.block_count
    }

    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    pub fn key_handler(&self) -> &K {
        &self.keys
    }

    pub fn value_handler(&self) -> &V {
        &self.values
    }

    pub fn metadata(&self) -> IndexMetadata {
        IndexMetadata {
            index_size: self.index_size,
            block_length: self.layout.block_length(),
            key_length: self.layout.key_length(),
            value_length: self.layout.value_length(),
            block_count: self.block_count,
        }
    }

    /// Offsets of all allocated blocks, in allocation order
    pub fn block_offsets(&self) -> impl Iterator<Item = u64> {
        let block_length = self.layout.block_length() as u64;
        (0..self.block_count as u64).map(move |i| i * block_length)
    }

    /// Block offset stored in one index table slot
    pub fn slot_block(&self, slot: usize) -> Result<u64> {
        if slot >= self.index_size {
            return Err(IndexError::InvalidArgument(format!(
                "slot {} is outside an index of size {}",
                slot, self.index_size
            )));
        }
        let table = self.table.load(0, index_table_length(self.index_size))?;
        Ok(read_i64(table, slot_offset(slot)) as u64)
    }

    /// Offset of the block a key is addressed to
    pub fn block_offset_of(&self, key: &K::Key) -> Result<u64> {
        let staged = self.stage_key(key)?;
        self.block_offset(staged.hash)
    }

    pub fn block_header(&self, offset: u64) -> Result<BlockHeader> {
        let block = self.blocks.load(offset, self.layout.block_length())?;
        Ok(BlockHeader::read(block))
    }

    /// Decoded live records of one block, in physical order
    pub fn block_entries(&self, offset: u64) -> Result<Vec<(K::Owned, V::Owned)>> {
        let block = self.blocks.load(offset, self.layout.block_length())?;
        let layout = self.layout;
        let mut entries = Vec::new();
        scan_block(block, &layout, |_, record| {
            entries.push((
                self.keys.read_key(&record[layout.key_range()]),
                self.values.read_value(&record[layout.value_range()]),
            ));
            Visit::Continue
        });
        Ok(entries)
    }

    /// Total live records
    pub fn record_count(&self) -> Result<usize> {
        Ok(self.stats()?.record_count)
    }

    /// Fill statistics over all blocks
    pub fn stats(&self) -> Result<IndexStats> {
        let block_length = self.layout.block_length();
        let mut fill_counts = Vec::with_capacity(self.block_count);
        for offset in self.block_offsets() {
            let block = self.blocks.load(offset, block_length)?;
            fill_counts.push(BlockHeader::read(block).fill_count);
        }
        Ok(IndexStats::from_fill_counts(
            self.index_size,
            self.layout.records_per_block(),
            fill_counts,
        ))
    }
}

/// Check that the stores hold at least the bytes `metadata` describes
fn check_region_lengths(metadata: &IndexMetadata, table_len: u64, blocks_len: u64) -> Result<()> {
    if table_len < metadata.table_length() as u64 {
        return Err(IndexError::CorruptFormat(format!(
            "Index table truncated: expected {} bytes, got {}",
            metadata.table_length(),
            table_len
        )));
    }
    if blocks_len < metadata.region_length() as u64 {
        return Err(IndexError::CorruptFormat(format!(
            "Block region truncated: expected {} bytes for {} blocks, got {}",
            metadata.region_length(),
            metadata.block_count,
            blocks_len
        )));
    }
    Ok(())
}
