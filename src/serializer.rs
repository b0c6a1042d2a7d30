//! Snapshot serializer
//!
//! Streams a whole index (index table + block region) to and from a byte
//! stream.
//!
//! ## Stream Format
//! ```text
//! ┌──────────────┬───────────────────────────┬──────────────────────────┐
//! │ Version (4)  │ Index table               │ Block region             │
//! │ i32 LE       │ header (24) + slots (8·n) │ block_count · block_len  │
//! └──────────────┴───────────────────────────┴──────────────────────────┘
//! ```
//! Lengths are not stored separately: both follow from the index table header.

use std::fmt;
use std::io::{self, ErrorKind, Read, Write};

use bytes::{Buf, BufMut, BytesMut};

use crate::config::Config;
use crate::error::{IndexError, Result};
use crate::handler::{KeyHandler, ValueHandler};
use crate::index::{BlockHeader, HashIndex, IndexMetadata, IndexStats};
use crate::layout::{BlockLayout, INDEX_OFFSET};
use crate::store::BlockStore;

/// Current snapshot format version
pub const SNAPSHOT_VERSION: i32 = 1;

/// Size of the version tag
pub const VERSION_LENGTH: usize = 4;

/// Writes and reads index snapshots through a reusable scratch buffer
pub struct IndexSerializer {
    scratch: Vec<u8>,
}

impl IndexSerializer {
    /// Create a serializer with a scratch buffer of `chunk_size` bytes
    pub fn new(chunk_size: usize) -> Self {
        Self {
            scratch: vec![0u8; chunk_size.max(1)],
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.snapshot_chunk_size)
    }

    /// Write `index` to `writer`, returning the number of bytes written
    pub fn write_to_stream<K, V, S, W>(&mut self, index: &HashIndex<K, V, S>, writer: &mut W) -> Result<u64>
    where
        K: KeyHandler,
        V: ValueHandler,
        S: BlockStore,
        W: Write,
    {
        let mut version = BytesMut::with_capacity(VERSION_LENGTH);
        version.put_i32_le(SNAPSHOT_VERSION);
        writer.write_all(&version)?;

        let (table, blocks) = index.buffers()?;
        for chunk in table.chunks(self.scratch.len()).chain(blocks.chunks(self.scratch.len())) {
            writer.write_all(chunk)?;
        }
        writer.flush()?;

        let written = (VERSION_LENGTH + table.len() + blocks.len()) as u64;
        tracing::debug!(
            bytes = written,
            block_count = index.block_count(),
            "Wrote index snapshot"
        );
        Ok(written)
    }

    /// Replace the contents of `index` with the snapshot read from `reader`
    ///
    /// The snapshot is read completely before `index` is touched: on error
    /// the index keeps its previous contents. Once swapped in, the snapshot
    /// is flushed to the index's stores, so a file-backed index reopens (or
    /// reinits) with it.
    pub fn read_from_stream<K, V, S, R>(&mut self, index: &mut HashIndex<K, V, S>, reader: &mut R) -> Result<()>
    where
        K: KeyHandler,
        V: ValueHandler,
        S: BlockStore,
        R: Read,
    {
        read_version(reader)?;

        let mut table = Vec::with_capacity(INDEX_OFFSET);
        self.read_chunked(reader, &mut table, INDEX_OFFSET)?;
        let metadata = IndexMetadata::read(&table)?;
        index.check_metadata(&metadata).map_err(|mismatch| {
            IndexError::CorruptFormat(format!("Snapshot doesn't fit this index: {}", mismatch))
        })?;

        table.reserve(metadata.table_length() - INDEX_OFFSET);
        self.read_chunked(reader, &mut table, metadata.table_length() - INDEX_OFFSET)?;

        let mut blocks = Vec::with_capacity(metadata.region_length());
        self.read_chunked(reader, &mut blocks, metadata.region_length())?;

        index.restore(table, blocks)?;

        tracing::debug!(
            block_count = metadata.block_count,
            "Read index snapshot"
        );
        Ok(())
    }

    /// Read a snapshot without a typed index: metadata and block fill counts
    pub fn read_info<R: Read>(&mut self, reader: &mut R) -> Result<SnapshotInfo> {
        let version = read_version(reader)?;

        let mut header = Vec::with_capacity(INDEX_OFFSET);
        self.read_chunked(reader, &mut header, INDEX_OFFSET)?;
        let metadata = IndexMetadata::read(&header)?;
        let layout = BlockLayout::from_block_length(
            metadata.key_length,
            metadata.value_length,
            metadata.block_length,
        )?;

        let slots = (metadata.table_length() - INDEX_OFFSET) as u64;
        let skipped = io::copy(&mut reader.by_ref().take(slots), &mut io::sink())?;
        if skipped != slots {
            return Err(truncated(skipped as usize, slots as usize));
        }

        // Sizes come from an unverified header; let the reads grow the buffers
        let mut block = Vec::new();
        let mut fill_counts = Vec::new();
        for _ in 0..metadata.block_count {
            block.clear();
            self.read_chunked(reader, &mut block, metadata.block_length)?;
            fill_counts.push(BlockHeader::read(&block).fill_count);
        }

        Ok(SnapshotInfo {
            version,
            metadata,
            stats: IndexStats::from_fill_counts(
                metadata.index_size,
                layout.records_per_block(),
                fill_counts,
            ),
        })
    }

    /// Append exactly `len` bytes from `reader` to `dst`, one scratch chunk at a time
    fn read_chunked<R: Read>(&mut self, reader: &mut R, dst: &mut Vec<u8>, len: usize) -> Result<()> {
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(self.scratch.len());
            reader
                .read_exact(&mut self.scratch[..n])
                .map_err(|e| match e.kind() {
                    ErrorKind::UnexpectedEof => truncated(len - remaining, len),
                    _ => IndexError::Io(e),
                })?;
            dst.extend_from_slice(&self.scratch[..n]);
            remaining -= n;
        }
        Ok(())
    }
}

impl Default for IndexSerializer {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Header and fill statistics of a snapshot
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    pub version: i32,
    pub metadata: IndexMetadata,
    pub stats: IndexStats,
}

impl fmt::Display for SnapshotInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "snapshot version: {}", self.version)?;
        writeln!(
            f,
            "key length: {}, value length: {}, block length: {}",
            self.metadata.key_length, self.metadata.value_length, self.metadata.block_length
        )?;
        write!(f, "{}", self.stats)
    }
}

// =============================================================================
// Private Helpers
// =============================================================================

fn read_version<R: Read>(reader: &mut R) -> Result<i32> {
    let mut tag = [0u8; VERSION_LENGTH];
    reader.read_exact(&mut tag).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => IndexError::CorruptFormat(
            "Snapshot too short to hold a version tag".to_string(),
        ),
        _ => IndexError::Io(e),
    })?;

    let version = (&tag[..]).get_i32_le();
    if version != SNAPSHOT_VERSION {
        return Err(IndexError::CorruptFormat(format!(
            "Unsupported snapshot version {} (expected {})",
            version, SNAPSHOT_VERSION
        )));
    }
    Ok(version)
}

fn truncated(read: usize, expected: usize) -> IndexError {
    IndexError::CorruptFormat(format!(
        "Snapshot truncated: read {} of {} expected bytes",
        read, expected
    ))
}
