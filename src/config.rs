//! Configuration for exthash
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::layout::MAX_INDEX_SIZE;

/// Main configuration for an index instance
///
/// Every field is fixed for the lifetime of one index. Key and value lengths
/// are not part of the config: they belong to the key/value handlers.
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Index Geometry
    // -------------------------------------------------------------------------
    /// Requested number of index table slots.
    /// Rounded up to the next power of two and capped at `MAX_INDEX_SIZE`,
    /// see [`Config::effective_index_size`].
    pub index_size: usize,

    /// Number of fixed-size record slots in one block
    pub records_per_block: usize,

    // -------------------------------------------------------------------------
    // Snapshot Configuration
    // -------------------------------------------------------------------------
    /// Size of the scratch buffer used to stream snapshots (in bytes)
    pub snapshot_chunk_size: usize,

    // -------------------------------------------------------------------------
    // Storage Configuration (file-backed stores only)
    // -------------------------------------------------------------------------
    /// Root directory for file-backed stores
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── index.tbl      (index table)
    ///     └── blocks.dat     (block region)
    pub data_dir: PathBuf,

    /// fsync the store files on every flush
    pub sync_on_flush: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index_size: 1024,
            records_per_block: 64,
            snapshot_chunk_size: 64 * 1024, // 64 KB
            data_dir: PathBuf::from("./exthash_data"),
            sync_on_flush: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// The index size actually used: the next power of two of the requested
    /// size, never above `MAX_INDEX_SIZE`.
    pub fn effective_index_size(&self) -> usize {
        self.index_size
            .max(1)
            .checked_next_power_of_two()
            .unwrap_or(MAX_INDEX_SIZE)
            .min(MAX_INDEX_SIZE)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the requested index table size
    pub fn index_size(mut self, size: usize) -> Self {
        self.config.index_size = size;
        self
    }

    /// Set the number of records per block
    pub fn records_per_block(mut self, count: usize) -> Self {
        self.config.records_per_block = count;
        self
    }

    /// Set the snapshot scratch buffer size (in bytes)
    pub fn snapshot_chunk_size(mut self, size: usize) -> Self {
        self.config.snapshot_chunk_size = size;
        self
    }

    /// Set the data directory for file-backed stores
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Enable or disable fsync on flush
    pub fn sync_on_flush(mut self, sync: bool) -> Self {
        self.config.sync_on_flush = sync;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
