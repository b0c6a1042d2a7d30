//! Long → bytes index

use crate::config::Config;
use crate::error::Result;
use crate::handler::{BytesValue, LongKey};
use crate::index::HashIndex;
use crate::store::{BlockStore, FileStore, MemoryStore};

use super::delegate_index_ops;

/// Maps `i64` keys to byte values of at most `max_value_length` bytes
pub struct Long2BytesIndex<S = MemoryStore> {
    index: HashIndex<LongKey, BytesValue, S>,
}

impl Long2BytesIndex<MemoryStore> {
    pub fn new(config: &Config, max_value_length: usize) -> Result<Self> {
        Self::with_stores(config, max_value_length, MemoryStore::new(), MemoryStore::new())
    }
}

impl Long2BytesIndex<FileStore> {
    /// Open or create a file-backed index in `config.data_dir`
    pub fn open(config: &Config, max_value_length: usize) -> Result<Self> {
        Ok(Self {
            index: HashIndex::open(config, LongKey, BytesValue::new(max_value_length))?,
        })
    }
}

impl<S: BlockStore> Long2BytesIndex<S> {
    pub fn with_stores(config: &Config, max_value_length: usize, table: S, blocks: S) -> Result<Self> {
        Ok(Self {
            index: HashIndex::with_stores(
                config,
                LongKey,
                BytesValue::new(max_value_length),
                table,
                blocks,
            )?,
        })
    }

    pub fn max_value_length(&self) -> usize {
        self.index.value_handler().max_value_length()
    }

    pub fn get(&self, key: i64) -> Result<Option<Vec<u8>>> {
        self.index.get(&key)
    }

    /// Insert or update; `true` if an existing entry was updated.
    ///
    /// Values longer than `max_value_length` are rejected with
    /// `InvalidArgument` and the index is left unchanged.
    pub fn put(&mut self, key: i64, value: &[u8]) -> Result<bool> {
        self.index.value_handler().check(value)?;
        self.index.put(&key, value)
    }

    pub fn remove(&mut self, key: i64) -> Result<Option<Vec<u8>>> {
        self.index.remove(&key)
    }

    delegate_index_ops!(LongKey, BytesValue);
}
