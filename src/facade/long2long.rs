//! Long → Long index

use crate::config::Config;
use crate::error::Result;
use crate::handler::{LongKey, LongValue};
use crate::index::HashIndex;
use crate::store::{BlockStore, FileStore, MemoryStore};

use super::delegate_index_ops;

/// Maps `i64` keys to `i64` values
pub struct Long2LongIndex<S = MemoryStore> {
    index: HashIndex<LongKey, LongValue, S>,
}

impl Long2LongIndex<MemoryStore> {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_stores(config, MemoryStore::new(), MemoryStore::new())
    }
}

impl Long2LongIndex<FileStore> {
    /// Open or create a file-backed index in `config.data_dir`
    pub fn open(config: &Config) -> Result<Self> {
        Ok(Self {
            index: HashIndex::open(config, LongKey, LongValue)?,
        })
    }
}

impl<S: BlockStore> Long2LongIndex<S> {
    pub fn with_stores(config: &Config, table: S, blocks: S) -> Result<Self> {
        Ok(Self {
            index: HashIndex::with_stores(config, LongKey, LongValue, table, blocks)?,
        })
    }

    /// Value of `key`, or `missing` if absent
    pub fn get(&self, key: i64, missing: i64) -> Result<i64> {
        Ok(self.index.get(&key)?.unwrap_or(missing))
    }

    /// Insert or update; `true` if an existing entry was updated
    pub fn put(&mut self, key: i64, value: i64) -> Result<bool> {
        self.index.put(&key, &value)
    }

    /// Remove `key`, returning its value or `missing` if absent
    pub fn remove(&mut self, key: i64, missing: i64) -> Result<i64> {
        Ok(self.index.remove(&key)?.unwrap_or(missing))
    }

    delegate_index_ops!(LongKey, LongValue);
}
