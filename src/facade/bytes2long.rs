//! Bytes → Long index

use crate::config::Config;
use crate::error::Result;
use crate::handler::{BytesKey, LongValue};
use crate::index::HashIndex;
use crate::store::{BlockStore, FileStore, MemoryStore};

use super::delegate_index_ops;

/// Maps byte keys of at most `key_length` bytes to `i64` values.
///
/// Keys shorter than `key_length` are zero-padded.
pub struct Bytes2LongIndex<S = MemoryStore> {
    index: HashIndex<BytesKey, LongValue, S>,
}

impl Bytes2LongIndex<MemoryStore> {
    pub fn new(config: &Config, key_length: usize) -> Result<Self> {
        Self::with_stores(config, key_length, MemoryStore::new(), MemoryStore::new())
    }
}

impl Bytes2LongIndex<FileStore> {
    /// Open or create a file-backed index in `config.data_dir`
    pub fn open(config: &Config, key_length: usize) -> Result<Self> {
        Ok(Self {
            index: HashIndex::open(config, BytesKey::new(key_length), LongValue)?,
        })
    }
}

impl<S: BlockStore> Bytes2LongIndex<S> {
    pub fn with_stores(config: &Config, key_length: usize, table: S, blocks: S) -> Result<Self> {
        Ok(Self {
            index: HashIndex::with_stores(config, BytesKey::new(key_length), LongValue, table, blocks)?,
        })
    }

    pub fn key_length(&self) -> usize {
        self.index.layout().key_length()
    }

    /// Value of `key`, or `missing` if absent.
    ///
    /// Keys longer than `key_length` are rejected with `InvalidArgument`.
    pub fn get(&self, key: &[u8], missing: i64) -> Result<i64> {
        Ok(self.index.get(key)?.unwrap_or(missing))
    }

    /// Insert or update; `true` if an existing entry was updated
    pub fn put(&mut self, key: &[u8], value: i64) -> Result<bool> {
        self.index.put(key, &value)
    }

    /// Remove `key`, returning its value or `missing` if absent
    pub fn remove(&mut self, key: &[u8], missing: i64) -> Result<i64> {
        Ok(self.index.remove(key)?.unwrap_or(missing))
    }

    delegate_index_ops!(BytesKey, LongValue);
}
