//! Key handlers
//!
//! Long keys and fixed-length byte-array keys.

use crate::error::{IndexError, Result};

use super::{mix64, KeyHandler};

/// `i64` keys, stored as 8 little-endian bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct LongKey;

impl LongKey {
    pub const LENGTH: usize = 8;
}

impl KeyHandler for LongKey {
    type Key = i64;
    type Owned = i64;

    fn key_length(&self) -> usize {
        Self::LENGTH
    }

    fn write_key(&self, key: &i64, dst: &mut [u8]) -> Result<()> {
        dst.copy_from_slice(&key.to_le_bytes());
        Ok(())
    }

    fn read_key(&self, src: &[u8]) -> i64 {
        let mut bytes = [0u8; Self::LENGTH];
        bytes.copy_from_slice(&src[..Self::LENGTH]);
        i64::from_le_bytes(bytes)
    }

    fn key_hash(&self, encoded: &[u8]) -> u64 {
        mix64(self.read_key(encoded) as u64)
    }
}

/// Byte-array keys of at most `key_length` bytes.
///
/// Shorter keys are zero-padded, so `b"ab"` and `b"ab\0"` are the same key.
#[derive(Debug, Clone, Copy)]
pub struct BytesKey {
    key_length: usize,
}

impl BytesKey {
    pub fn new(key_length: usize) -> Self {
        Self { key_length }
    }
}

impl KeyHandler for BytesKey {
    type Key = [u8];
    type Owned = Vec<u8>;

    fn key_length(&self) -> usize {
        self.key_length
    }

    fn write_key(&self, key: &[u8], dst: &mut [u8]) -> Result<()> {
        if key.len() > self.key_length {
            return Err(IndexError::InvalidArgument(format!(
                "key of {} bytes exceeds the key length of {}",
                key.len(),
                self.key_length
            )));
        }
        dst[..key.len()].copy_from_slice(key);
        dst[key.len()..].fill(0);
        Ok(())
    }

    fn read_key(&self, src: &[u8]) -> Vec<u8> {
        src[..self.key_length].to_vec()
    }
}
