//! Value handlers
//!
//! Long values and bounded byte-array values.

use crate::error::{IndexError, Result};

use super::ValueHandler;

/// `i64` values, stored as 8 little-endian bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct LongValue;

impl LongValue {
    pub const LENGTH: usize = 8;
}

impl ValueHandler for LongValue {
    type Value = i64;
    type Owned = i64;

    fn value_length(&self) -> usize {
        Self::LENGTH
    }

    fn write_value(&self, value: &i64, dst: &mut [u8]) -> Result<()> {
        dst.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn read_value(&self, src: &[u8]) -> i64 {
        let mut bytes = [0u8; Self::LENGTH];
        bytes.copy_from_slice(&src[..Self::LENGTH]);
        i64::from_le_bytes(bytes)
    }
}

/// Byte-array values of up to `max_value_length` bytes.
///
/// Stored as `[len: u32][bytes][zero padding]`, so the value region is
/// `4 + max_value_length` bytes and values come back with their exact length.
#[derive(Debug, Clone, Copy)]
pub struct BytesValue {
    max_value_length: usize,
}

impl BytesValue {
    /// Size of the length prefix
    pub const PREFIX_LENGTH: usize = 4;

    pub fn new(max_value_length: usize) -> Self {
        Self { max_value_length }
    }

    pub fn max_value_length(&self) -> usize {
        self.max_value_length
    }

    /// Rejects values longer than `max_value_length`
    pub fn check(&self, value: &[u8]) -> Result<()> {
        if value.len() > self.max_value_length {
            return Err(IndexError::InvalidArgument(format!(
                "value of {} bytes exceeds the max value length of {}",
                value.len(),
                self.max_value_length
            )));
        }
        Ok(())
    }
}

impl ValueHandler for BytesValue {
    type Value = [u8];
    type Owned = Vec<u8>;

    fn value_length(&self) -> usize {
        Self::PREFIX_LENGTH + self.max_value_length
    }

    fn write_value(&self, value: &[u8], dst: &mut [u8]) -> Result<()> {
        self.check(value)?;
        let (prefix, data) = dst.split_at_mut(Self::PREFIX_LENGTH);
        prefix.copy_from_slice(&(value.len() as u32).to_le_bytes());
        data[..value.len()].copy_from_slice(value);
        data[value.len()..].fill(0);
        Ok(())
    }

    fn read_value(&self, src: &[u8]) -> Vec<u8> {
        let mut prefix = [0u8; Self::PREFIX_LENGTH];
        prefix.copy_from_slice(&src[..Self::PREFIX_LENGTH]);
        // A corrupt prefix must not read past the slot
        let len = (u32::from_le_bytes(prefix) as usize).min(self.max_value_length);
        src[Self::PREFIX_LENGTH..Self::PREFIX_LENGTH + len].to_vec()
    }
}
