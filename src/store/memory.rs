//! In-memory store
//!
//! Heap-backed region; `flush` has nothing to do and `reload` keeps the
//! current contents.

use crate::error::{IndexError, Result};

use super::BlockStore;

/// Region held in a single heap buffer
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    data: Vec<u8>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size the buffer for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }
}

/// Bounds-checked byte range of a region
pub(super) fn checked_range(
    region_len: usize,
    offset: u64,
    len: usize,
) -> Result<std::ops::Range<usize>> {
    let start = usize::try_from(offset)
        .map_err(|_| IndexError::Storage(format!("offset {} is not addressable", offset)))?;
    match start.checked_add(len) {
        Some(end) if end <= region_len => Ok(start..end),
        _ => Err(IndexError::Storage(format!(
            "access of {} bytes at offset {} is outside the {}-byte region",
            len, offset, region_len
        ))),
    }
}

impl BlockStore for MemoryStore {
    fn allocate(&mut self, size: usize) -> Result<u64> {
        let offset = self.data.len();
        self.data.resize(offset + size, 0);
        Ok(offset as u64)
    }

    fn load(&self, offset: u64, len: usize) -> Result<&[u8]> {
        let range = checked_range(self.data.len(), offset, len)?;
        Ok(&self.data[range])
    }

    fn load_mut(&mut self, offset: u64, len: usize) -> Result<&mut [u8]> {
        let range = checked_range(self.data.len(), offset, len)?;
        Ok(&mut self.data[range])
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn region(&self) -> &[u8] {
        &self.data
    }

    fn restore(&mut self, region: Vec<u8>) -> Result<()> {
        self.data = region;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.data.clear();
        Ok(())
    }

    /// The heap buffer is its own backing medium
    fn read_persisted(&self) -> Result<Vec<u8>> {
        Ok(self.data.clone())
    }
}
