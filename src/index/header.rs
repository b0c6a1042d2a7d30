//! Block header and index table metadata

use crate::error::{IndexError, Result};
use crate::layout::{
    index_table_length, read_i32, write_i32, BLOCK_COUNT_OFFSET, BLOCK_DEPTH_OFFSET,
    BLOCK_FILL_COUNT_OFFSET, BLOCK_ID_OFFSET, BLOCK_LENGTH_OFFSET, INDEX_OFFSET,
    INDEX_SIZE_OFFSET, MAX_INDEX_SIZE, RECORD_KEY_LENGTH_OFFSET, RECORD_VALUE_LENGTH_OFFSET,
};

/// Header of one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Live records in the block
    pub fill_count: usize,
    /// Address bits owned by the block
    pub id: u32,
    /// Number of address bits consumed
    pub depth: u32,
}

impl BlockHeader {
    pub fn read(block: &[u8]) -> Self {
        Self {
            fill_count: read_i32(block, BLOCK_FILL_COUNT_OFFSET).max(0) as usize,
            id: read_i32(block, BLOCK_ID_OFFSET) as u32,
            depth: read_i32(block, BLOCK_DEPTH_OFFSET) as u32,
        }
    }

    pub fn write(&self, block: &mut [u8]) {
        write_i32(block, BLOCK_FILL_COUNT_OFFSET, self.fill_count as i32);
        write_i32(block, BLOCK_ID_OFFSET, self.id as i32);
        write_i32(block, BLOCK_DEPTH_OFFSET, self.depth as i32);
    }
}

/// Metadata stored in the index table header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexMetadata {
    pub index_size: usize,
    pub block_length: usize,
    pub key_length: usize,
    pub value_length: usize,
    pub block_count: usize,
}

impl IndexMetadata {
    /// Parse and sanity-check an index table header
    pub fn read(header: &[u8]) -> Result<Self> {
        if header.len() < INDEX_OFFSET {
            return Err(IndexError::CorruptFormat(format!(
                "Index table header too short: expected {} bytes, got {}",
                INDEX_OFFSET,
                header.len()
            )));
        }

        let field = |offset: usize, name: &str| -> Result<usize> {
            let value = read_i32(header, offset);
            usize::try_from(value).map_err(|_| {
                IndexError::CorruptFormat(format!("Negative {} in index header: {}", name, value))
            })
        };

        let metadata = Self {
            index_size: field(INDEX_SIZE_OFFSET, "index size")?,
            block_length: field(BLOCK_LENGTH_OFFSET, "block length")?,
            key_length: field(RECORD_KEY_LENGTH_OFFSET, "key length")?,
            value_length: field(RECORD_VALUE_LENGTH_OFFSET, "value length")?,
            block_count: field(BLOCK_COUNT_OFFSET, "block count")?,
        };

        if !metadata.index_size.is_power_of_two() || metadata.index_size > MAX_INDEX_SIZE {
            return Err(IndexError::CorruptFormat(format!(
                "Index size {} is not a power of two within {}",
                metadata.index_size, MAX_INDEX_SIZE
            )));
        }
        if metadata.block_count == 0 || metadata.block_count > metadata.index_size {
            return Err(IndexError::CorruptFormat(format!(
                "Block count {} is outside 1..={}",
                metadata.block_count, metadata.index_size
            )));
        }

        Ok(metadata)
    }

    pub fn write(&self, header: &mut [u8]) {
        write_i32(header, INDEX_SIZE_OFFSET, self.index_size as i32);
        write_i32(header, BLOCK_LENGTH_OFFSET, self.block_length as i32);
        write_i32(header, RECORD_KEY_LENGTH_OFFSET, self.key_length as i32);
        write_i32(header, RECORD_VALUE_LENGTH_OFFSET, self.value_length as i32);
        write_i32(header, BLOCK_COUNT_OFFSET, self.block_count as i32);
    }

    /// Byte length of the index table (header + slots)
    pub fn table_length(&self) -> usize {
        index_table_length(self.index_size)
    }

    /// Byte length of the block region
    pub fn region_length(&self) -> usize {
        self.block_count * self.block_length
    }
}
