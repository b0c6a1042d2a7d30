//! Binary Layout Descriptor
//!
//! Fixed offsets of the two physical structures of an index. All integers
//! are little-endian. Anything that touches the index table or a block goes
//! through these constants; they are the snapshot wire format.
//!
//! ## Index Table
//! ```text
//! ┌──────────────┬──────────────┬────────────┬──────────────┬─────────────┬──────────┐
//! │IndexSize (4) │BlockLen (4)  │KeyLen (4)  │ValueLen (4)  │BlockCnt (4) │Rsvd (4)  │
//! ├──────────────┴──────────────┴────────────┴──────────────┴─────────────┴──────────┤
//! │ Slot 0: block offset (8) | Slot 1 (8) | ... | Slot IndexSize-1 (8)               │
//! └──────────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Block
//! ```text
//! ┌──────────────┬──────────────┬──────────────┬──────────┐
//! │FillCount (4) │BlockId (4)   │Depth (4)     │Rsvd (4)  │
//! ├──────────────┴──────────────┴──────────────┴──────────┤
//! │ Record 0 | Record 1 | ... | Record RecordsPerBlock-1   │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Record
//! ```text
//! ┌──────────┬──────────────────┬────────────────────┐
//! │ Tag (1)  │ Key (KeyLen)     │ Value (ValueLen)   │
//! └──────────┴──────────────────┴────────────────────┘
//! ```

use crate::error::{IndexError, Result};

/// Largest index table: 2^27 slots, so `slots * 8` stays 32-bit addressable
pub const MAX_INDEX_SIZE: usize = 1 << 27;

// =============================================================================
// Index Table
// =============================================================================

pub const INDEX_SIZE_OFFSET: usize = 0;
pub const BLOCK_LENGTH_OFFSET: usize = 4;
pub const RECORD_KEY_LENGTH_OFFSET: usize = 8;
pub const RECORD_VALUE_LENGTH_OFFSET: usize = 12;
pub const BLOCK_COUNT_OFFSET: usize = 16;

/// Index table header size; slots start here
pub const INDEX_OFFSET: usize = 24;

/// Size of one slot (a block offset)
pub const SLOT_SIZE: usize = 8;

/// Total byte length of an index table with `index_size` slots
pub fn index_table_length(index_size: usize) -> usize {
    INDEX_OFFSET + index_size * SLOT_SIZE
}

/// Byte offset of slot `slot` within the index table
pub fn slot_offset(slot: usize) -> usize {
    INDEX_OFFSET + slot * SLOT_SIZE
}

// =============================================================================
// Block
// =============================================================================

pub const BLOCK_FILL_COUNT_OFFSET: usize = 0;
pub const BLOCK_ID_OFFSET: usize = 4;
pub const BLOCK_DEPTH_OFFSET: usize = 8;

/// Block header size; records start here
pub const BLOCK_DATA_OFFSET: usize = 16;

// =============================================================================
// Record
// =============================================================================

pub const RECORD_TYPE_OFFSET: usize = 0;
pub const RECORD_KEY_OFFSET: usize = 1;

/// Slot never written since the block was created or compacted
pub const TYPE_FREE: u8 = 0;
/// Live record
pub const TYPE_RECORD: u8 = 1;
/// Removed record, skipped by scans and reusable by puts
pub const TYPE_TOMBSTONE: u8 = 2;

// =============================================================================
// Raw Accessors
// =============================================================================

pub(crate) fn read_i32(buf: &[u8], offset: usize) -> i32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    i32::from_le_bytes(bytes)
}

pub(crate) fn write_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn read_i64(buf: &[u8], offset: usize) -> i64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    i64::from_le_bytes(bytes)
}

pub(crate) fn write_i64(buf: &mut [u8], offset: usize, value: i64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

// =============================================================================
// Block Geometry
// =============================================================================

/// Runtime geometry of blocks and records for one key/value length pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    key_length: usize,
    value_length: usize,
    records_per_block: usize,
}

impl BlockLayout {
    /// Validates the lengths and computes the geometry.
    ///
    /// Every length must be non-zero and the resulting block length must fit
    /// the i32 header fields.
    pub fn new(key_length: usize, value_length: usize, records_per_block: usize) -> Result<Self> {
        if key_length == 0 {
            return Err(IndexError::InvalidArgument(
                "key length must be greater than zero".to_string(),
            ));
        }
        if records_per_block == 0 {
            return Err(IndexError::InvalidArgument(
                "records per block must be greater than zero".to_string(),
            ));
        }

        let block_length = (1 + key_length)
            .checked_add(value_length)
            .and_then(|record| record.checked_mul(records_per_block))
            .and_then(|records| records.checked_add(BLOCK_DATA_OFFSET));

        match block_length {
            Some(len) if len <= i32::MAX as usize => Ok(Self {
                key_length,
                value_length,
                records_per_block,
            }),
            _ => Err(IndexError::InvalidArgument(format!(
                "block length for {} records of key length {} and value length {} exceeds {}",
                records_per_block,
                key_length,
                value_length,
                i32::MAX
            ))),
        }
    }

    /// Rebuilds the geometry from persisted header fields
    pub fn from_block_length(
        key_length: usize,
        value_length: usize,
        block_length: usize,
    ) -> Result<Self> {
        let record_length = 1 + key_length + value_length;
        let data = block_length.checked_sub(BLOCK_DATA_OFFSET).unwrap_or(0);
        if data == 0 || data % record_length != 0 {
            return Err(IndexError::CorruptFormat(format!(
                "block length {} is not a whole number of {}-byte records",
                block_length, record_length
            )));
        }
        Self::new(key_length, value_length, data / record_length)
    }

    pub fn key_length(&self) -> usize {
        self.key_length
    }

    pub fn value_length(&self) -> usize {
        self.value_length
    }

    pub fn records_per_block(&self) -> usize {
        self.records_per_block
    }

    /// Tag + key + value
    pub fn record_length(&self) -> usize {
        1 + self.key_length + self.value_length
    }

    pub fn block_length(&self) -> usize {
        BLOCK_DATA_OFFSET + self.records_per_block * self.record_length()
    }

    /// Byte offset of record slot `slot` within a block
    pub fn record_offset(&self, slot: usize) -> usize {
        BLOCK_DATA_OFFSET + slot * self.record_length()
    }

    /// Key range relative to the start of a record
    pub fn key_range(&self) -> std::ops::Range<usize> {
        RECORD_KEY_OFFSET..RECORD_KEY_OFFSET + self.key_length
    }

    /// Value range relative to the start of a record
    pub fn value_range(&self) -> std::ops::Range<usize> {
        let start = RECORD_KEY_OFFSET + self.key_length;
        start..start + self.value_length
    }
}
