//! Bucket Array Module
//!
//! A growable bucket area with overflow chains, an alternative to the
//! fixed-capacity block region of [`crate::HashIndex`]. Buckets are packed
//! `ALLOCATION_FACTOR` to a buffer and new buffers are added on demand, so
//! the area grows without copying.
//!
//! ## Layout
//! ```text
//! Main header (20 bytes)
//! ┌──────────────┬──────────────┬──────────────┬──────────────────┐
//! │ buffers (4)  │ buckets (4)  │ blocks (8)   │ highest id (4)   │
//! └──────────────┴──────────────┴──────────────┴──────────────────┘
//!
//! Buffer: [bucket count (4) | reserved (4)] + ALLOCATION_FACTOR buckets
//!
//! Bucket (24-byte header)
//! ┌──────────┬────────┬───────────┬──────────┬──────────────┬────────────────┐
//! │ fill (4) │ id (4) │ depth (4) │ rsv (4)  │ overflow (8) │ blocks...      │
//! └──────────┴────────┴───────────┴──────────┴──────────────┴────────────────┘
//!
//! Block: [key (key_length) | value (value_length)]
//! ```
//!
//! A bucket address is `(buffer_id << 32) | offset_in_buffer`. Address `0`
//! never names a bucket and terminates overflow chains.
//!
//! Blocks are appended behind the live ones and removal shifts the tail
//! down, so a bucket never holds gaps.

mod array;

pub use array::{BlockPosition, BucketArray};

/// Buckets per buffer
pub const ALLOCATION_FACTOR: usize = 32;

/// Depth marker of an overflow bucket
pub const OVERFLOW_BUCKET: i32 = -1;

/// Depth marker of an overflow bucket that was emptied but could not be
/// released because it is not the last bucket of its buffer
pub const ABANDONED_BUCKET: i32 = -73;

/// Address that names no bucket
pub const NO_BUCKET: u64 = 0;

// =============================================================================
// Header Offsets
// =============================================================================

pub const MAIN_BUFFER_COUNT_OFFSET: usize = 0;
pub const MAIN_BUCKET_COUNT_OFFSET: usize = 4;
pub const MAIN_BLOCK_COUNT_OFFSET: usize = 8;
pub const MAIN_HIGHEST_BUCKET_ID_OFFSET: usize = 16;
pub const MAIN_HEADER_LENGTH: usize = 20;

pub const BUFFER_BUCKET_COUNT_OFFSET: usize = 0;
pub const BUFFER_HEADER_LENGTH: usize = 8;

pub const BUCKET_FILL_COUNT_OFFSET: usize = 0;
pub const BUCKET_ID_OFFSET: usize = 4;
pub const BUCKET_DEPTH_OFFSET: usize = 8;
pub const BUCKET_OVERFLOW_POINTER_OFFSET: usize = 16;
pub const BUCKET_DATA_OFFSET: usize = 24;

/// Compose a bucket address
#[inline]
pub fn bucket_address(buffer_id: usize, offset: usize) -> u64 {
    ((buffer_id as u64) << 32) | offset as u64
}

/// Split a bucket address into `(buffer_id, offset)`
#[inline]
pub fn split_address(address: u64) -> (usize, usize) {
    ((address >> 32) as usize, (address & 0xffff_ffff) as usize)
}
