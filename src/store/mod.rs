//! Store Module
//!
//! Backing storage for the index table and the block region.
//!
//! ## Responsibilities
//! - Allocate fixed-size regions (append-only, contiguous)
//! - Hand out read and write views of allocated regions
//! - Persist to and reload from the backing medium
//!
//! An index uses two stores: one holding the index table, one holding the
//! blocks. The engine never assumes a particular medium; it relies only on
//! offset stability and synchronous access.
//!
//! ## File Format (`FileStore`)
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ Header (bincode, 18 bytes)                           │
//! │   Magic "XHST" (4) | Version u16 (2) | Length u64 (8)│
//! │   CRC32 of region u32 (4)                            │
//! ├──────────────────────────────────────────────────────┤
//! │ Region bytes (Length)                                │
//! └──────────────────────────────────────────────────────┘
//! ```

mod file;
mod memory;

use crate::error::Result;

pub use file::{FileStore, BLOCKS_FILENAME, INDEX_FILENAME};
pub use memory::MemoryStore;

/// A growable region of bytes addressed by offset
///
/// Allocation is append-only: `allocate` returns the current length and grows
/// the region by `size` zeroed bytes. Offsets stay valid until `clear` or
/// `restore`.
pub trait BlockStore {
    /// Allocate `size` zeroed bytes at the end of the region, returning their offset
    fn allocate(&mut self, size: usize) -> Result<u64>;

    /// Read view of `len` bytes at `offset`
    fn load(&self, offset: u64, len: usize) -> Result<&[u8]>;

    /// Write view of `len` bytes at `offset`
    fn load_mut(&mut self, offset: u64, len: usize) -> Result<&mut [u8]>;

    /// Number of allocated bytes
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The whole allocated region
    fn region(&self) -> &[u8];

    /// Replace the whole region (snapshot restore)
    fn restore(&mut self, region: Vec<u8>) -> Result<()>;

    /// Persist the region to the backing medium
    fn flush(&mut self) -> Result<()>;

    /// Drop every allocation
    fn clear(&mut self) -> Result<()>;

    /// Read the region as persisted on the backing medium, leaving the
    /// in-memory region untouched
    fn read_persisted(&self) -> Result<Vec<u8>>;

    /// Discard in-memory contents and re-read the backing medium
    fn reload(&mut self) -> Result<()> {
        let region = self.read_persisted()?;
        self.restore(region)
    }
}
