//! Facade Module
//!
//! Typed indexes binding one key handler and one value handler to the
//! generic engine.
//!
//! | Facade            | Key              | Value                  |
//! |-------------------|------------------|------------------------|
//! | `Long2LongIndex`  | `i64`            | `i64`                  |
//! | `Long2BytesIndex` | `i64`            | `[u8]`, bounded length |
//! | `Bytes2LongIndex` | `[u8]`, bounded  | `i64`                  |
//!
//! Primitive lookups take a caller-supplied `missing` value returned for
//! absent keys.

mod bytes2long;
mod long2bytes;
mod long2long;

pub use bytes2long::Bytes2LongIndex;
pub use long2bytes::Long2BytesIndex;
pub use long2long::Long2LongIndex;

/// Pass-through operations every facade exposes from its inner `HashIndex`
macro_rules! delegate_index_ops {
    ($key:ty, $value:ty) => {
        /// Number of allocated blocks
        pub fn block_count(&self) -> usize {
            self.index.block_count()
        }

        /// Number of index table slots
        pub fn index_size(&self) -> usize {
            self.index.index_size()
        }

        /// Discard all entries
        pub fn clear(&mut self) -> $crate::error::Result<()> {
            self.index.clear()
        }

        /// Persist to the backing stores
        pub fn flush(&mut self) -> $crate::error::Result<()> {
            self.index.flush()
        }

        /// Reload from the backing stores
        pub fn reinit(&mut self) -> $crate::error::Result<()> {
            self.index.reinit()
        }

        pub fn index(&self) -> &$crate::index::HashIndex<$key, $value, S> {
            &self.index
        }

        pub fn index_mut(&mut self) -> &mut $crate::index::HashIndex<$key, $value, S> {
            &mut self.index
        }
    };
}

pub(crate) use delegate_index_ops;
