//! Shared index handle
//!
//! Indexes are single-threaded. `Shared` puts one behind a
//! `parking_lot::RwLock`: lookups take the read lock and run concurrently,
//! mutations take the write lock.

use std::sync::Arc;

use parking_lot::RwLock;

/// Cloneable handle to an index shared across threads
///
/// ```
/// use exthash::{Config, Long2LongIndex, Shared};
///
/// let index = Shared::new(Long2LongIndex::new(&Config::default()).unwrap());
/// index.write(|idx| idx.put(7, 70)).unwrap();
/// assert_eq!(index.read(|idx| idx.get(7, -1)).unwrap(), 70);
/// ```
pub struct Shared<T> {
    inner: Arc<RwLock<T>>,
}

impl<T> Shared<T> {
    pub fn new(index: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(index)),
        }
    }

    /// Run `f` under the read lock
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.read())
    }

    /// Run `f` under the write lock
    pub fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.inner.write())
    }

    /// Unwrap the index if this is the last handle
    pub fn try_unwrap(self) -> Result<T, Self> {
        Arc::try_unwrap(self.inner)
            .map(RwLock::into_inner)
            .map_err(|inner| Self { inner })
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
