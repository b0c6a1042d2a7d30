//! # exthash
//!
//! An extensible hash index stored entirely in flat byte regions:
//! - Fixed-length records in fixed-capacity blocks
//! - Blocks split on overflow, without doubling a directory
//! - Pluggable key/value codecs (`i64` and bounded byte arrays)
//! - Heap or file-backed block stores
//! - Versioned snapshot streams
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │      Facades: Long2Long / Long2Bytes / Bytes2Long            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │         HashIndex<K: KeyHandler, V: ValueHandler, S>         │
//! │           (lookup / insert / remove / split)                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ Index table │          │ Block region│
//!   │ (BlockStore)│          │ (BlockStore)│
//!   └──────┬──────┘          └──────┬──────┘
//!          └────────────┬───────────┘
//!                       ▼
//!               ┌───────────────┐
//!               │IndexSerializer│
//!               │  (snapshots)  │
//!               └───────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use exthash::{Config, Long2LongIndex};
//!
//! let config = Config::builder().index_size(64).records_per_block(4).build();
//! let mut index = Long2LongIndex::new(&config).unwrap();
//!
//! index.put(1, 10).unwrap();
//! assert_eq!(index.get(1, -1).unwrap(), 10);
//! assert_eq!(index.get(2, -1).unwrap(), -1);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod layout;

pub mod handler;
pub mod store;
pub mod index;
pub mod serializer;
pub mod facade;
pub mod bucket;
pub mod shared;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{IndexError, Result};
pub use config::{Config, ConfigBuilder};
pub use handler::{BytesKey, BytesValue, KeyHandler, LongKey, LongValue, ValueHandler};
pub use store::{BlockStore, FileStore, MemoryStore};
pub use index::{BlockHeader, HashIndex, IndexMetadata, IndexStats};
pub use serializer::{IndexSerializer, SnapshotInfo};
pub use facade::{Bytes2LongIndex, Long2BytesIndex, Long2LongIndex};
pub use bucket::BucketArray;
pub use shared::Shared;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of exthash
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
