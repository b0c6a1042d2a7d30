//! Index Module
//!
//! The extensible hashing engine.
//!
//! ## Responsibilities
//! - Address blocks through the index table by masked key hash
//! - Scan blocks for get/put/remove with a shared visitor loop
//! - Split full blocks and repair the index table locally
//! - Clear, flush and reload the backing stores
//!
//! ## Growth
//! ```text
//!  slot:   0    1    2    3             0    1    2    3
//!          │    │    │    │             │    │    │    │
//!          └────┴──┬─┴────┘             └──┬─┴────┼────┘
//!                  ▼            split      ▼      ▼    (slots 1 and 3
//!            ┌───────────┐     ──────►  ┌──────┐ ┌──────┐  repointed)
//!            │ id 0, d 0 │              │id 0  │ │id 1  │
//!            └───────────┘              │d 1   │ │d 1   │
//!                                       └──────┘ └──────┘
//! ```
//! There is no directory doubling: the table always has `index_size` slots.
//! A split only rewrites the slots of the block being split.

mod hash_index;
mod header;
mod scan;
mod stats;

pub use hash_index::HashIndex;
pub use header::{BlockHeader, IndexMetadata};
pub use stats::{IndexStats, FILL_BUCKET_LABELS};
