//! Block scanning
//!
//! One scan loop shared by get, put, remove and split. The visitor sees live
//! records in physical order and decides whether the scan stops.

use crate::layout::{BlockLayout, RECORD_TYPE_OFFSET, TYPE_FREE, TYPE_RECORD};

use super::header::BlockHeader;

/// Visitor decision for one live record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Visit {
    Continue,
    Stop,
}

/// Result of a block scan
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ScanOutcome {
    /// Slot of the record the visitor stopped at
    pub hit: Option<usize>,
    /// First free or tombstoned slot seen before the scan ended
    pub first_free: Option<usize>,
}

/// Scan the live records of `block`.
///
/// The scan ends after `fill_count` live records or at the first never
/// written slot, so slots past the last live record are never touched. When the visitor never stops, `first_free` is
/// `Some` exactly when the block has room for another record.
pub(crate) fn scan_block<F>(block: &[u8], layout: &BlockLayout, mut visit: F) -> ScanOutcome
where
    F: FnMut(usize, &[u8]) -> Visit,
{
    let fill_count = BlockHeader::read(block).fill_count;
    let capacity = layout.records_per_block();
    let record_length = layout.record_length();

    let mut outcome = ScanOutcome::default();
    let mut live = 0;
    let mut slot = 0;

    while live < fill_count && slot < capacity {
        let start = layout.record_offset(slot);
        let record = &block[start..start + record_length];

        match record[RECORD_TYPE_OFFSET] {
            TYPE_RECORD => {
                live += 1;
                if visit(slot, record) == Visit::Stop {
                    outcome.hit = Some(slot);
                    return outcome;
                }
            }
            // Written slots form a prefix; nothing live follows a free one
            TYPE_FREE => break,
            _ => {
                if outcome.first_free.is_none() {
                    outcome.first_free = Some(slot);
                }
            }
        }

        slot += 1;
    }

    if outcome.first_free.is_none() && slot < capacity {
        outcome.first_free = Some(slot);
    }

    outcome
}
