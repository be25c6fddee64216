//! Resume state side-car (`<output>.st`).
//!
//! Binary, native byte order:
//!
//! ```text
//! u32  slot_count
//! i64  bytes_completed
//! slot_count x { i64 current_byte, i64 last_byte }
//! ```
//!
//! Older files stored only `current_byte` per slot. They are recognised by
//! their length and their bounds are rebuilt with [`divide`](crate::segmenter::divide).

mod read;
mod write;

#[cfg(test)]
mod tests;

pub use read::{decode, read_record, restore};
pub use write::{encode, remove, snapshot};

use crate::segmenter::Segment;

pub(crate) const HEADER_LEN: u64 = 4 + 8;
pub(crate) const SLOT_LEN: u64 = 16;
pub(crate) const LEGACY_SLOT_LEN: u64 = 8;

/// Progress captured in a state file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRecord {
    pub bytes_completed: u64,
    pub segments: Vec<Segment>,
}

impl StateRecord {
    pub fn slot_count(&self) -> usize {
        self.segments.len()
    }

    /// Bytes still to fetch across all slots.
    pub fn remaining(&self) -> u64 {
        self.segments.iter().map(Segment::remaining).sum()
    }
}

/// Why a state file was rejected.
#[derive(Debug, thiserror::Error)]
pub enum StateFileError {
    #[error("state file I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("state file truncated: {len} bytes, need at least {needed}")]
    Truncated { len: u64, needed: u64 },
    #[error("state file declares zero connections")]
    NoSlots,
    #[error("state file field is negative: {0}")]
    Negative(i64),
    #[error("slot {slot} has invalid range {current}..{last}")]
    BadRange { slot: usize, current: u64, last: u64 },
    #[error("state file claims {completed} bytes done of a {total}-byte file")]
    Oversized { completed: u64, total: u64 },
    #[error("old-format state file cannot be used without a known file size")]
    LegacyNeedsSize,
    #[error("old-format state file has {found} connections but the file splits into {expected}")]
    LegacyMismatch { found: usize, expected: usize },
}
