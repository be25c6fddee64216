//! Range math and segment planning.
//!
//! Splits a download into per-slot segments and redistributes the tail of a
//! busy segment onto a slot that finished early (reactivation).

mod range;
mod reactivate;

pub use range::{divide, Segment, MIN_CHUNK_WORTH, UNBOUNDED};
pub use reactivate::{pick_donor, reactivate_segments, split_into};
