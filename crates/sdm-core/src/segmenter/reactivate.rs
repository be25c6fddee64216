//! Work stealing between segments: the largest remaining span is halved and
//! its upper half handed to a segment that already finished.

use super::range::{Segment, MIN_CHUNK_WORTH};

/// Picks the donor among `(index, remaining)` pairs: the largest remaining
/// span strictly above `MIN_CHUNK_WORTH - 1`. Ties go to the first scanned.
pub fn pick_donor<I>(remainders: I) -> Option<(usize, u64)>
where
    I: IntoIterator<Item = (usize, u64)>,
{
    let mut max_remaining = MIN_CHUNK_WORTH - 1;
    let mut best = None;
    for (index, remaining) in remainders {
        if remaining > max_remaining {
            max_remaining = remaining;
            best = Some((index, remaining));
        }
    }
    best
}

/// Moves the upper half of `donor`'s remaining span to `idle`.
///
/// `idle` ends where the donor used to end and starts at the split point; the
/// donor now ends at the split point. The union of both is unchanged.
pub fn split_into(donor: &mut Segment, idle: &mut Segment) {
    let half = donor.remaining() / 2;
    idle.last_byte = donor.last_byte;
    donor.last_byte = donor.current_byte + half;
    idle.current_byte = donor.last_byte;
}

/// Reactivates `segments[idle]` in place. Returns false (and changes nothing)
/// when the idle segment still has bytes left or no donor is worth splitting.
///
/// Connection state is not visible here; the session checks that the idle
/// slot is disconnected before calling the locked equivalent.
pub fn reactivate_segments(segments: &mut [Segment], idle: usize) -> bool {
    if idle >= segments.len() || !segments[idle].is_exhausted() {
        return false;
    }
    let candidates = segments
        .iter()
        .enumerate()
        .filter(|(j, _)| *j != idle)
        .map(|(j, s)| (j, s.remaining()));
    let Some((donor, _)) = pick_donor(candidates) else {
        return false;
    };
    let mut idle_seg = segments[idle];
    split_into(&mut segments[donor], &mut idle_seg);
    segments[idle] = idle_seg;
    true
}
