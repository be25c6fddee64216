//! Reactivation over locked slots.

use super::slot::{lock, SharedSlot, Slot};
use crate::segmenter::{pick_donor, split_into};

/// Gives the idle slot (already locked by the caller, at `idle_index`) the
/// upper half of the largest remaining segment among the other slots.
///
/// Other slots are locked one at a time in index order while scanning, and
/// only the chosen donor is locked again for the split. Segment bounds are
/// only ever changed by the session loop, so the scanned remainders cannot
/// go stale in between.
pub(crate) fn reactivate(slots: &[SharedSlot], idle_index: usize, idle: &mut Slot) -> bool {
    if !idle.is_idle() || !idle.segment.is_exhausted() {
        return false;
    }
    let remainders: Vec<(usize, u64)> = slots
        .iter()
        .enumerate()
        .filter(|(j, _)| *j != idle_index)
        .map(|(j, s)| (j, lock(s).segment.remaining()))
        .collect();
    let Some((donor_index, _)) = pick_donor(remainders) else {
        tracing::debug!(slot = idle_index, "no segment worth splitting");
        return false;
    };

    let mut donor = lock(&slots[donor_index]);
    split_into(&mut donor.segment, &mut idle.segment);
    tracing::debug!(
        slot = idle_index,
        donor = donor_index,
        "reactivated: taking {}-{} (donor now ends at {})",
        idle.segment.current_byte,
        idle.segment.last_byte,
        donor.segment.last_byte
    );
    true
}
