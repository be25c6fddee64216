//! Per-connection slot: a segment plus the connection driving it.

use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::control::CancelToken;
use crate::segmenter::Segment;
use crate::transport::Transport;

/// Connection lifecycle of one slot.
pub(crate) enum SlotState {
    /// No connection. Restarted once `retry_at` has passed, if the segment
    /// still has bytes left.
    Idle {
        retry_at: Option<Instant>,
        /// Consecutive failed setups.
        attempt: u32,
    },
    /// A setup task is connecting and negotiating the range.
    Connecting {
        since: Instant,
        cancel: CancelToken,
        attempt: u32,
    },
    /// Stream attached; the session loop reads from it.
    Active {
        stream: Box<dyn Transport>,
        last_transfer: Instant,
    },
}

/// Coarse view of [`SlotState`] for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPhase {
    Idle,
    Connecting,
    Active,
}

pub(crate) struct Slot {
    pub segment: Segment,
    pub state: SlotState,
    /// Local address outgoing connections bind to.
    pub local: Option<IpAddr>,
    /// Bumped for every setup; a task whose generation no longer matches
    /// was cancelled and must not install its stream.
    pub generation: u64,
    /// Offset the freshly attached stream really starts at, when it is
    /// before `segment.current_byte` (server ignored the range on the sole
    /// connection). Applied by the session loop, which owns the counters.
    pub rewind_to: Option<u64>,
}

pub(crate) type SharedSlot = Arc<Mutex<Slot>>;

impl Slot {
    pub fn new(segment: Segment, local: Option<IpAddr>) -> Self {
        Self {
            segment,
            state: SlotState::Idle {
                retry_at: None,
                attempt: 0,
            },
            local,
            generation: 0,
            rewind_to: None,
        }
    }

    pub fn shared(segment: Segment, local: Option<IpAddr>) -> SharedSlot {
        Arc::new(Mutex::new(Self::new(segment, local)))
    }

    pub fn phase(&self) -> SlotPhase {
        match self.state {
            SlotState::Idle { .. } => SlotPhase::Idle,
            SlotState::Connecting { .. } => SlotPhase::Connecting,
            SlotState::Active { .. } => SlotPhase::Active,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, SlotState::Idle { .. })
    }

    /// Drops any stream or pending setup and goes idle, eligible for a
    /// restart right away.
    pub fn disconnect(&mut self) {
        if let SlotState::Connecting { cancel, .. } = &self.state {
            cancel.cancel();
        }
        self.state = SlotState::Idle {
            retry_at: None,
            attempt: 0,
        };
    }
}

/// Locks a slot. A panic while holding the lock leaves plain data behind,
/// so a poisoned lock is recovered rather than propagated.
pub(crate) fn lock(slot: &SharedSlot) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
