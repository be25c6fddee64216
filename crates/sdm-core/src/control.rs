//! Cooperative cancellation: shared abort flags for connection setups and
//! for a whole download.
//!
//! A setup task checks its token between blocking steps and gives up; the
//! session checks the download's token once per loop iteration and stops,
//! leaving the caller to write the final snapshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Error returned when a download is stopped by the user (e.g. Ctrl-C).
#[derive(Debug)]
pub struct DownloadAborted;

impl std::fmt::Display for DownloadAborted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "download aborted by user")
    }
}

impl std::error::Error for DownloadAborted {}

/// Cloneable cancellation flag. All clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let t = CancelToken::new();
        let c = t.clone();
        assert!(!c.is_cancelled());
        t.cancel();
        assert!(c.is_cancelled());
    }

    #[test]
    fn aborted_message() {
        let err = anyhow::anyhow!(DownloadAborted);
        assert_eq!(err.to_string(), "download aborted by user");
        assert!(err.downcast_ref::<DownloadAborted>().is_some());
    }
}
