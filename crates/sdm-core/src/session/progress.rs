//! Progress reporting for a running session (bytes done, ETA, rate).
//!
//! Rate is measured over bytes fetched by this run only, so a resumed
//! download does not report the already-present bytes as speed.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::retry::ErrorKind;

/// Snapshot of download progress (CLI-friendly).
#[derive(Debug, Clone)]
pub struct ProgressStats {
    /// Bytes present in the output file, including earlier runs.
    pub bytes_done: u64,
    /// Bytes fetched since this run started.
    pub bytes_this_run: u64,
    /// Total file size, when the server reported one.
    pub total_bytes: Option<u64>,
    /// Elapsed time since this run started (seconds).
    pub elapsed_secs: f64,
    /// Slots with a stream attached.
    pub active_slots: usize,
    pub slot_count: usize,
}

impl ProgressStats {
    /// Download rate of this run in bytes per second (0 if elapsed is 0).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_this_run as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None if size or rate is unknown).
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.total_bytes?.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Fraction complete in [0.0, 1.0]; None when the size is unknown.
    pub fn fraction(&self) -> Option<f64> {
        let total = self.total_bytes?;
        if total == 0 {
            return Some(1.0);
        }
        Some((self.bytes_done as f64 / total as f64).min(1.0))
    }
}

/// Counts of retryable events observed during a download.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadSummary {
    pub throttle_events: u32,
    pub error_events: u32,
}

/// Shared between the session loop and its setup threads.
#[derive(Debug, Default)]
pub(crate) struct SummaryCounters {
    throttle: AtomicU32,
    errors: AtomicU32,
}

impl SummaryCounters {
    pub fn record(&self, kind: ErrorKind) {
        if kind == ErrorKind::Throttled {
            self.throttle.fetch_add(1, Ordering::Relaxed);
        } else {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn summary(&self) -> DownloadSummary {
        DownloadSummary {
            throttle_events: self.throttle.load(Ordering::Relaxed),
            error_events: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(done: u64, this_run: u64, total: Option<u64>, secs: f64) -> ProgressStats {
        ProgressStats {
            bytes_done: done,
            bytes_this_run: this_run,
            total_bytes: total,
            elapsed_secs: secs,
            active_slots: 1,
            slot_count: 4,
        }
    }

    #[test]
    fn rate_ignores_bytes_from_earlier_runs() {
        let p = stats(600, 100, Some(1000), 2.0);
        assert_eq!(p.bytes_per_sec(), 50.0);
        assert_eq!(p.eta_secs(), Some(8.0));
        assert_eq!(p.fraction(), Some(0.6));
    }

    #[test]
    fn unknown_size_has_no_eta() {
        let p = stats(600, 600, None, 2.0);
        assert_eq!(p.eta_secs(), None);
        assert_eq!(p.fraction(), None);
    }

    #[test]
    fn zero_elapsed_has_no_rate() {
        let p = stats(10, 10, Some(100), 0.0);
        assert_eq!(p.bytes_per_sec(), 0.0);
        assert_eq!(p.eta_secs(), None);
    }

    #[test]
    fn empty_file_is_complete() {
        let p = stats(0, 0, Some(0), 0.0);
        assert_eq!(p.fraction(), Some(1.0));
        assert_eq!(p.eta_secs(), Some(0.0));
    }

    #[test]
    fn counters_split_throttle_from_errors() {
        let c = SummaryCounters::default();
        c.record(ErrorKind::Throttled);
        c.record(ErrorKind::Timeout);
        c.record(ErrorKind::Http5xx(502));
        assert_eq!(
            c.summary(),
            DownloadSummary {
                throttle_events: 1,
                error_events: 2
            }
        );
    }
}
