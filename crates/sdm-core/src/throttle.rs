//! Throughput ceiling: a single inter-iteration sleep nudged up or down by
//! 10 ms until measured speed sits within 5% of the target.

use std::time::Duration;

/// Delay adjustment per iteration.
pub const DELAY_STEP: Duration = Duration::from_millis(10);

/// Buffer size to use under `ceiling`: when the ceiling is less than half a
/// buffer per second, the buffer shrinks to the ceiling so single reads do
/// not overshoot.
pub fn effective_buffer_size(ceiling: u64, buffer_size: usize) -> usize {
    if ceiling == 0 || buffer_size == 0 {
        return buffer_size.max(1);
    }
    if ceiling.saturating_mul(16) / (buffer_size as u64) < 8 {
        tracing::debug!(ceiling, "buffer resized for this speed");
        return ceiling.max(1) as usize;
    }
    buffer_size
}

/// Adaptive sleep toward a bytes-per-second ceiling (0 = unlimited).
#[derive(Debug, Clone)]
pub struct RateController {
    ceiling: u64,
    delay: Duration,
}

impl RateController {
    /// Seeds the delay with the time `connections` full buffers take at the
    /// ceiling, so the first iterations are already near target.
    pub fn new(ceiling: u64, buffer_size: usize, connections: usize) -> Self {
        let delay = if ceiling == 0 {
            Duration::ZERO
        } else {
            let ns = 1_000_000_000u128 * buffer_size as u128 * connections as u128 / ceiling as u128;
            Duration::from_nanos(ns.min(u64::MAX as u128) as u64)
        };
        Self { ceiling, delay }
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_limited(&self) -> bool {
        self.ceiling > 0
    }

    /// Feeds one throughput sample and returns the delay to sleep this
    /// iteration (`None` when unlimited).
    pub fn adjust(&mut self, bytes_per_second: u64) -> Option<Duration> {
        if self.ceiling == 0 {
            return None;
        }
        let ratio = 1000u128 * bytes_per_second as u128 / self.ceiling as u128;
        if ratio > 1050 {
            self.delay += DELAY_STEP;
        } else if ratio < 950 {
            self.delay = self.delay.saturating_sub(DELAY_STEP);
        }
        Some(self.delay)
    }
}
