use std::time::Duration;

/// High-level classification of an error for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation timed out (connect/read) or was cancelled for taking too long.
    Timeout,
    /// Server asked us to slow down (e.g. 429, 503, FTP 421).
    Throttled,
    /// Network-level failure (connection reset, DNS, etc.).
    Connection,
    /// HTTP status that is retryable but not strictly throttling (5xx).
    Http5xx(u16),
    /// Anything else (protocol violations, 4xx); retried at the slowest pace.
    Other,
}

/// Exponential backoff between connection setups of one slot.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(20),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next setup after `attempt` consecutive failures
    /// (1-based). Errors unlikely to clear quickly wait the full cap.
    pub fn delay_for(&self, attempt: u32, kind: ErrorKind) -> Duration {
        match kind {
            ErrorKind::Other => self.max_delay,
            ErrorKind::Timeout
            | ErrorKind::Connection
            | ErrorKind::Throttled
            | ErrorKind::Http5xx(_) => {
                // base * 2^(attempt-1), capped.
                let exp = 1u32 << attempt.saturating_sub(1).min(16);
                self.base_delay.saturating_mul(exp).min(self.max_delay)
            }
        }
    }
}
