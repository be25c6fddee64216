//! Connection failures and reconnect backoff.
//!
//! Classifies slot failures (timeouts, throttling, connection loss) and
//! turns them into a not-before delay. Slots are never given up on; a
//! permanently failing server shows up as stalled progress and a growing
//! error count in the download summary.

mod classify;
mod error;
mod policy;

pub use classify::{classify, classify_http_status};
pub use error::TransferError;
pub use policy::{ErrorKind, RetryPolicy};
