//! Connection setup off the session thread.
//!
//! Each setup runs on its own detached thread: connect, negotiate the
//! slot's range, then attach the stream to the slot. A setup that was
//! cancelled or superseded (generation mismatch) drops its stream instead.

use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::control::CancelToken;
use crate::protocol::{OpenedStream, ProtocolClient, Target};
use crate::retry::{classify, RetryPolicy, TransferError};
use crate::segmenter::Segment;

use super::progress::SummaryCounters;
use super::slot::{lock, SharedSlot, SlotState};

pub(super) struct SetupJob {
    pub index: usize,
    pub slot: SharedSlot,
    pub client: Arc<ProtocolClient>,
    pub target: Arc<Target>,
    pub segment: Segment,
    pub local: Option<IpAddr>,
    pub cancel: CancelToken,
    pub generation: u64,
    pub attempt: u32,
    /// Only slot of the download; may accept a stream starting before
    /// the requested offset.
    pub sole: bool,
    pub retry: RetryPolicy,
    pub counters: Arc<SummaryCounters>,
}

pub(super) fn spawn(job: SetupJob) -> io::Result<()> {
    thread::Builder::new()
        .name(format!("sdm-setup-{}", job.index))
        .spawn(move || job.run())?;
    Ok(())
}

impl SetupJob {
    fn run(self) {
        let result = self
            .client
            .open(&self.target, self.segment, self.local, &self.cancel)
            .and_then(|opened| self.check_start(opened));

        let mut slot = lock(&self.slot);
        if self.cancel.is_cancelled() || slot.generation != self.generation {
            tracing::debug!(slot = self.index, "setup superseded, dropping connection");
            return;
        }
        match result {
            Ok(opened) => {
                if opened.start != self.segment.current_byte {
                    slot.rewind_to = Some(opened.start);
                }
                tracing::info!(
                    slot = self.index,
                    "connected to {}:{}{}, downloading from byte {}",
                    self.target.host,
                    self.target.port,
                    self.local.map(|a| format!(" via {a}")).unwrap_or_default(),
                    opened.start
                );
                slot.state = SlotState::Active {
                    stream: opened.transport,
                    last_transfer: Instant::now(),
                };
            }
            Err(e) => {
                let kind = classify(&e);
                self.counters.record(kind);
                let attempt = self.attempt.saturating_add(1);
                let delay = self.retry.delay_for(attempt, kind);
                tracing::warn!(
                    slot = self.index,
                    attempt,
                    "connection setup failed: {}; retrying in {:?}",
                    e,
                    delay
                );
                slot.state = SlotState::Idle {
                    retry_at: Some(Instant::now() + delay),
                    attempt,
                };
            }
        }
    }

    /// A stream must start where the slot left off. Only the sole slot may
    /// take one that starts earlier; it rewinds and downloads again.
    fn check_start(&self, opened: OpenedStream) -> Result<OpenedStream, TransferError> {
        let wanted = self.segment.current_byte;
        if opened.start == wanted || (self.sole && opened.start < wanted) {
            Ok(opened)
        } else {
            Err(TransferError::RangeIgnored {
                wanted,
                actual: opened.start,
            })
        }
    }
}
