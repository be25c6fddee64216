//! One iteration of the session loop: wait for readable streams, move
//! bytes to disk, restart idle slots, pace throughput, detect completion.

use anyhow::Result;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::control::CancelToken;
use crate::retry::{classify, ErrorKind, TransferError};
use crate::transport;

use super::reactivate::reactivate;
use super::setup::{self, SetupJob};
use super::slot::{lock, SharedSlot, Slot, SlotState};
use super::{Readiness, Session, SessionError};

/// Upper bound on one readiness wait, and the idle sleep when no slot is
/// connected.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

enum ReadOutcome {
    Data(usize),
    Closed,
    Stalled,
    Failed(io::Error),
}

enum Restart {
    Setup(u32),
    Abandon(u32),
}

impl Session {
    /// Runs one loop iteration. Errors are fatal and leave the session
    /// `Failed`.
    pub fn step(&mut self) -> Result<()> {
        let result = self.step_inner();
        if result.is_err() {
            self.readiness = Readiness::Failed;
        }
        result
    }

    fn step_inner(&mut self) -> Result<()> {
        let now = Instant::now();
        if now >= self.next_snapshot {
            self.save_state();
            self.next_snapshot = now + self.cfg.save_state_interval();
        }

        let mut polled = Vec::new();
        let mut handles = Vec::new();
        let mut buffered = Vec::new();
        for (i, slot) in self.slots.iter().enumerate() {
            let guard = lock(slot);
            if let SlotState::Active { stream, .. } = &guard.state {
                polled.push(i);
                handles.push(stream.poll_handle());
                buffered.push(stream.buffered() > 0);
            }
        }

        if polled.is_empty() {
            thread::sleep(POLL_INTERVAL);
        } else {
            let wait = if buffered.iter().any(|&b| b) {
                Duration::ZERO
            } else {
                POLL_INTERVAL
            };
            let ready = transport::wait_readable(&handles, wait).map_err(SessionError::Poll)?;
            for (k, &i) in polled.iter().enumerate() {
                self.service_slot(i, ready[k] || buffered[k])?;
                if self.readiness != Readiness::Running {
                    return Ok(());
                }
            }
        }

        self.restart_idle_slots()?;
        self.update_rate();
        self.check_complete()
    }

    fn service_slot(&mut self, index: usize, readable: bool) -> Result<()> {
        let slot = Arc::clone(&self.slots[index]);
        let mut guard = lock(&slot);

        if let Some(start) = guard.rewind_to.take() {
            let back = guard.segment.current_byte.saturating_sub(start);
            tracing::info!(
                slot = index,
                "server ignored the range, downloading again from byte {}",
                start
            );
            self.bytes_completed = self.bytes_completed.saturating_sub(back);
            guard.segment.current_byte = start;
        }

        let now = Instant::now();
        let outcome = {
            let SlotState::Active {
                stream,
                last_transfer,
            } = &mut guard.state
            else {
                return Ok(());
            };
            if !readable {
                if now.duration_since(*last_transfer) <= self.cfg.connection_timeout() {
                    return Ok(());
                }
                ReadOutcome::Stalled
            } else {
                match transport::read_some(stream.as_mut(), &mut self.buffer) {
                    Ok(0) => ReadOutcome::Closed,
                    Ok(n) => {
                        *last_transfer = now;
                        ReadOutcome::Data(n)
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                    Err(e) => ReadOutcome::Failed(e),
                }
            }
        };

        match outcome {
            ReadOutcome::Data(n) => self.on_data(index, &mut guard, n)?,
            ReadOutcome::Closed => self.on_closed(index, &mut guard),
            ReadOutcome::Stalled => {
                tracing::warn!(slot = index, "no data for {:?}, reconnecting", self.cfg.connection_timeout());
                self.counters.record(ErrorKind::Timeout);
                guard.disconnect();
            }
            ReadOutcome::Failed(e) => {
                tracing::warn!(slot = index, "read error: {}, reconnecting", e);
                self.counters.record(classify(&TransferError::Io(e)));
                guard.disconnect();
            }
        }
        Ok(())
    }

    fn on_data(&mut self, index: usize, slot: &mut Slot, n: usize) -> Result<()> {
        let offset = slot.segment.current_byte;
        let len = (n as u64).min(slot.segment.remaining()) as usize;
        if len > 0 {
            let Some(output) = &self.output else {
                return Err(SessionError::NotOpen.into());
            };
            if let Err(e) = output.write_at(offset, &self.buffer[..len]) {
                tracing::error!(slot = index, "write failed at offset {}: {:#}", offset, e);
                return Err(e.context(SessionError::Write { offset, len }));
            }
            slot.segment.current_byte += len as u64;
            self.bytes_completed += len as u64;
        }
        if slot.segment.is_exhausted() {
            tracing::debug!(slot = index, "segment finished");
            slot.disconnect();
            if self.resumable {
                reactivate(&self.slots, index, slot);
            }
        }
        Ok(())
    }

    fn on_closed(&mut self, index: usize, slot: &mut Slot) {
        let segment = slot.segment;
        slot.disconnect();
        if !self.resumable {
            match self.total_size {
                Some(total) if segment.current_byte < total => {
                    tracing::warn!(
                        slot = index,
                        "connection closed at byte {} of {}, starting over",
                        segment.current_byte,
                        total
                    );
                    self.counters.record(ErrorKind::Connection);
                }
                _ => {
                    tracing::info!(slot = index, "server closed the stream, download finished");
                    self.readiness = Readiness::Complete;
                }
            }
            return;
        }
        if segment.is_exhausted() {
            tracing::debug!(slot = index, "connection finished");
            reactivate(&self.slots, index, slot);
        } else {
            tracing::warn!(
                slot = index,
                "connection closed early at byte {}, reconnecting",
                segment.current_byte
            );
            self.counters.record(ErrorKind::Connection);
        }
    }

    /// Starts setups for idle slots whose backoff has passed and abandons
    /// setups that took longer than the reconnect delay.
    pub(super) fn restart_idle_slots(&mut self) -> Result<()> {
        let now = Instant::now();
        let sole = self.slots.len() == 1;
        for index in 0..self.slots.len() {
            let slot = Arc::clone(&self.slots[index]);
            let mut guard = lock(&slot);
            let action = match &guard.state {
                SlotState::Idle { retry_at, attempt } => {
                    if guard.segment.is_exhausted() || retry_at.is_some_and(|t| now < t) {
                        continue;
                    }
                    Restart::Setup(*attempt)
                }
                SlotState::Connecting {
                    since,
                    cancel,
                    attempt,
                } => {
                    if now.duration_since(*since) <= self.cfg.reconnect_delay() {
                        continue;
                    }
                    cancel.cancel();
                    Restart::Abandon(*attempt)
                }
                SlotState::Active { .. } => continue,
            };
            match action {
                Restart::Setup(attempt) => self.begin_setup(index, &slot, &mut guard, attempt, sole)?,
                Restart::Abandon(attempt) => {
                    tracing::warn!(slot = index, "connection setup timed out, retrying");
                    self.counters.record(ErrorKind::Timeout);
                    guard.state = SlotState::Idle {
                        retry_at: None,
                        attempt: attempt.saturating_add(1),
                    };
                }
            }
        }
        Ok(())
    }

    fn begin_setup(
        &self,
        index: usize,
        shared: &SharedSlot,
        slot: &mut Slot,
        attempt: u32,
        sole: bool,
    ) -> Result<()> {
        slot.generation += 1;
        let cancel = CancelToken::new();
        slot.state = SlotState::Connecting {
            since: Instant::now(),
            cancel: cancel.clone(),
            attempt,
        };
        tracing::debug!(
            slot = index,
            "connecting for {}",
            slot.segment.range_header_value()
        );
        let job = SetupJob {
            index,
            slot: Arc::clone(shared),
            client: Arc::clone(&self.client),
            target: Arc::clone(&self.target),
            segment: slot.segment,
            local: slot.local,
            cancel,
            generation: slot.generation,
            attempt,
            sole,
            retry: self.retry,
            counters: Arc::clone(&self.counters),
        };
        setup::spawn(job).map_err(SessionError::Spawn)?;
        Ok(())
    }

    /// Refreshes the rate and finish estimate, then sleeps as long as the
    /// rate controller asks.
    fn update_rate(&mut self) {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        let fetched = self.bytes_completed.saturating_sub(self.start_byte);
        self.bytes_per_second = if elapsed > 0.0 {
            (fetched as f64 / elapsed) as u64
        } else {
            0
        };
        self.finish_at = match self.total_size {
            Some(total) if self.bytes_per_second > 0 => {
                let secs = total.saturating_sub(self.start_byte) as f64 / self.bytes_per_second as f64;
                Some(self.started_at + Duration::from_secs_f64(secs))
            }
            _ => None,
        };
        if let Some(delay) = self.throttle.adjust(self.bytes_per_second) {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        }
    }

    /// Marks the session complete once every byte is written. Exhausted
    /// segments with a short byte count fail the session.
    pub(super) fn check_complete(&mut self) -> Result<()> {
        if self.readiness != Readiness::Running {
            return Ok(());
        }
        let Some(total) = self.total_size else {
            return Ok(());
        };
        if self.bytes_completed >= total {
            self.readiness = Readiness::Complete;
            return Ok(());
        }
        let all_done = self.slots.iter().all(|s| lock(s).segment.is_exhausted());
        if all_done {
            tracing::error!(
                "all ranges finished but byte count is {} of {}",
                self.bytes_completed,
                total
            );
            self.readiness = Readiness::Failed;
            return Err(SessionError::CountMismatch {
                completed: self.bytes_completed,
                total,
            }
            .into());
        }
        Ok(())
    }
}
