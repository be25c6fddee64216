//! A download session: probe, lay out slots, drive them, snapshot progress.
//!
//! The session thread owns the output file, the counters and the rate
//! controller. Slots are shared with setup threads, which only ever touch
//! their own slot's connection state; segment bounds change on the session
//! thread alone.

mod progress;
mod reactivate;
mod run;
mod setup;
mod slot;

pub use progress::{DownloadSummary, ProgressStats};
pub use slot::SlotPhase;

use anyhow::{Context, Result};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::SdmConfig;
use crate::control::{CancelToken, DownloadAborted};
use crate::protocol::{ClientOptions, ProtocolClient, Target};
use crate::retry::RetryPolicy;
use crate::segmenter::{divide, Segment, UNBOUNDED};
use crate::state_file::{self, StateRecord};
use crate::storage::{self, OutputFile, OutputFileBuilder};
use crate::throttle::{effective_buffer_size, RateController};
use crate::transport::Connector;
use crate::url_model::derive_filename;

use progress::SummaryCounters;
use slot::{lock, SharedSlot, Slot, SlotState};

/// Where a session is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    NotStarted,
    Running,
    Complete,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{} already exists; not overwriting it (no-clobber)", .0.display())]
    AlreadyExists(PathBuf),
    #[error("writing {len} bytes at offset {offset} failed")]
    Write { offset: u64, len: usize },
    #[error("waiting for connections failed: {0}")]
    Poll(#[source] io::Error),
    #[error("cannot start connection thread: {0}")]
    Spawn(#[source] io::Error),
    #[error("session has no open output file")]
    NotOpen,
    #[error("all ranges are finished but only {completed} of {total} bytes were counted")]
    CountMismatch { completed: u64, total: u64 },
}

/// What to download and where to.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    /// Output file, or a directory to place the derived filename in.
    /// `None` derives the filename into the current directory.
    pub output: Option<PathBuf>,
}

/// Outcome of a finished (or stopped) session.
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub output_path: PathBuf,
    pub total_size: Option<u64>,
    pub bytes_completed: u64,
    pub bytes_this_run: u64,
    pub elapsed: Duration,
    pub complete: bool,
    pub resumable: bool,
    pub slot_count: usize,
    pub summary: DownloadSummary,
}

pub struct Session {
    cfg: SdmConfig,
    client: Arc<ProtocolClient>,
    target: Arc<Target>,
    output_path: PathBuf,
    state_path: PathBuf,
    total_size: Option<u64>,
    resumable: bool,
    output: Option<OutputFile>,
    slots: Vec<SharedSlot>,
    bytes_completed: u64,
    start_byte: u64,
    started_at: Instant,
    next_snapshot: Instant,
    bytes_per_second: u64,
    finish_at: Option<Instant>,
    throttle: RateController,
    buffer: Vec<u8>,
    readiness: Readiness,
    retry: RetryPolicy,
    counters: Arc<SummaryCounters>,
    abort: CancelToken,
}

impl Session {
    /// Probes the server and settles the output path. Nothing is written yet.
    pub fn new(
        request: &DownloadRequest,
        cfg: SdmConfig,
        connector: Arc<dyn Connector>,
        abort: CancelToken,
    ) -> Result<Self> {
        let target = Target::parse(&request.url)
            .with_context(|| format!("invalid download URL {:?}", request.url))?;
        let client = ProtocolClient::new(connector, ClientOptions::from_config(&cfg));
        let local = cfg.local_addresses().first().copied();

        tracing::info!("probing {}", target.url);
        let probe = client
            .probe(&target, local, &abort)
            .with_context(|| format!("cannot fetch {}", target.url))?;

        let derived = || {
            derive_filename(
                &probe.target.url,
                probe.filename.as_deref(),
                cfg.strip_cgi_parameters,
                &cfg.default_filename,
            )
        };
        let output_path = match &request.output {
            Some(p) if p.is_dir() => p.join(derived()),
            Some(p) => p.clone(),
            None => PathBuf::from(derived()),
        };
        let state_path = storage::state_path(&output_path);

        if cfg.no_clobber && output_path.exists() {
            if state_path.exists() {
                tracing::info!(
                    "{} exists but is incomplete, resuming despite no-clobber",
                    output_path.display()
                );
            } else {
                return Err(SessionError::AlreadyExists(output_path).into());
            }
        }

        let resumable = probe.resumable && probe.size.is_some();
        match probe.size {
            Some(size) => tracing::info!("file size: {} bytes", size),
            None => tracing::info!("file size unknown, downloading with one connection"),
        }
        if probe.size.is_some() && !resumable {
            tracing::info!("server does not support resuming, using one connection");
        }

        let buffer_size = effective_buffer_size(cfg.max_speed, cfg.buffer_size).max(1);
        let now = Instant::now();
        Ok(Self {
            throttle: RateController::new(cfg.max_speed, buffer_size, 1),
            retry: cfg.retry_policy(),
            client: Arc::new(client),
            target: Arc::new(probe.target),
            output_path,
            state_path,
            total_size: probe.size,
            resumable,
            output: None,
            slots: Vec::new(),
            bytes_completed: 0,
            start_byte: 0,
            started_at: now,
            next_snapshot: now,
            bytes_per_second: 0,
            finish_at: None,
            buffer: vec![0; buffer_size],
            readiness: Readiness::NotStarted,
            counters: Arc::new(SummaryCounters::default()),
            abort,
            cfg,
        })
    }

    /// Opens the output file and lays out slots, resuming from the state
    /// file when it is present and consistent.
    pub fn open(&mut self) -> Result<()> {
        let record = if self.resumable {
            match state_file::restore(&self.state_path, self.total_size) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(
                        "ignoring state file {}: {}",
                        self.state_path.display(),
                        e
                    );
                    None
                }
            }
        } else {
            None
        };

        let resumed = match record {
            Some(record) => match OutputFileBuilder::open_existing(&self.output_path) {
                Ok(builder) => {
                    tracing::info!(
                        "resuming: {} bytes present, {} to go over {} connections",
                        record.bytes_completed,
                        record.remaining(),
                        record.slot_count()
                    );
                    Some((record, builder.build()))
                }
                Err(e) => {
                    tracing::warn!("state file found but output cannot be opened ({:#}), starting over", e);
                    None
                }
            },
            None => None,
        };

        let (segments, bytes_completed, output) = match resumed {
            Some((record, output)) => (record.segments, record.bytes_completed, output),
            None => {
                let segments = match self.total_size {
                    Some(total) if self.resumable => divide(total, self.cfg.num_connections),
                    Some(total) => divide(total, 1),
                    None => vec![Segment::new(0, UNBOUNDED)],
                };
                let mut builder = OutputFileBuilder::create(&self.output_path)?;
                if let Some(total) = self.total_size {
                    builder.preallocate(total)?;
                }
                (segments, 0, builder.build())
            }
        };

        let locals = self.cfg.local_addresses();
        self.slots = segments
            .into_iter()
            .enumerate()
            .map(|(i, seg)| {
                let local = (!locals.is_empty()).then(|| locals[i % locals.len()]);
                Slot::shared(seg, local)
            })
            .collect();
        self.bytes_completed = bytes_completed;
        self.start_byte = bytes_completed;
        self.throttle = RateController::new(self.cfg.max_speed, self.buffer.len(), self.slots.len());
        self.output = Some(output);
        Ok(())
    }

    /// Starts a setup for every slot with work left; exhausted slots first
    /// try to take over half of a busier one.
    pub fn start(&mut self) -> Result<()> {
        if self.output.is_none() {
            return Err(SessionError::NotOpen.into());
        }
        let now = Instant::now();
        self.readiness = Readiness::Running;
        self.started_at = now;
        self.next_snapshot = now + self.cfg.save_state_interval();
        if self.resumable {
            for (i, slot) in self.slots.iter().enumerate() {
                let mut guard = lock(slot);
                reactivate::reactivate(&self.slots, i, &mut guard);
            }
        }
        self.restart_idle_slots()?;
        self.check_complete()
    }

    /// Runs the loop until the download completes, fails or is aborted.
    pub fn run(&mut self, on_progress: &mut dyn FnMut(&ProgressStats)) -> Result<()> {
        if self.readiness == Readiness::NotStarted {
            self.start()?;
        }
        while self.readiness == Readiness::Running {
            if self.abort.is_cancelled() {
                tracing::info!("download aborted, stopping");
                return Err(DownloadAborted.into());
            }
            self.step()?;
            on_progress(&self.progress());
        }
        Ok(())
    }

    /// Tears down connections, then either removes the state file (complete)
    /// or writes a final snapshot.
    pub fn close(self) -> Result<DownloadReport> {
        for slot in &self.slots {
            lock(slot).disconnect();
        }
        let complete = self.readiness == Readiness::Complete;
        if complete {
            if let Some(output) = &self.output {
                output.sync()?;
            }
            if let Err(e) = state_file::remove(&self.state_path) {
                tracing::warn!("cannot remove {}: {}", self.state_path.display(), e);
            }
            tracing::info!(
                "downloaded {} bytes to {} in {:.1}s",
                self.bytes_completed,
                self.output_path.display(),
                self.started_at.elapsed().as_secs_f64()
            );
        } else if self.bytes_completed > 0 {
            self.save_state();
        }
        Ok(DownloadReport {
            output_path: self.output_path.clone(),
            total_size: self.total_size,
            bytes_completed: self.bytes_completed,
            bytes_this_run: self.bytes_completed.saturating_sub(self.start_byte),
            elapsed: self.started_at.elapsed(),
            complete,
            resumable: self.resumable,
            slot_count: self.slots.len(),
            summary: self.counters.summary(),
        })
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn total_size(&self) -> Option<u64> {
        self.total_size
    }

    pub fn is_resumable(&self) -> bool {
        self.resumable
    }

    pub fn bytes_completed(&self) -> u64 {
        self.bytes_completed
    }

    /// Estimated completion time from the current rate.
    pub fn finish_at(&self) -> Option<Instant> {
        self.finish_at
    }

    /// Current segment and connection phase of every slot.
    pub fn slot_states(&self) -> Vec<(Segment, SlotPhase)> {
        self.slots
            .iter()
            .map(|s| {
                let guard = lock(s);
                (guard.segment, guard.phase())
            })
            .collect()
    }

    pub fn progress(&self) -> ProgressStats {
        let active_slots = self
            .slots
            .iter()
            .filter(|s| matches!(lock(s).state, SlotState::Active { .. }))
            .count();
        ProgressStats {
            bytes_done: self.bytes_completed,
            bytes_this_run: self.bytes_completed.saturating_sub(self.start_byte),
            total_bytes: self.total_size,
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
            active_slots,
            slot_count: self.slots.len(),
        }
    }

    /// Writes the current progress to the state file. Failures are logged;
    /// the download carries on with the previous snapshot in place.
    fn save_state(&self) {
        if !self.resumable || self.slots.is_empty() {
            return;
        }
        let record = StateRecord {
            bytes_completed: self.bytes_completed,
            segments: self.slots.iter().map(|s| lock(s).segment).collect(),
        };
        match state_file::snapshot(&self.state_path, &record) {
            Ok(()) => tracing::debug!("state saved: {} bytes done", record.bytes_completed),
            Err(e) => tracing::warn!("cannot save state to {}: {}", self.state_path.display(), e),
        }
    }
}

/// Probes, downloads and closes in one call, blocking the current thread.
/// On abort or failure a final snapshot is written before the error is
/// returned.
pub fn download(
    request: &DownloadRequest,
    cfg: &SdmConfig,
    connector: Arc<dyn Connector>,
    abort: CancelToken,
    mut on_progress: impl FnMut(&ProgressStats),
) -> Result<DownloadReport> {
    let mut session = Session::new(request, cfg.clone(), connector, abort)?;
    session.open()?;
    let outcome = session.run(&mut on_progress);
    let report = session.close();
    outcome?;
    report
}

/// Runs [`download`] on the blocking pool. Progress snapshots are offered
/// to `progress_tx` without waiting; a full channel drops the snapshot.
pub async fn download_blocking_async(
    request: DownloadRequest,
    cfg: SdmConfig,
    connector: Arc<dyn Connector>,
    abort: CancelToken,
    progress_tx: Option<tokio::sync::mpsc::Sender<ProgressStats>>,
) -> Result<DownloadReport> {
    tokio::task::spawn_blocking(move || {
        download(&request, &cfg, connector, abort, |stats| {
            if let Some(tx) = &progress_tx {
                let _ = tx.try_send(stats.clone());
            }
        })
    })
    .await
    .context("download task join")?
}
