//! Resumable multi-connection HTTP/FTP downloads.
//!
//! A file is split into contiguous byte ranges, one per connection slot.
//! The session loop drives every slot's stream, writes bytes in place,
//! hands half of a slow slot's range to a finished one and keeps a small
//! `.st` state file so an interrupted download picks up where it stopped.

pub mod config;
pub mod logging;

pub mod control;
pub mod protocol;
pub mod retry;
pub mod segmenter;
pub mod session;
pub mod state_file;
pub mod storage;
pub mod throttle;
pub mod transport;
pub mod url_model;

pub use session::{download, download_blocking_async, DownloadReport, DownloadRequest, Session};
