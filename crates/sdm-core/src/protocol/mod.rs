//! HTTP and FTP handshakes.
//!
//! A handshake connects, asks for a byte range and stops at the first body
//! byte. The session learns the resource size, whether ranges are honoured
//! and the offset the stream really starts at; everything after that is raw
//! reads on the returned transport.

mod ftp;
mod http;
mod target;

pub use target::{Scheme, Target};

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SdmConfig;
use crate::control::CancelToken;
use crate::retry::TransferError;
use crate::segmenter::{Segment, UNBOUNDED};
use crate::transport::{Connector, Transport};

/// Request settings shared by every connection of a download.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub user_agent: String,
    /// Extra HTTP request headers, sent in order.
    pub headers: Vec<(String, String)>,
    pub max_redirect: u32,
    pub io_timeout: Option<Duration>,
}

impl ClientOptions {
    pub fn from_config(cfg: &SdmConfig) -> Self {
        Self {
            user_agent: cfg.user_agent.clone(),
            headers: cfg
                .headers
                .iter()
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .collect(),
            max_redirect: cfg.max_redirect,
            io_timeout: cfg.io_timeout(),
        }
    }
}

/// What the server said about the resource.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// Full size in bytes, when the server reports it.
    pub size: Option<u64>,
    /// True if byte ranges / REST offsets are honoured.
    pub resumable: bool,
    /// Filename suggested by the server (Content-Disposition).
    pub filename: Option<String>,
    /// Target after following redirects.
    pub target: Target,
}

/// A negotiated stream positioned at its first body byte.
pub struct OpenedStream {
    pub transport: Box<dyn Transport>,
    /// Offset of the first byte the stream delivers. Differs from the
    /// requested offset when the server ignored the range.
    pub start: u64,
    pub info: ProbeResult,
}

impl std::fmt::Debug for OpenedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedStream")
            .field("start", &self.start)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Speaks HTTP or FTP over transports from a [`Connector`].
pub struct ProtocolClient {
    connector: Arc<dyn Connector>,
    options: ClientOptions,
}

impl ProtocolClient {
    pub fn new(connector: Arc<dyn Connector>, options: ClientOptions) -> Self {
        Self { connector, options }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub(crate) fn connect(
        &self,
        target_endpoint: &crate::transport::Endpoint,
        local: Option<IpAddr>,
        cancel: &CancelToken,
    ) -> Result<Box<dyn Transport>, TransferError> {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        self.connector
            .connect(target_endpoint, local, self.options.io_timeout, cancel)
    }

    /// Connects, negotiates `segment` and returns the stream with what the
    /// server reported.
    pub fn probe_and_open(
        &self,
        target: &Target,
        segment: Segment,
        local: Option<IpAddr>,
        cancel: &CancelToken,
    ) -> Result<OpenedStream, TransferError> {
        match target.scheme {
            Scheme::Http | Scheme::Https => http::open(self, target, segment, local, cancel),
            Scheme::Ftp | Scheme::Ftps => ftp::open(self, target, segment, local, cancel),
        }
    }

    /// Learns size, resumability and filename over one throwaway connection.
    pub fn probe(
        &self,
        target: &Target,
        local: Option<IpAddr>,
        cancel: &CancelToken,
    ) -> Result<ProbeResult, TransferError> {
        match target.scheme {
            Scheme::Http | Scheme::Https => {
                let opened = http::open(self, target, Segment::new(0, UNBOUNDED), local, cancel)?;
                Ok(opened.info)
            }
            Scheme::Ftp | Scheme::Ftps => ftp::probe(self, target, local, cancel),
        }
    }

    /// Opens the stream for one slot's segment.
    pub fn open(
        &self,
        target: &Target,
        segment: Segment,
        local: Option<IpAddr>,
        cancel: &CancelToken,
    ) -> Result<OpenedStream, TransferError> {
        self.probe_and_open(target, segment, local, cancel)
    }
}
