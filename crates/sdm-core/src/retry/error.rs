//! Failure of a single slot's connection or handshake.

use std::io;
use std::net::SocketAddr;

/// Error from connecting, negotiating or reading one slot's stream. Never
/// fatal for the session: the slot returns to idle and is retried.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("cannot resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("no usable address for {0}")]
    NoAddress(String),
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("TLS is not available for {0}")]
    TlsUnavailable(String),
    #[error("HTTP {0}")]
    Http(u16),
    #[error("FTP {code}: {message}")]
    Ftp { code: u16, message: String },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("too many redirects (limit {0})")]
    TooManyRedirects(u32),
    #[error("server ignored the range request (wanted offset {wanted}, stream starts at {actual})")]
    RangeIgnored { wanted: u64, actual: u64 },
    #[error("unsupported URL scheme {0:?}")]
    UnsupportedScheme(String),
    #[error("connection setup cancelled")]
    Cancelled,
}

impl TransferError {
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        TransferError::Protocol(msg.into())
    }
}
