//! Map transfer errors onto retry kinds.

use std::io;

use super::error::TransferError;
use super::policy::ErrorKind;

/// Classify an HTTP status code for retry decisions.
pub fn classify_http_status(code: u16) -> ErrorKind {
    match code {
        429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code),
        _ => ErrorKind::Other,
    }
}

fn classify_io(e: &io::Error) -> ErrorKind {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ErrorKind::Timeout,
        _ => ErrorKind::Connection,
    }
}

/// Classify a slot failure into an ErrorKind.
pub fn classify(e: &TransferError) -> ErrorKind {
    match e {
        TransferError::Io(io) | TransferError::Connect { source: io, .. } => classify_io(io),
        TransferError::Resolve { .. } | TransferError::NoAddress(_) => ErrorKind::Connection,
        TransferError::Http(code) => classify_http_status(*code),
        // 421 "too many users" is the FTP way of throttling; other 4xx
        // replies are transient by definition.
        TransferError::Ftp { code: 421, .. } => ErrorKind::Throttled,
        TransferError::Ftp { code: 400..=499, .. } => ErrorKind::Connection,
        TransferError::Cancelled => ErrorKind::Timeout,
        TransferError::Ftp { .. }
        | TransferError::TlsUnavailable(_)
        | TransferError::Protocol(_)
        | TransferError::TooManyRedirects(_)
        | TransferError::RangeIgnored { .. }
        | TransferError::UnsupportedScheme(_) => ErrorKind::Other,
    }
}
