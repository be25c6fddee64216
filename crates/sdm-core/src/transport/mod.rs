//! Byte streams to remote servers.
//!
//! The session only needs three things from a connection: blocking reads
//! once the poller says data is there, writes for protocol requests, and a
//! handle the poller can wait on. [`Connector`] opens such streams; the
//! built-in [`TcpConnector`] does plain TCP and leaves TLS to a pluggable
//! implementation.

mod buffered;
mod poll;
mod tcp;

pub use buffered::PrefixedTransport;
pub use poll::{wait_readable, PollHandle};
pub use tcp::{TcpConnector, TcpTransport};

use std::io;
use std::net::IpAddr;
use std::time::Duration;

use crate::control::CancelToken;
use crate::retry::TransferError;

/// Where to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

/// An open connection. Dropping it closes the underlying socket(s).
pub trait Transport: Send {
    /// Reads into `buf`; `Ok(0)` means the peer closed cleanly.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Handle the readiness poller waits on.
    fn poll_handle(&self) -> PollHandle;

    /// Bytes already received and held in memory. A transport with buffered
    /// data is readable even when its socket is not.
    fn buffered(&self) -> usize {
        0
    }
}

/// Opens transports. Implementations must return promptly once `cancel`
/// is set, at the latest when the current blocking step times out.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        endpoint: &Endpoint,
        local: Option<IpAddr>,
        io_timeout: Option<Duration>,
        cancel: &CancelToken,
    ) -> Result<Box<dyn Transport>, TransferError>;
}

/// Reads until `buf` holds at least one byte or the peer closes.
pub(crate) fn read_some(t: &mut dyn Transport, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match t.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}
