//! Plain TCP connector with optional local address binding.

use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use super::{Connector, Endpoint, PollHandle, Transport};
use crate::control::CancelToken;
use crate::retry::TransferError;

/// TCP stream with read/write timeouts applied.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data)
    }

    #[cfg(unix)]
    fn poll_handle(&self) -> PollHandle {
        use std::os::unix::io::AsRawFd;
        self.stream.as_raw_fd()
    }

    #[cfg(not(unix))]
    fn poll_handle(&self) -> PollHandle {}
}

/// Resolves the host and connects over TCP. TLS endpoints are refused with
/// [`TransferError::TlsUnavailable`]; wrap or replace this connector to add
/// a TLS layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

fn connect_one(addr: SocketAddr, local: Option<IpAddr>, timeout: Option<Duration>) -> io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    if let Some(ip) = local {
        socket.bind(&SocketAddr::new(ip, 0).into())?;
    }
    match timeout {
        Some(t) => socket.connect_timeout(&addr.into(), t)?,
        None => socket.connect(&addr.into())?,
    }
    socket.set_nodelay(true)?;
    socket.set_read_timeout(timeout)?;
    socket.set_write_timeout(timeout)?;
    Ok(socket.into())
}

impl Connector for TcpConnector {
    fn connect(
        &self,
        endpoint: &Endpoint,
        local: Option<IpAddr>,
        io_timeout: Option<Duration>,
        cancel: &CancelToken,
    ) -> Result<Box<dyn Transport>, TransferError> {
        if endpoint.use_tls {
            return Err(TransferError::TlsUnavailable(endpoint.host.clone()));
        }
        let addrs = (endpoint.host.as_str(), endpoint.port)
            .to_socket_addrs()
            .map_err(|source| TransferError::Resolve {
                host: endpoint.host.clone(),
                source,
            })?;

        let mut last_err = None;
        for addr in addrs {
            if cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            // A bound local address only reaches peers of the same family.
            if local.map_or(false, |ip| ip.is_ipv4() != addr.is_ipv4()) {
                continue;
            }
            match connect_one(addr, local, io_timeout) {
                Ok(stream) => {
                    tracing::debug!(%addr, ?local, "connected");
                    return Ok(Box::new(TcpTransport::new(stream)));
                }
                Err(source) => {
                    tracing::debug!(%addr, "connect failed: {}", source);
                    last_err = Some(TransferError::Connect { addr, source });
                }
            }
        }
        Err(last_err.unwrap_or_else(|| TransferError::NoAddress(endpoint.host.clone())))
    }
}
