//! Transport with bytes already read ahead (e.g. body bytes that arrived in
//! the same packet as the HTTP headers).

use std::io;

use super::{PollHandle, Transport};

/// Serves `prefix` first, then reads from the wrapped transport.
pub struct PrefixedTransport {
    prefix: Vec<u8>,
    pos: usize,
    inner: Box<dyn Transport>,
}

impl PrefixedTransport {
    pub fn new(prefix: Vec<u8>, inner: Box<dyn Transport>) -> Self {
        Self {
            prefix,
            pos: 0,
            inner,
        }
    }
}

impl Transport for PrefixedTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pending = &self.prefix[self.pos..];
        if pending.is_empty() {
            return self.inner.read(buf);
        }
        let n = pending.len().min(buf.len());
        buf[..n].copy_from_slice(&pending[..n]);
        self.pos += n;
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.inner.write_all(data)
    }

    fn poll_handle(&self) -> PollHandle {
        self.inner.poll_handle()
    }

    fn buffered(&self) -> usize {
        self.prefix.len() - self.pos + self.inner.buffered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted(Vec<u8>);

    impl Transport for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.0.len().min(buf.len());
            buf[..n].copy_from_slice(&self.0[..n]);
            self.0.drain(..n);
            Ok(n)
        }
        fn write_all(&mut self, _: &[u8]) -> io::Result<()> {
            Ok(())
        }
        #[cfg(unix)]
        fn poll_handle(&self) -> PollHandle {
            -1
        }
        #[cfg(not(unix))]
        fn poll_handle(&self) -> PollHandle {}
    }

    #[test]
    fn prefix_is_served_before_inner() {
        let mut t = PrefixedTransport::new(b"abc".to_vec(), Box::new(Scripted(b"def".to_vec())));
        assert_eq!(t.buffered(), 3);
        let mut buf = [0u8; 2];
        assert_eq!(t.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"ab");
        assert_eq!(t.read(&mut buf).unwrap(), 1);
        assert_eq!(&buf[..1], b"c");
        assert_eq!(t.buffered(), 0);
        assert_eq!(t.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"de");
    }
}
