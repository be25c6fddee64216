//! `Transfer-Encoding: chunked` body decoding.

use std::io;

use crate::transport::{read_some, PollHandle, Transport};

/// Longest size or trailer line accepted.
const MAX_LINE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Expecting a `<hex-size>[;ext]` line.
    Size,
    /// Inside a chunk with this many bytes left.
    Data(u64),
    /// Expecting the CRLF that ends a chunk.
    DataEnd,
    /// After the last chunk, skipping trailer headers.
    Trailer,
    Done,
}

/// Yields the decoded body of a chunked response and reports a clean close
/// after the terminating chunk.
pub(super) struct ChunkedTransport {
    inner: Box<dyn Transport>,
    raw: Vec<u8>,
    pos: usize,
    phase: Phase,
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("chunked body: {}", msg))
}

fn parse_size(line: &str) -> io::Result<u64> {
    let digits = line.split(';').next().unwrap_or_default().trim();
    u64::from_str_radix(digits, 16).map_err(|_| invalid("bad chunk size"))
}

impl ChunkedTransport {
    pub(super) fn new(inner: Box<dyn Transport>) -> Self {
        Self {
            inner,
            raw: Vec::new(),
            pos: 0,
            phase: Phase::Size,
        }
    }

    /// Takes one line (without its line ending) from the read-ahead buffer.
    fn take_line(&mut self) -> io::Result<Option<String>> {
        let pending = &self.raw[self.pos..];
        match pending.iter().position(|&b| b == b'\n') {
            Some(i) => {
                let line = pending[..i].strip_suffix(b"\r").unwrap_or(&pending[..i]);
                let line = String::from_utf8_lossy(line).into_owned();
                self.pos += i + 1;
                Ok(Some(line))
            }
            None if pending.len() > MAX_LINE => Err(invalid("line too long")),
            None => Ok(None),
        }
    }

    /// Reads more framing from the connection. Returns false on close.
    fn fill(&mut self) -> io::Result<bool> {
        self.raw.drain(..self.pos);
        self.pos = 0;
        let mut chunk = [0u8; 4096];
        let n = read_some(self.inner.as_mut(), &mut chunk)?;
        self.raw.extend_from_slice(&chunk[..n]);
        Ok(n > 0)
    }

    fn fill_or_eof(&mut self) -> io::Result<()> {
        if self.fill()? {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed inside chunked body",
            ))
        }
    }

    fn after_data(left: u64) -> Phase {
        if left == 0 {
            Phase::DataEnd
        } else {
            Phase::Data(left)
        }
    }
}

impl Transport for ChunkedTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            match self.phase {
                Phase::Done => return Ok(0),
                Phase::Data(left) => {
                    let want = usize::try_from(left).unwrap_or(usize::MAX).min(buf.len());
                    let pending = &self.raw[self.pos..];
                    let n = if pending.is_empty() {
                        let n = read_some(self.inner.as_mut(), &mut buf[..want])?;
                        if n == 0 {
                            return Err(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "connection closed inside chunk",
                            ));
                        }
                        n
                    } else {
                        let n = want.min(pending.len());
                        buf[..n].copy_from_slice(&pending[..n]);
                        self.pos += n;
                        n
                    };
                    self.phase = Self::after_data(left - n as u64);
                    return Ok(n);
                }
                Phase::Size => match self.take_line()? {
                    Some(line) => {
                        self.phase = match parse_size(&line)? {
                            0 => Phase::Trailer,
                            size => Phase::Data(size),
                        };
                    }
                    None => self.fill_or_eof()?,
                },
                Phase::DataEnd => match self.take_line()? {
                    Some(line) if line.is_empty() => self.phase = Phase::Size,
                    Some(_) => return Err(invalid("missing CRLF after chunk")),
                    None => self.fill_or_eof()?,
                },
                Phase::Trailer => match self.take_line()? {
                    Some(line) if line.is_empty() => self.phase = Phase::Done,
                    Some(_) => {}
                    // A close right after the last chunk still ends the body.
                    None => {
                        if !self.fill()? {
                            self.phase = Phase::Done;
                        }
                    }
                },
            }
        }
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.inner.write_all(data)
    }

    fn poll_handle(&self) -> PollHandle {
        self.inner.poll_handle()
    }

    fn buffered(&self) -> usize {
        let pending = self.raw.len() - self.pos;
        match self.phase {
            // Reported as readable so the session sees the close.
            Phase::Done => 1,
            _ => pending + self.inner.buffered(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pieces(Vec<Vec<u8>>);

    impl Transport for Pieces {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0.is_empty() {
                return Ok(0);
            }
            let piece = &mut self.0[0];
            let n = piece.len().min(buf.len());
            buf[..n].copy_from_slice(&piece[..n]);
            piece.drain(..n);
            if piece.is_empty() {
                self.0.remove(0);
            }
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

    fn decode(pieces: &[&[u8]], buf_len: usize) -> io::Result<Vec<u8>> {
        let inner = Pieces(pieces.iter().map(|p| p.to_vec()).collect());
        let mut t = ChunkedTransport::new(Box::new(inner));
        let mut out = Vec::new();
        let mut buf = vec![0u8; buf_len];
        loop {
            match read_some(&mut t, &mut buf)? {
                0 => return Ok(out),
                n => out.extend_from_slice(&buf[..n]),
            }
        }
    }

    #[test]
    fn single_read_body() {
        let out = decode(&[b"5\r\nhello\r\n0\r\n\r\n"], 64).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn framing_split_at_awkward_points() {
        let out = decode(
            &[b"4", b"\r\nWi", b"ki\r", b"\n5;ext=1\r\npedia\r\nE\r\n in\r\n\r\nchunks.", b"\r\n0\r\n", b"\r\n"],
            3,
        )
        .unwrap();
        assert_eq!(out, b"Wikipedia in\r\n\r\nchunks.");
    }

    #[test]
    fn trailers_are_skipped() {
        let out = decode(&[b"3\r\nabc\r\n0\r\nX-Checksum: 1\r\n\r\n"], 64).unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn close_after_last_chunk_ends_body() {
        let out = decode(&[b"3\r\nabc\r\n0\r\n"], 64).unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn close_inside_chunk_is_error() {
        let err = decode(&[b"a\r\nabc"], 64).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn bad_size_is_error() {
        let err = decode(&[b"zz\r\nabc\r\n"], 64).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn terminal_chunk_reports_readable() {
        let mut t = ChunkedTransport::new(Box::new(Pieces(vec![b"1\r\nx\r\n0\r\n\r\n".to_vec()])));
        let mut buf = [0u8; 8];
        assert_eq!(t.read(&mut buf).unwrap(), 1);
        assert_eq!(t.read(&mut buf).unwrap(), 0);
        assert!(t.buffered() > 0);
    }
}
