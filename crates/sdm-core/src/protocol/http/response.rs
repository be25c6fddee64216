//! Response header reading and parsing.

use crate::retry::TransferError;
use crate::transport::{read_some, Transport};

/// Upper bound on the size of a response header block.
const MAX_HEAD_LEN: usize = 64 * 1024;

/// `Content-Range: bytes start-end/total` (total may be `*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: Option<u64>,
}

/// Status line and the headers the handshake cares about.
#[derive(Debug, Clone, Default)]
pub(super) struct ResponseHead {
    pub status: u16,
    pub content_length: Option<u64>,
    pub content_range: Option<ContentRange>,
    pub location: Option<String>,
    pub content_disposition: Option<String>,
    /// Total from `Content-Range: bytes */total` on a 416.
    pub unsatisfied_total: Option<u64>,
    /// Body uses `Transfer-Encoding: chunked`.
    pub chunked: bool,
}

pub(super) fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (range, total) = rest.split_once('/')?;
    let (start, end) = range.trim().split_once('-')?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    Some(ContentRange {
        start: start.trim().parse().ok()?,
        end: end.trim().parse().ok()?,
        total,
    })
}

/// Total size from the `bytes */total` form sent with 416.
pub(super) fn parse_unsatisfied_range(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    rest.strip_prefix("*/")?.trim().parse().ok()
}

/// Parses the header block (status line plus header lines, without the
/// terminating blank line).
pub(super) fn parse_head(raw: &[u8]) -> Result<ResponseHead, TransferError> {
    let text = String::from_utf8_lossy(raw);
    let mut lines = text.lines();
    let status_line = lines.next().unwrap_or_default();
    let mut parts = status_line.split_whitespace();
    let status = match (parts.next(), parts.next()) {
        (Some(v), Some(code)) if v.starts_with("HTTP/") => code.parse::<u16>().ok(),
        _ => None,
    }
    .ok_or_else(|| TransferError::protocol(format!("bad status line {:?}", status_line)))?;

    let mut head = ResponseHead {
        status,
        ..ResponseHead::default()
    };
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            head.content_length = value.parse().ok();
        } else if name.eq_ignore_ascii_case("content-range") {
            head.content_range = parse_content_range(value);
            head.unsatisfied_total = parse_unsatisfied_range(value);
        } else if name.eq_ignore_ascii_case("location") {
            head.location = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("content-disposition") {
            head.content_disposition = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("transfer-encoding") {
            head.chunked = value
                .rsplit(',')
                .next()
                .is_some_and(|last| last.trim().eq_ignore_ascii_case("chunked"));
        }
    }
    // Content-Length does not describe a chunked body.
    if head.chunked {
        head.content_length = None;
    }
    Ok(head)
}

/// Returns (end of header block, start of body).
fn find_head_end(buf: &[u8]) -> Option<(usize, usize)> {
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, i + 4));
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| (i, i + 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Reads from `t` until the end of the header block. Body bytes that came
/// in with the header are returned alongside it.
pub(super) fn read_head(t: &mut dyn Transport) -> Result<(ResponseHead, Vec<u8>), TransferError> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 2048];
    loop {
        if let Some((head_end, body_start)) = find_head_end(&buf) {
            let body = buf.split_off(body_start);
            let head = parse_head(&buf[..head_end])?;
            return Ok((head, body));
        }
        if buf.len() > MAX_HEAD_LEN {
            return Err(TransferError::protocol("response header too large"));
        }
        let n = read_some(t, &mut chunk)?;
        if n == 0 {
            return Err(TransferError::protocol("connection closed before end of response header"));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::PollHandle;
    use std::io;

    struct Chunks(Vec<Vec<u8>>);

    impl Transport for Chunks {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0.is_empty() {
                return Ok(0);
            }
            let c = self.0.remove(0);
            buf[..c.len()].copy_from_slice(&c);
            Ok(c.len())
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
    fn content_range_forms() {
        assert_eq!(
            parse_content_range("bytes 250-499/1000"),
            Some(ContentRange { start: 250, end: 499, total: Some(1000) })
        );
        assert_eq!(
            parse_content_range("bytes 0-9/*"),
            Some(ContentRange { start: 0, end: 9, total: None })
        );
        assert_eq!(parse_content_range("items 0-9/10"), None);
        assert_eq!(parse_content_range("bytes */1000"), None);
    }

    #[test]
    fn parse_head_fields() {
        let h = parse_head(
            b"HTTP/1.1 302 Found\r\nLocation: /next\r\ncontent-length: 0\r\nContent-Disposition: attachment; filename=a.bin",
        )
        .unwrap();
        assert_eq!(h.status, 302);
        assert_eq!(h.location.as_deref(), Some("/next"));
        assert_eq!(h.content_length, Some(0));
        assert!(h.content_disposition.unwrap().contains("a.bin"));
    }

    #[test]
    fn unsatisfied_range_total() {
        assert_eq!(parse_unsatisfied_range("bytes */0"), Some(0));
        assert_eq!(parse_unsatisfied_range("bytes */1000"), Some(1000));
        assert_eq!(parse_unsatisfied_range("bytes 0-9/10"), None);
    }

    #[test]
    fn chunked_encoding_drops_content_length() {
        let h = parse_head(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: Chunked\r\nContent-Length: 12").unwrap();
        assert!(h.chunked);
        assert_eq!(h.content_length, None);
        let plain = parse_head(b"HTTP/1.1 200 OK\r\nContent-Length: 12").unwrap();
        assert!(!plain.chunked);
        assert_eq!(plain.content_length, Some(12));
    }

    #[test]
    fn bad_status_line_rejected() {
        assert!(matches!(parse_head(b"SSH-2.0-OpenSSH"), Err(TransferError::Protocol(_))));
    }

    #[test]
    fn header_split_across_reads_keeps_body_prefix() {
        let mut t = Chunks(vec![
            b"HTTP/1.1 206 Partial Content\r\nContent-Ra".to_vec(),
            b"nge: bytes 0-3/4\r\n\r\nab".to_vec(),
            b"cd".to_vec(),
        ]);
        let (head, body) = read_head(&mut t).unwrap();
        assert_eq!(head.status, 206);
        assert_eq!(head.content_range.unwrap().total, Some(4));
        assert_eq!(body, b"ab");
    }

    #[test]
    fn early_close_is_protocol_error() {
        let mut t = Chunks(vec![b"HTTP/1.1 200 OK\r\n".to_vec()]);
        assert!(matches!(read_head(&mut t), Err(TransferError::Protocol(_))));
    }
}
