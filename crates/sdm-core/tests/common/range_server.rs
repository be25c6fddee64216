//! Minimal HTTP/1.1 server with Range GET support for integration tests.
//!
//! Serves a single static body at any path. Options simulate servers that
//! ignore ranges, hide the size, drop, stall or hang connections, chunk the
//! body or redirect.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RangeServerOptions {
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// If false, omit Content-Length and Content-Range (size unknown).
    pub send_length: bool,
    /// The first N responses to ranges starting past byte 0 are cut off
    /// halfway through the body.
    pub truncate_first: usize,
    /// If true, requests for `/start` get a 302 to `/file.bin`.
    pub redirect: bool,
    /// Sent as `Content-Disposition: attachment; filename="..."`.
    pub disposition: Option<&'static str>,
    /// Answer every GET with 200 and a `Transfer-Encoding: chunked` body.
    pub chunked: bool,
    /// The first N responses to ranges starting past byte 0 send half the
    /// body and then go silent with the socket left open.
    pub stall_first: usize,
    /// The first N requests for ranges starting past byte 0 are read but
    /// never answered.
    pub hang_first: usize,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            support_ranges: true,
            send_length: true,
            truncate_first: 0,
            redirect: false,
            disposition: None,
            chunked: false,
            stall_first: 0,
            hang_first: 0,
        }
    }
}

/// Running server handle.
pub struct RangeServer {
    /// URL to download from (`/start` when redirecting).
    pub url: String,
    /// GET requests served so far.
    pub requests: Arc<AtomicUsize>,
}

/// Starts a server in a background thread serving `body`. Returns the URL
/// (e.g. "http://127.0.0.1:12345/file.bin"). The server runs until the
/// process exits.
pub fn start(body: Vec<u8>) -> String {
    start_with_options(body, RangeServerOptions::default()).url
}

/// Like `start` but allows customizing server behavior.
pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let requests = Arc::new(AtomicUsize::new(0));
    let faults = Arc::new(Faults {
        truncations: AtomicUsize::new(opts.truncate_first),
        stalls: AtomicUsize::new(opts.stall_first),
        hangs: AtomicUsize::new(opts.hang_first),
    });
    let counter = Arc::clone(&requests);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let counter = Arc::clone(&counter);
            let faults = Arc::clone(&faults);
            thread::spawn(move || handle(stream, &body, opts, &counter, &faults));
        }
    });
    let path = if opts.redirect { "start" } else { "file.bin" };
    RangeServer {
        url: format!("http://127.0.0.1:{}/{}", port, path),
        requests,
    }
}

/// Remaining injected failures, shared by all connections.
struct Faults {
    truncations: AtomicUsize,
    stalls: AtomicUsize,
    hangs: AtomicUsize,
}

/// Consumes one failure from `budget`; false once it is spent.
fn take(budget: &AtomicUsize) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Holds the connection open without sending anything.
fn go_silent(stream: TcpStream) {
    thread::sleep(Duration::from_secs(60));
    drop(stream);
}

fn handle(
    mut stream: TcpStream,
    body: &[u8],
    opts: RangeServerOptions,
    requests: &AtomicUsize,
    faults: &Faults,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let (method, path, range) = parse_request(request);
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\n\r\n");
        return;
    }
    requests.fetch_add(1, Ordering::SeqCst);
    if opts.redirect && path == "/start" {
        let _ = stream.write_all(
            b"HTTP/1.1 302 Found\r\nLocation: /file.bin\r\nContent-Length: 0\r\n\r\n",
        );
        return;
    }

    let past_start = matches!(range, Some((start, _)) if start > 0);
    if past_start && take(&faults.hangs) {
        go_silent(stream);
        return;
    }
    if opts.chunked {
        send_chunked(stream, body);
        return;
    }

    let total = body.len() as u64;
    let ranged = match range {
        Some((start, end_incl)) if opts.support_ranges => Some((start, end_incl)),
        _ => None,
    };
    let mut head = String::new();
    let slice = match ranged {
        Some((start, end_incl)) => {
            let end_incl = end_incl.min(total.saturating_sub(1));
            if start >= total || start > end_incl {
                let _ = write!(
                    stream,
                    "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\n\r\n",
                    total
                );
                return;
            }
            head.push_str("HTTP/1.1 206 Partial Content\r\n");
            if opts.send_length {
                head.push_str(&format!("Content-Range: bytes {}-{}/{}\r\n", start, end_incl, total));
            } else {
                head.push_str(&format!("Content-Range: bytes {}-{}/*\r\n", start, end_incl));
            }
            &body[start as usize..=end_incl as usize]
        }
        None => {
            head.push_str("HTTP/1.1 200 OK\r\n");
            body
        }
    };
    if opts.send_length {
        head.push_str(&format!("Content-Length: {}\r\n", slice.len()));
    }
    if let Some(name) = opts.disposition {
        head.push_str(&format!("Content-Disposition: attachment; filename=\"{}\"\r\n", name));
    }
    head.push_str("Connection: close\r\n\r\n");
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }

    let ranged_past_start = matches!(ranged, Some((start, _)) if start > 0);
    let stall = ranged_past_start && take(&faults.stalls);
    let cut = stall || (ranged_past_start && take(&faults.truncations));
    let sent = if cut { &slice[..slice.len() / 2] } else { slice };
    for chunk in sent.chunks(16 * 1024) {
        if stream.write_all(chunk).is_err() {
            return;
        }
    }
    if stall {
        let _ = stream.flush();
        go_silent(stream);
    }
}

/// 200 with the whole body in 1000-byte chunks, then the terminating chunk.
fn send_chunked(mut stream: TcpStream, body: &[u8]) {
    let head = "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n";
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }
    for chunk in body.chunks(1000) {
        let mut framed = format!("{:x}\r\n", chunk.len()).into_bytes();
        framed.extend_from_slice(chunk);
        framed.extend_from_slice(b"\r\n");
        if stream.write_all(&framed).is_err() {
            return;
        }
    }
    let _ = stream.write_all(b"0\r\n\r\n");
}

/// Returns (method, path, optional (start, end_inclusive) for Range: bytes=X-Y).
fn parse_request(request: &str) -> (&str, &str, Option<(u64, u64)>) {
    let mut lines = request.lines();
    let mut first = lines.next().unwrap_or("").split_whitespace();
    let method = first.next().unwrap_or("");
    let path = first.next().unwrap_or("/");
    let mut range = None;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                let value = value.trim();
                if let Some(part) = value.strip_prefix("bytes=") {
                    if let Some((a, b)) = part.split_once('-') {
                        let start = a.trim().parse::<u64>().unwrap_or(0);
                        let end = b.trim();
                        let end_incl = if end.is_empty() {
                            u64::MAX
                        } else {
                            end.parse::<u64>().unwrap_or(0)
                        };
                        range = Some((start, end_incl));
                    }
                }
            }
        }
    }
    (method, path, range)
}
