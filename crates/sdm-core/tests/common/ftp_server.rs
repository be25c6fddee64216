//! Minimal passive-mode FTP server for integration tests.
//!
//! Accepts any login and serves one file under any name. REST is honoured
//! unless disabled.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Starts a server serving `body`. Returns the URL of the file
/// (e.g. "ftp://127.0.0.1:2121/pub/file.bin").
pub fn start(body: Vec<u8>, support_rest: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            thread::spawn(move || {
                let _ = session(stream, &body, support_rest);
            });
        }
    });
    format!("ftp://127.0.0.1:{}/pub/file.bin", port)
}

fn session(stream: TcpStream, body: &[u8], support_rest: bool) -> std::io::Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;
    let mut out = stream.try_clone()?;
    let mut lines = BufReader::new(stream);
    out.write_all(b"220-test server\r\n220 ready\r\n")?;

    let mut rest = 0usize;
    let mut passive: Option<TcpListener> = None;
    let mut line = String::new();
    loop {
        line.clear();
        if lines.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let text = line.trim_end();
        let (cmd, arg) = text.split_once(' ').unwrap_or((text, ""));
        match cmd.to_ascii_uppercase().as_str() {
            "USER" => out.write_all(b"331 password please\r\n")?,
            "PASS" => out.write_all(b"230 logged in\r\n")?,
            "TYPE" => out.write_all(b"200 binary\r\n")?,
            "CWD" => out.write_all(b"250 ok\r\n")?,
            "SIZE" => write!(out, "213 {}\r\n", body.len())?,
            "REST" if support_rest => {
                rest = arg.trim().parse().unwrap_or(0);
                write!(out, "350 restarting at {}\r\n", rest)?;
            }
            "REST" => out.write_all(b"502 not implemented\r\n")?,
            "PASV" => {
                let data = TcpListener::bind("127.0.0.1:0")?;
                let p = data.local_addr()?.port();
                write!(
                    out,
                    "227 Entering Passive Mode (127,0,0,1,{},{})\r\n",
                    p >> 8,
                    p & 0xff
                )?;
                passive = Some(data);
            }
            "RETR" => {
                let Some(data) = passive.take() else {
                    out.write_all(b"425 use PASV first\r\n")?;
                    continue;
                };
                out.write_all(b"150 opening data connection\r\n")?;
                let (mut conn, _) = data.accept()?;
                let start = rest.min(body.len());
                for chunk in body[start..].chunks(16 * 1024) {
                    if conn.write_all(chunk).is_err() {
                        break;
                    }
                }
                drop(conn);
                rest = 0;
                out.write_all(b"226 transfer complete\r\n")?;
            }
            "QUIT" => {
                out.write_all(b"221 bye\r\n")?;
                return Ok(());
            }
            _ => out.write_all(b"502 not implemented\r\n")?,
        }
    }
}
