//! FTP in passive mode: login, `SIZE`, `REST`, `PASV`, `RETR`.

use std::io;
use std::net::{IpAddr, Ipv4Addr};

use super::{OpenedStream, ProbeResult, ProtocolClient, Target};
use crate::control::CancelToken;
use crate::retry::TransferError;
use crate::segmenter::Segment;
use crate::transport::{read_some, Endpoint, PollHandle, Transport};

/// Control connection with line buffering.
struct Control {
    transport: Box<dyn Transport>,
    pending: Vec<u8>,
}

/// A reply: code plus the text of its last line.
type Reply = (u16, String);

impl Control {
    fn read_line(&mut self) -> Result<String, TransferError> {
        let mut chunk = [0u8; 1024];
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=pos).collect();
                return Ok(String::from_utf8_lossy(&line).trim_end().to_string());
            }
            let n = read_some(self.transport.as_mut(), &mut chunk)?;
            if n == 0 {
                return Err(TransferError::protocol("FTP control connection closed"));
            }
            self.pending.extend_from_slice(&chunk[..n]);
        }
    }

    /// Reads one reply, skipping the continuation lines of a multi-line one
    /// (`123-first ... 123 last`).
    fn reply(&mut self) -> Result<Reply, TransferError> {
        let first = self.read_line()?;
        let code = reply_code(&first)
            .ok_or_else(|| TransferError::protocol(format!("bad FTP reply {:?}", first)))?;
        if first.as_bytes().get(3) != Some(&b'-') {
            return Ok((code, reply_text(&first)));
        }
        let terminator = format!("{} ", &first[..3]);
        loop {
            let line = self.read_line()?;
            if line.starts_with(&terminator) || line == first[..3] {
                return Ok((code, reply_text(&line)));
            }
        }
    }

    fn command(&mut self, cmd: &str) -> Result<Reply, TransferError> {
        if cmd.starts_with("PASS ") {
            tracing::trace!("ftp> PASS ****");
        } else {
            tracing::trace!("ftp> {}", cmd);
        }
        self.transport.write_all(format!("{}\r\n", cmd).as_bytes())?;
        let reply = self.reply()?;
        tracing::trace!("ftp< {} {}", reply.0, reply.1);
        Ok(reply)
    }

    /// Sends `cmd` and fails unless the reply is in the `class`xx range.
    fn expect(&mut self, cmd: &str, class: u16) -> Result<Reply, TransferError> {
        let (code, message) = self.command(cmd)?;
        if code / 100 != class {
            return Err(TransferError::Ftp { code, message });
        }
        Ok((code, message))
    }
}

fn reply_code(line: &str) -> Option<u16> {
    let digits = line.get(..3)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn reply_text(line: &str) -> String {
    line.get(4..).unwrap_or_default().to_string()
}

/// Parses `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`.
fn parse_pasv(text: &str) -> Option<(Ipv4Addr, u16)> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let nums: Vec<u8> = text[start..]
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .take(6)
        .map(|s| s.parse().ok())
        .collect::<Option<Vec<u8>>>()?;
    if nums.len() != 6 {
        return None;
    }
    let ip = Ipv4Addr::new(nums[0], nums[1], nums[2], nums[3]);
    let port = u16::from(nums[4]) << 8 | u16::from(nums[5]);
    Some((ip, port))
}

/// Connects, logs in, switches to binary and enters the file's directory.
fn login(
    client: &ProtocolClient,
    target: &Target,
    local: Option<IpAddr>,
    cancel: &CancelToken,
) -> Result<(Control, String), TransferError> {
    let transport = client.connect(&target.endpoint(), local, cancel)?;
    let mut ctl = Control {
        transport,
        pending: Vec::new(),
    };
    let (mut code, mut message) = ctl.reply()?;
    // 120: service ready in a moment.
    while code == 120 {
        (code, message) = ctl.reply()?;
    }
    if code / 100 != 2 {
        return Err(TransferError::Ftp { code, message });
    }

    let (code, message) = ctl.command(&format!("USER {}", target.user))?;
    match code / 100 {
        2 => {}
        3 => {
            ctl.expect(&format!("PASS {}", target.password), 2)?;
        }
        _ => return Err(TransferError::Ftp { code, message }),
    }
    ctl.expect("TYPE I", 2)?;

    let (dir, file) = target.split_path();
    if file.is_empty() {
        return Err(TransferError::protocol("FTP URL does not name a file"));
    }
    if !dir.is_empty() {
        ctl.expect(&format!("CWD {}", dir), 2)?;
    }
    if cancel.is_cancelled() {
        return Err(TransferError::Cancelled);
    }
    Ok((ctl, file))
}

/// `SIZE`; servers without the command (5xx syntax/not implemented) give
/// an unknown size, a missing file is an error.
fn remote_size(ctl: &mut Control, file: &str) -> Result<Option<u64>, TransferError> {
    let (code, message) = ctl.command(&format!("SIZE {}", file))?;
    match code {
        213 => Ok(message.trim().parse().ok()),
        500..=504 => Ok(None),
        550 => Err(TransferError::Ftp { code, message }),
        _ => Ok(None),
    }
}

/// True if the server accepted `REST offset`.
fn restart_at(ctl: &mut Control, offset: u64) -> Result<bool, TransferError> {
    let (code, _) = ctl.command(&format!("REST {}", offset))?;
    Ok(code == 350)
}

pub(super) fn probe(
    client: &ProtocolClient,
    target: &Target,
    local: Option<IpAddr>,
    cancel: &CancelToken,
) -> Result<ProbeResult, TransferError> {
    let (mut ctl, file) = login(client, target, local, cancel)?;
    let size = remote_size(&mut ctl, &file)?;
    let resumable = restart_at(&mut ctl, 1)? && restart_at(&mut ctl, 0)?;
    let _ = ctl.command("QUIT");
    Ok(ProbeResult {
        size,
        resumable,
        filename: None,
        target: target.clone(),
    })
}

pub(super) fn open(
    client: &ProtocolClient,
    target: &Target,
    segment: Segment,
    local: Option<IpAddr>,
    cancel: &CancelToken,
) -> Result<OpenedStream, TransferError> {
    let (mut ctl, file) = login(client, target, local, cancel)?;
    let size = remote_size(&mut ctl, &file)?;
    let resumable = restart_at(&mut ctl, segment.current_byte)?;
    let start = if resumable { segment.current_byte } else { 0 };

    let (_, text) = ctl.expect("PASV", 2)?;
    let (ip, port) = parse_pasv(&text)
        .ok_or_else(|| TransferError::protocol(format!("cannot parse PASV reply {:?}", text)))?;
    // Servers behind NAT often announce an unusable address.
    let host = if ip.is_unspecified() || (ip.is_private() && !target_is_private(target)) {
        target.host.clone()
    } else {
        ip.to_string()
    };
    let data = client.connect(
        &Endpoint {
            host,
            port,
            use_tls: false,
        },
        local,
        cancel,
    )?;

    let (code, message) = ctl.command(&format!("RETR {}", file))?;
    if code / 100 != 1 {
        return Err(TransferError::Ftp { code, message });
    }

    Ok(OpenedStream {
        transport: Box::new(FtpStream { data, _control: ctl }),
        start,
        info: ProbeResult {
            size,
            resumable,
            filename: None,
            target: target.clone(),
        },
    })
}

fn target_is_private(target: &Target) -> bool {
    match target.host.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => v4.is_private() || v4.is_loopback(),
        Ok(IpAddr::V6(v6)) => v6.is_loopback(),
        Err(_) => false,
    }
}

/// Data connection; the control connection lives as long as the transfer.
struct FtpStream {
    data: Box<dyn Transport>,
    _control: Control,
}

impl Transport for FtpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.data.read(buf)
    }

    fn write_all(&mut self, _data: &[u8]) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "FTP data connection is receive-only",
        ))
    }

    fn poll_handle(&self) -> PollHandle {
        self.data.poll_handle()
    }

    fn buffered(&self) -> usize {
        self.data.buffered()
    }
}
