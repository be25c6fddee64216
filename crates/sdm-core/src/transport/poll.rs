//! Readiness polling across slot transports.

use std::io;
use std::time::Duration;

#[cfg(unix)]
pub type PollHandle = std::os::unix::io::RawFd;

#[cfg(not(unix))]
pub type PollHandle = ();

/// Waits up to `timeout` for any handle to become readable and reports which
/// ones are. Hang-ups and errors count as readable so the next read sees
/// them. Negative handles are ignored. An interrupted wait reports nothing
/// ready.
#[cfg(unix)]
pub fn wait_readable(handles: &[PollHandle], timeout: Duration) -> io::Result<Vec<bool>> {
    let mut fds: Vec<libc::pollfd> = handles
        .iter()
        .map(|&fd| libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();
    let ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    let r = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, ms) };
    if r < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(vec![false; handles.len()]);
        }
        return Err(err);
    }
    let ready = libc::POLLIN | libc::POLLHUP | libc::POLLERR;
    Ok(fds.iter().map(|p| p.revents & ready != 0).collect())
}

/// Stub for non-Unix: every handle is reported readable and reads block
/// until data or their timeout.
#[cfg(not(unix))]
pub fn wait_readable(handles: &[PollHandle], _timeout: Duration) -> io::Result<Vec<bool>> {
    Ok(vec![true; handles.len()])
}
