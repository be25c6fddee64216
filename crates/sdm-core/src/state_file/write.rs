//! Encoding and atomic replacement.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{StateFileError, StateRecord, HEADER_LEN, SLOT_LEN};

fn field(v: u64) -> [u8; 8] {
    // Unbounded segments use i64::MAX, so every valid value fits.
    (v.min(i64::MAX as u64) as i64).to_ne_bytes()
}

/// Serializes `record` in the current format.
pub fn encode(record: &StateRecord) -> Vec<u8> {
    let mut out = Vec::with_capacity((HEADER_LEN + SLOT_LEN * record.segments.len() as u64) as usize);
    out.extend_from_slice(&(record.segments.len() as u32).to_ne_bytes());
    out.extend_from_slice(&field(record.bytes_completed));
    for s in &record.segments {
        out.extend_from_slice(&field(s.current_byte));
        out.extend_from_slice(&field(s.last_byte));
    }
    out
}

fn temp_path(path: &Path) -> PathBuf {
    let mut o = path.as_os_str().to_owned();
    o.push(".tmp");
    PathBuf::from(o)
}

/// Writes `record` to `path`. The image goes to a temp file first and is
/// renamed over the old one, so a crash never leaves a half-written file.
pub fn snapshot(path: &Path, record: &StateRecord) -> Result<(), StateFileError> {
    let tmp = temp_path(path);
    fs::write(&tmp, encode(record))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Deletes the state file; a missing file is not an error.
pub fn remove(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
