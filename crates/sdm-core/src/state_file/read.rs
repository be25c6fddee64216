//! Decoding and validation.

use std::fs;
use std::io;
use std::path::Path;

use super::{StateFileError, StateRecord, HEADER_LEN, LEGACY_SLOT_LEN, SLOT_LEN};
use crate::segmenter::{divide, Segment};

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u32(&mut self) -> u32 {
        u32::from_ne_bytes(self.take::<4>())
    }

    fn u64_field(&mut self) -> Result<u64, StateFileError> {
        let v = i64::from_ne_bytes(self.take::<8>());
        u64::try_from(v).map_err(|_| StateFileError::Negative(v))
    }
}

/// Decodes a state file image. `total_size` is the remote size when known;
/// old-format files need it to rebuild slot bounds.
pub fn decode(buf: &[u8], total_size: Option<u64>) -> Result<StateRecord, StateFileError> {
    let len = buf.len() as u64;
    if len < HEADER_LEN {
        return Err(StateFileError::Truncated {
            len,
            needed: HEADER_LEN,
        });
    }
    let mut cur = Cursor { buf, pos: 0 };
    let slots = cur.u32() as usize;
    if slots == 0 {
        return Err(StateFileError::NoSlots);
    }

    let legacy = len < HEADER_LEN + SLOT_LEN * slots as u64;
    let needed = HEADER_LEN + if legacy { LEGACY_SLOT_LEN } else { SLOT_LEN } * slots as u64;
    if len < needed {
        return Err(StateFileError::Truncated { len, needed });
    }

    let bytes_completed = cur.u64_field()?;
    let segments = if legacy {
        let total = total_size.ok_or(StateFileError::LegacyNeedsSize)?;
        let mut bounds = divide(total, slots);
        if bounds.len() != slots {
            return Err(StateFileError::LegacyMismatch {
                found: slots,
                expected: bounds.len(),
            });
        }
        tracing::debug!(slots, "state file predates per-slot bounds, rebuilding them");
        for seg in bounds.iter_mut() {
            seg.current_byte = cur.u64_field()?;
        }
        bounds
    } else {
        let mut segs = Vec::with_capacity(slots);
        for _ in 0..slots {
            let current_byte = cur.u64_field()?;
            let last_byte = cur.u64_field()?;
            segs.push(Segment::new(current_byte, last_byte));
        }
        segs
    };

    for (slot, s) in segments.iter().enumerate() {
        let past_end = total_size.map_or(false, |t| s.last_byte > t);
        if s.current_byte > s.last_byte || past_end {
            return Err(StateFileError::BadRange {
                slot,
                current: s.current_byte,
                last: s.last_byte,
            });
        }
    }
    if let Some(total) = total_size {
        if bytes_completed > total {
            return Err(StateFileError::Oversized {
                completed: bytes_completed,
                total,
            });
        }
    }

    Ok(StateRecord {
        bytes_completed,
        segments,
    })
}

/// Reads and validates the state file at `path`.
pub fn read_record(path: &Path, total_size: Option<u64>) -> Result<StateRecord, StateFileError> {
    let buf = fs::read(path)?;
    decode(&buf, total_size)
}

/// Like [`read_record`] but a missing file is `Ok(None)` (fresh download).
pub fn restore(path: &Path, total_size: Option<u64>) -> Result<Option<StateRecord>, StateFileError> {
    match fs::read(path) {
        Ok(buf) => decode(&buf, total_size).map(Some),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
