//! Segment type and initial partitioning.

/// Smallest span worth giving its own connection (100 KiB).
pub const MIN_CHUNK_WORTH: u64 = 100 * 1024;

/// Upper bound used for a segment whose end is not known (server did not
/// report a size). Fits the signed 64-bit fields of the state file.
pub const UNBOUNDED: u64 = i64::MAX as u64;

/// One slot's assignment: bytes `[current_byte, last_byte)` still to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Segment {
    /// Next byte to write (inclusive).
    pub current_byte: u64,
    /// End of the assignment (exclusive).
    pub last_byte: u64,
}

impl Segment {
    pub fn new(current_byte: u64, last_byte: u64) -> Self {
        Self {
            current_byte,
            last_byte,
        }
    }

    /// Bytes left in this segment.
    pub fn remaining(&self) -> u64 {
        self.last_byte.saturating_sub(self.current_byte)
    }

    /// True once every byte of the assignment has been written.
    pub fn is_exhausted(&self) -> bool {
        self.current_byte >= self.last_byte
    }

    pub fn is_unbounded(&self) -> bool {
        self.last_byte >= UNBOUNDED
    }

    /// HTTP Range header value (inclusive end): `bytes=current-(last-1)`,
    /// or open-ended `bytes=current-` when the end is unknown.
    pub fn range_header_value(&self) -> String {
        if self.is_unbounded() {
            format!("bytes={}-", self.current_byte)
        } else if self.is_exhausted() {
            format!("bytes={}-{}", self.current_byte, self.current_byte)
        } else {
            format!("bytes={}-{}", self.current_byte, self.last_byte - 1)
        }
    }
}

/// Splits `[0, total_size)` across at most `requested` connections.
///
/// The connection count is reduced so no segment is smaller than
/// [`MIN_CHUNK_WORTH`] (never below one). Slot `i` gets
/// `[i * len, (i + 1) * len)` and the last slot absorbs the remainder. An
/// empty file yields a single empty segment.
pub fn divide(total_size: u64, requested: usize) -> Vec<Segment> {
    let mut count = (requested.max(1)) as u64;
    let max_conns = (total_size / MIN_CHUNK_WORTH).max(1);
    if max_conns < count {
        count = max_conns;
    }

    let mut seg_len = total_size / count;
    if seg_len == 0 {
        tracing::debug!("too few bytes remaining, forcing a single connection");
        count = 1;
        seg_len = total_size;
    }

    let mut out: Vec<Segment> = (0..count)
        .map(|i| Segment::new(seg_len * i, seg_len * i + seg_len))
        .collect();

    // Last connection downloads the remaining bytes.
    let tail = total_size - seg_len * count;
    if let Some(last) = out.last_mut() {
        last.last_byte += tail;
    }

    for (i, s) in out.iter().enumerate() {
        tracing::debug!(slot = i, "downloading {}-{}", s.current_byte, s.last_byte);
    }
    out
}
