//! Output file I/O.
//!
//! Creates and pre-extends the destination (fallocate on Linux when
//! available, else set_len, else zero fill), reopens it for resume, and
//! writes at explicit offsets (pwrite). Also names the state side-car file.

mod builder;
mod writer;

pub use builder::OutputFileBuilder;
pub use writer::OutputFile;

use std::path::{Path, PathBuf};

/// Suffix of the resume state file kept next to the output.
pub const STATE_SUFFIX: &str = ".st";

/// Side-car path for `output`: appends `.st` (e.g. `file.iso` → `file.iso.st`).
pub fn state_path(output: &Path) -> PathBuf {
    let mut o = output.as_os_str().to_owned();
    o.push(STATE_SUFFIX);
    PathBuf::from(o)
}
