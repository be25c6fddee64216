//! Offset writer for the destination file.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
#[cfg(unix)]
use std::os::unix::fs::FileExt;

/// The destination file. Every write names its absolute offset, so writes
/// for different slots need no ordering between them.
pub struct OutputFile {
    file: File,
    path: PathBuf,
}

impl OutputFile {
    pub(super) fn new(file: File, path: PathBuf) -> Self {
        Self { file, path }
    }

    /// Write all of `data` at `offset` without touching the file cursor.
    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.file
            .write_all_at(data, offset)
            .with_context(|| format!("write of {} bytes at offset {} failed", data.len(), offset))
    }

    /// Non-Unix fallback: seek + write on a cloned handle.
    #[cfg(not(unix))]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let mut f = self.file.try_clone()?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(data)
            .with_context(|| format!("write of {} bytes at offset {} failed", data.len(), offset))
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync_all().context("output sync failed")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
