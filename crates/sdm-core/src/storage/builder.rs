//! Opening and pre-extending the output file.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::writer::OutputFile;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

const ZERO_CHUNK: usize = 64 * 1024;

/// Builder for the destination file. Call `preallocate` (fresh downloads
/// only) then `build` to get an [`OutputFile`] for positional writes.
pub struct OutputFileBuilder {
    file: File,
    path: PathBuf,
}

impl OutputFileBuilder {
    /// Create the output at `path`, truncating anything already there.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("failed to create output file: {}", path.display()))?;
        Ok(OutputFileBuilder {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing output for resume (read+write, no truncation).
    pub fn open_existing(path: &Path) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("failed to open output file for resume: {}", path.display()))?;
        Ok(OutputFileBuilder {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Extend the file to `size` bytes. Tries `posix_fallocate` on Unix, then
    /// a sparse `set_len`, then writes zeros as the last resort.
    pub fn preallocate(&mut self, size: u64) -> Result<()> {
        if size == 0 {
            return Ok(());
        }
        #[cfg(unix)]
        {
            let fd = self.file.as_raw_fd();
            let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
            if r == 0 {
                return Ok(());
            }
            tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
        }
        match self.file.set_len(size) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::debug!("set_len failed ({}), zero-filling {} bytes", e, size);
                self.zero_fill(size)
            }
        }
    }

    /// Write `size` zero bytes from the start of the file.
    pub fn zero_fill(&mut self, size: u64) -> Result<()> {
        let chunk = vec![0u8; ZERO_CHUNK];
        let mut left = size;
        while left > 0 {
            let n = left.min(ZERO_CHUNK as u64) as usize;
            self.file
                .write_all(&chunk[..n])
                .with_context(|| format!("failed to zero-fill {}", self.path.display()))?;
            left -= n as u64;
        }
        Ok(())
    }

    pub fn build(self) -> OutputFile {
        OutputFile::new(self.file, self.path)
    }
}
