//! Logging setup: the XDG state log file, with stderr as fallback.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Used when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info,sdm=debug,sdm_core=debug";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn install<W>(writer: W) -> Result<()>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("tracing subscriber: {}", e))
}

/// Path of the log file: `~/.local/state/sdm/sdm.log`.
pub fn log_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("sdm")?;
    Ok(xdg_dirs.get_state_home().join("sdm.log"))
}

/// Appends structured logs to [`log_path`]. Fails when the file cannot be
/// opened so the caller can fall back to [`init_logging_stderr`].
pub fn init_logging() -> Result<()> {
    let path = log_path()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("cannot create log directory {}", dir.display()))?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("cannot open log file {}", path.display()))?;

    install(Arc::new(file))?;
    tracing::info!(
        "sdm {} logging to {}",
        env!("CARGO_PKG_VERSION"),
        path.display()
    );
    Ok(())
}

/// Logs to stderr. A subscriber installed earlier stays in place.
pub fn init_logging_stderr() {
    let _ = install(std::io::stderr);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_lives_in_sdm_state_dir() {
        if let Ok(path) = log_path() {
            assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("sdm.log"));
        }
    }

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
