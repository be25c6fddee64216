//! `sdm status` – show what a state file records.

use anyhow::{Context, Result};
use sdm_core::state_file;
use sdm_core::storage::{state_path, STATE_SUFFIX};
use std::fs;
use std::path::{Path, PathBuf};

use super::get::human_bytes;

pub fn run_status(file: &Path) -> Result<()> {
    let (output, state) = resolve(file);
    if !state.exists() {
        println!("No state file for {} (finished or never started).", output.display());
        return Ok(());
    }
    // The output is pre-extended to the full size, which legacy state files need.
    let size = fs::metadata(&output).ok().map(|m| m.len());
    let record = state_file::read_record(&state, size)
        .with_context(|| format!("cannot read {}", state.display()))?;

    println!("{}", output.display());
    match size {
        Some(total) if total > 0 => println!(
            "  {} of {} done ({:.1}%), {} left",
            human_bytes(record.bytes_completed),
            human_bytes(total),
            record.bytes_completed as f64 * 100.0 / total as f64,
            human_bytes(record.remaining())
        ),
        _ => println!(
            "  {} done, {} left",
            human_bytes(record.bytes_completed),
            human_bytes(record.remaining())
        ),
    }
    println!("{:<6} {:<14} {:<14} {}", "SLOT", "CURRENT", "LAST", "LEFT");
    for (i, seg) in record.segments.iter().enumerate() {
        println!(
            "{:<6} {:<14} {:<14} {}",
            i,
            seg.current_byte,
            seg.last_byte,
            human_bytes(seg.remaining())
        );
    }
    Ok(())
}

/// Accepts either the output file or its state file.
pub(crate) fn resolve(file: &Path) -> (PathBuf, PathBuf) {
    let name = file.to_string_lossy();
    match name.strip_suffix(STATE_SUFFIX) {
        Some(stem) if !stem.is_empty() => (PathBuf::from(stem), file.to_path_buf()),
        _ => (file.to_path_buf(), state_path(file)),
    }
}
