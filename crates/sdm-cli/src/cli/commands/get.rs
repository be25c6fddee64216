//! `sdm get` – download one URL.

use anyhow::Result;
use sdm_core::config::SdmConfig;
use sdm_core::control::CancelToken;
use sdm_core::session::ProgressStats;
use sdm_core::transport::TcpConnector;
use sdm_core::{download_blocking_async, DownloadRequest};
use std::sync::Arc;
use std::time::Instant;

const PROGRESS_INTERVAL_MS: u64 = 500;

pub async fn run_get(cfg: SdmConfig, request: DownloadRequest, quiet: bool) -> Result<()> {
    let abort = CancelToken::new();
    let on_ctrl_c = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ninterrupted, saving progress...");
            on_ctrl_c.cancel();
        }
    });

    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::channel::<ProgressStats>(16);
    let progress_handle = tokio::spawn(async move {
        let mut last_print: Option<Instant> = None;
        while let Some(stats) = progress_rx.recv().await {
            let due = last_print
                .map_or(true, |t| t.elapsed().as_millis() as u64 >= PROGRESS_INTERVAL_MS);
            if !quiet && due {
                println!("{}", progress_line(&stats));
                last_print = Some(Instant::now());
            }
        }
    });

    let result = download_blocking_async(
        request,
        cfg,
        Arc::new(TcpConnector),
        abort,
        Some(progress_tx),
    )
    .await;
    let _ = progress_handle.await;
    let report = result?;

    let secs = report.elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        report.bytes_this_run as f64 / secs
    } else {
        0.0
    };
    println!(
        "Downloaded {} to {} in {:.1}s ({}/s)",
        human_bytes(report.bytes_completed),
        report.output_path.display(),
        secs,
        human_bytes(rate as u64)
    );
    let s = report.summary;
    if s.throttle_events > 0 || s.error_events > 0 {
        println!(
            "  {} reconnect(s) after errors, {} after throttling",
            s.error_events, s.throttle_events
        );
    }
    Ok(())
}

pub(crate) fn progress_line(stats: &ProgressStats) -> String {
    let done = human_bytes(stats.bytes_done);
    let rate = human_bytes(stats.bytes_per_sec() as u64);
    let conns = format!("{}/{} conns", stats.active_slots, stats.slot_count);
    match (stats.total_bytes, stats.fraction()) {
        (Some(total), Some(fraction)) => {
            let eta = stats
                .eta_secs()
                .map(|s| format!("{:.0}s", s))
                .unwrap_or_else(|| "?".to_string());
            format!(
                "  {} / {} ({:.1}%)  {}/s  ETA {}  {}",
                done,
                human_bytes(total),
                fraction * 100.0,
                rate,
                eta,
                conns
            )
        }
        _ => format!("  {}  {}/s  {}", done, rate, conns),
    }
}

pub(crate) fn human_bytes(n: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if n < 1024 {
        return format!("{} B", n);
    }
    let mut value = n as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
