//! CLI for the SDM downloader.

mod commands;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use sdm_core::config::{self, SdmConfig};
use sdm_core::DownloadRequest;
use std::path::PathBuf;

use commands::{run_get, run_status};

/// Top-level CLI for the SDM downloader.
#[derive(Debug, Parser)]
#[command(name = "sdm")]
#[command(about = "SDM: resumable multi-connection HTTP/FTP downloader", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download a URL, resuming if a state file from an earlier run exists.
    Get {
        /// HTTP, HTTPS or FTP URL to download.
        url: String,
        /// Output file or directory (default: derived from the server or URL).
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
        /// Number of parallel connections.
        #[arg(short = 'n', long, value_name = "N")]
        connections: Option<usize>,
        /// Throughput ceiling in bytes per second (0 = unlimited).
        #[arg(short = 's', long, value_name = "BYTES_PER_SEC")]
        max_speed: Option<u64>,
        /// Refuse to overwrite an existing file that has no state file.
        #[arg(long)]
        no_clobber: bool,
        /// Extra request header, e.g. -H 'Referer: https://example.com/'.
        #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
        headers: Vec<String>,
        /// Local address to bind connections to; repeat to spread slots.
        #[arg(long = "interface", value_name = "ADDR")]
        interfaces: Vec<String>,
        /// Do not print progress lines.
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show the progress recorded in a download's state file.
    Status {
        /// Output file (or its .st state file).
        file: PathBuf,
    },
}

impl Cli {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Get {
                url,
                output,
                connections,
                max_speed,
                no_clobber,
                headers,
                interfaces,
                quiet,
            } => {
                let mut cfg = cfg;
                let overrides = Overrides {
                    connections,
                    max_speed,
                    no_clobber,
                    headers,
                    interfaces,
                };
                overrides.apply(&mut cfg)?;
                run_get(cfg, DownloadRequest { url, output }, quiet).await?;
            }
            CliCommand::Status { file } => run_status(&file)?,
        }

        Ok(())
    }
}

/// Per-invocation settings from `sdm get` flags.
#[derive(Debug, Default)]
pub(crate) struct Overrides {
    pub connections: Option<usize>,
    pub max_speed: Option<u64>,
    pub no_clobber: bool,
    pub headers: Vec<String>,
    pub interfaces: Vec<String>,
}

impl Overrides {
    pub fn apply(self, cfg: &mut SdmConfig) -> Result<()> {
        if let Some(n) = self.connections {
            if n == 0 {
                bail!("--connections must be at least 1");
            }
            cfg.num_connections = n;
        }
        if let Some(speed) = self.max_speed {
            cfg.max_speed = speed;
        }
        if self.no_clobber {
            cfg.no_clobber = true;
        }
        for header in &self.headers {
            let (name, value) = parse_header(header)?;
            cfg.headers.insert(name, value);
        }
        if !self.interfaces.is_empty() {
            cfg.interfaces = self.interfaces;
        }
        Ok(())
    }
}

fn parse_header(raw: &str) -> Result<(String, String)> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => bail!("header {:?} must look like 'Name: value'", raw),
    }
}

#[cfg(test)]
mod tests;
