use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Reconnect backoff parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds. Clamped to `reconnect_delay_secs`.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: 0.25,
            max_delay_secs: 20,
        }
    }
}

/// Global configuration loaded from `~/.config/sdm/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SdmConfig {
    /// Requested number of parallel connections.
    pub num_connections: usize,
    /// Read buffer size in bytes (one read per active slot per iteration).
    pub buffer_size: usize,
    /// Throughput ceiling in bytes per second (0 = unlimited).
    pub max_speed: u64,
    /// Seconds without readable data before an active connection is dropped.
    pub connection_timeout_secs: u64,
    /// Seconds a connection setup may take before it is cancelled and retried.
    pub reconnect_delay_secs: u64,
    /// Seconds between state snapshots.
    pub save_state_interval_secs: u64,
    /// Socket connect/read/write timeout in seconds (0 = none).
    pub io_timeout_secs: u64,
    /// HTTP redirects followed during the probe.
    pub max_redirect: u32,
    /// Refuse to overwrite an existing output file that has no state file.
    pub no_clobber: bool,
    /// Drop `?query` from URL-derived filenames.
    pub strip_cgi_parameters: bool,
    /// Filename used when none can be derived from the server or URL.
    pub default_filename: String,
    /// Local addresses to bind outgoing connections to, round-robin per slot.
    pub interfaces: Vec<String>,
    pub user_agent: String,
    /// Extra request headers (HTTP only).
    pub headers: BTreeMap<String, String>,
    /// Optional reconnect backoff; if missing, built-in defaults are used.
    pub retry: Option<RetryConfig>,
}

impl Default for SdmConfig {
    fn default() -> Self {
        Self {
            num_connections: 4,
            buffer_size: 5120,
            max_speed: 0,
            connection_timeout_secs: 45,
            reconnect_delay_secs: 20,
            save_state_interval_secs: 10,
            io_timeout_secs: 120,
            max_redirect: 20,
            no_clobber: false,
            strip_cgi_parameters: true,
            default_filename: crate::url_model::DEFAULT_FILENAME.to_string(),
            interfaces: Vec::new(),
            user_agent: format!("sdm/{}", env!("CARGO_PKG_VERSION")),
            headers: BTreeMap::new(),
            retry: None,
        }
    }
}

impl SdmConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn save_state_interval(&self) -> Duration {
        Duration::from_secs(self.save_state_interval_secs)
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        (self.io_timeout_secs > 0).then(|| Duration::from_secs(self.io_timeout_secs))
    }

    /// Backoff for failed connection setups. The cap never exceeds the
    /// reconnect delay, so a failing slot is retried at least that often.
    pub fn retry_policy(&self) -> RetryPolicy {
        let rc = self.retry.clone().unwrap_or_default();
        let cap = Duration::from_secs(rc.max_delay_secs).min(self.reconnect_delay());
        RetryPolicy {
            base_delay: Duration::from_secs_f64(rc.base_delay_secs.max(0.0)),
            max_delay: cap,
        }
    }

    /// Parsed `interfaces`; entries that are not IP addresses are skipped
    /// with a warning.
    pub fn local_addresses(&self) -> Vec<std::net::IpAddr> {
        self.interfaces
            .iter()
            .filter_map(|s| match s.trim().parse() {
                Ok(ip) => Some(ip),
                Err(_) => {
                    tracing::warn!("ignoring interface {:?}: not an IP address", s);
                    None
                }
            })
            .collect()
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("sdm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<SdmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = SdmConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: SdmConfig = toml::from_str(&data)?;
    Ok(cfg)
}
