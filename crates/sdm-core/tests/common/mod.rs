#![allow(dead_code)]

pub mod ftp_server;
pub mod range_server;

use sdm_core::config::{RetryConfig, SdmConfig};

/// Small buffers and short timeouts so failures surface within a test's
/// time budget.
pub fn test_config(connections: usize) -> SdmConfig {
    SdmConfig {
        num_connections: connections,
        buffer_size: 16 * 1024,
        connection_timeout_secs: 5,
        reconnect_delay_secs: 5,
        save_state_interval_secs: 1,
        io_timeout_secs: 5,
        retry: Some(RetryConfig {
            base_delay_secs: 0.05,
            max_delay_secs: 1,
        }),
        ..SdmConfig::default()
    }
}

/// Deterministic, non-repeating-per-block test payload.
pub fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8 ^ (i / 251) as u8).collect()
}
