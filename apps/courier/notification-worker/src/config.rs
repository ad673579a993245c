//! Worker process settings.

use core_config::{env_optional, env_parse, ConfigError, FromEnv};
use std::net::SocketAddr;

/// Stream read and metrics settings for the worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    pub batch_size: usize,
    /// Blocking read timeout; 0 switches to polling.
    pub block_ms: u64,
    /// Transient failures tolerated per entry before it is dead-lettered.
    pub max_retries: u32,
    /// Idle time after which another consumer's pending entries are claimed.
    pub claim_idle_ms: u64,
    /// Prometheus listener; `None` keeps metrics in-process only.
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            block_ms: 5_000,
            max_retries: 3,
            claim_idle_ms: 60_000,
            metrics_addr: None,
        }
    }
}

impl FromEnv for WorkerSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let metrics_addr = env_optional("METRICS_ADDR")
            .map(|raw| {
                raw.trim().parse().map_err(|e: std::net::AddrParseError| ConfigError::ParseError {
                    key: "METRICS_ADDR".to_string(),
                    details: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            batch_size: env_parse("NOTIFY_STREAM_BATCH_SIZE", defaults.batch_size)?,
            block_ms: env_parse("NOTIFY_STREAM_BLOCK_MS", defaults.block_ms)?,
            max_retries: env_parse("NOTIFY_STREAM_MAX_RETRIES", defaults.max_retries)?,
            claim_idle_ms: env_parse("NOTIFY_STREAM_CLAIM_IDLE_MS", defaults.claim_idle_ms)?,
            metrics_addr,
        })
    }
}
