//! Runtime configuration assembled from environment variables and CLI flags
//!
//! There is no config *service* here — just a struct with sane defaults,
//! loaded once at startup, the way the teacher crate's CLI builds its
//! `AriataBuilder` from `env::var` calls in `main`.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::sla::{OfficeHoursConfig, SlaConfig};

/// Top-level configuration for a pipeline run
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub upstream: UpstreamConfig,
    pub queue: QueueConfig,
    pub sla: SlaConfig,
    pub office_hours: OfficeHoursConfig,
}

impl AppConfig {
    /// Load configuration from the environment (`.env` honored if present)
    pub fn from_env() -> Result<Self> {
        let _ = dotenv::dotenv();

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://chatsync.db".to_string());

        Ok(Self {
            database_url,
            upstream: UpstreamConfig::from_env()?,
            queue: QueueConfig::from_env(),
            sla: SlaConfig::default(),
            office_hours: OfficeHoursConfig::default(),
        })
    }
}

/// Upstream API connection settings
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub batch_size: u32,
}

impl UpstreamConfig {
    fn from_env() -> Result<Self> {
        let base_url = std::env::var("UPSTREAM_BASE_URL")
            .map_err(|_| Error::Configuration("UPSTREAM_BASE_URL is required".to_string()))?;
        let token_url = std::env::var("UPSTREAM_TOKEN_URL")
            .unwrap_or_else(|_| format!("{}/oauth/token", base_url.trim_end_matches('/')));
        let client_id = std::env::var("UPSTREAM_CLIENT_ID")
            .map_err(|_| Error::Configuration("UPSTREAM_CLIENT_ID is required".to_string()))?;
        let client_secret = std::env::var("UPSTREAM_CLIENT_SECRET")
            .map_err(|_| Error::Configuration("UPSTREAM_CLIENT_SECRET is required".to_string()))?;
        let batch_size = std::env::var("BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);

        Ok(Self {
            base_url,
            token_url,
            client_id,
            client_secret,
            batch_size,
        })
    }
}

/// Rate-limited queue behavior
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub max_inflight: usize,
    pub min_interval: Duration,
    pub retry_attempts: u32,
    pub retry_initial_backoff: Duration,
    pub retry_max_backoff: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_inflight: 1,
            min_interval: Duration::from_millis(200),
            retry_attempts: 5,
            retry_initial_backoff: Duration::from_millis(1000),
            retry_max_backoff: Duration::from_secs(30),
        }
    }
}

impl QueueConfig {
    fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_usize("QUEUE_MAX_INFLIGHT") {
            config.max_inflight = v;
        }
        if let Some(ms) = env_u64("QUEUE_RATE_INTERVAL_MS") {
            config.min_interval = Duration::from_millis(ms);
        }
        if let Some(v) = env_u64("QUEUE_RETRY_ATTEMPTS") {
            config.retry_attempts = v as u32;
        }
        if let Some(ms) = env_u64("QUEUE_RETRY_DELAY_MS") {
            config.retry_initial_backoff = Duration::from_millis(ms);
        }

        config
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_config_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.max_inflight, 1);
        assert_eq!(config.retry_attempts, 5);
    }
}
