//! Engine configuration

use super::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine-wide settings shared by every operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Operations allowed past `queued` at the same time
    #[serde(default = "default_max_active_operations")]
    pub max_active_operations: usize,
    /// Buffered events per subscriber before it starts lagging
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
    /// Minimum spacing between record-level progress events in milliseconds
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    /// Window used for the processing rate in seconds
    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,
    /// Policy template for operations submitted without one
    #[serde(default)]
    pub defaults: BulkOperationConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_active_operations: default_max_active_operations(),
            event_channel_capacity: default_event_channel_capacity(),
            progress_interval_ms: default_progress_interval_ms(),
            rate_window_secs: default_rate_window_secs(),
            defaults: BulkOperationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load engine settings from `NETINV_BULK_*` environment variables
    pub fn from_env() -> crate::utils::error::Result<Self> {
        let mut config = Self::default();

        if let Some(value) = env_parse("NETINV_BULK_MAX_ACTIVE_OPERATIONS")? {
            config.max_active_operations = value;
        }
        if let Some(value) = env_parse("NETINV_BULK_EVENT_CHANNEL_CAPACITY")? {
            config.event_channel_capacity = value;
        }
        if let Some(value) = env_parse("NETINV_BULK_PROGRESS_INTERVAL_MS")? {
            config.progress_interval_ms = value;
        }
        if let Some(value) = env_parse("NETINV_BULK_BATCH_SIZE")? {
            config.defaults.batch_size = value;
        }
        if let Some(value) = env_parse("NETINV_BULK_MAX_CONCURRENT")? {
            config.defaults.max_concurrent = value;
        }
        if let Some(value) = env_parse("NETINV_BULK_RETRY_ATTEMPTS")? {
            config.defaults.retry_attempts = value;
        }
        if let Some(value) = env_parse("NETINV_BULK_RETRY_DELAY_MS")? {
            config.defaults.retry_delay_ms = value;
        }
        if let Some(value) = env_parse("NETINV_BULK_TIMEOUT_MS")? {
            config.defaults.timeout_ms = value;
        }
        if let Some(value) = env_parse("NETINV_BULK_ENABLE_ROLLBACK")? {
            config.defaults.enable_rollback = value;
        }
        if let Ok(level) = std::env::var("NETINV_BULK_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(value) = env_parse("NETINV_BULK_LOG_JSON")? {
            config.logging.json = value;
        }

        Ok(config)
    }

    /// Progress event spacing
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Processing rate window
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }

    /// Merge engine configurations, with other taking precedence
    pub fn merge(mut self, other: Self) -> Self {
        if other.max_active_operations != default_max_active_operations() {
            self.max_active_operations = other.max_active_operations;
        }
        if other.event_channel_capacity != default_event_channel_capacity() {
            self.event_channel_capacity = other.event_channel_capacity;
        }
        if other.progress_interval_ms != default_progress_interval_ms() {
            self.progress_interval_ms = other.progress_interval_ms;
        }
        if other.rate_window_secs != default_rate_window_secs() {
            self.rate_window_secs = other.rate_window_secs;
        }
        if other.defaults != BulkOperationConfig::default() {
            self.defaults = other.defaults;
        }
        self.logging = self.logging.merge(other.logging);
        self
    }
}

fn env_parse<T>(key: &str) -> crate::utils::error::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            crate::utils::error::BulkError::config(format!("Invalid value for {}: {}", key, e))
        }),
        Err(_) => Ok(None),
    }
}
