//! Tracing subscriber setup
//!
//! The engine only emits `tracing` events. Nothing is printed unless the host
//! installs a subscriber, which is what `init_tracing` does for the binary.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::utils::error::{BulkError, Result};

/// Install a global fmt subscriber; `RUST_LOG` takes precedence over `config.level`
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| BulkError::config(format!("Invalid log filter: {}", e)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_thread_ids(false);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| BulkError::internal(format!("Failed to install subscriber: {}", e)))
}
