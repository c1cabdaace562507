//! Engine configuration validators

use super::operation_validators::validate_policy;
use super::trait_def::Validate;
use crate::config::models::*;
use tracing::debug;

impl Validate for EngineConfig {
    fn validate(&self) -> Result<(), String> {
        debug!("Validating engine configuration");

        if self.max_active_operations == 0 {
            return Err("Max active operations must be greater than 0".to_string());
        }

        if self.event_channel_capacity == 0 {
            return Err("Event channel capacity must be greater than 0".to_string());
        }

        if self.rate_window_secs == 0 {
            return Err("Rate window must be at least 1 second".to_string());
        }

        validate_policy(&self.defaults).map_err(|e| format!("Default policy: {}", e))?;
        self.logging.validate()?;

        Ok(())
    }
}

impl Validate for LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        if self.level.trim().is_empty() {
            return Err("Log level cannot be empty".to_string());
        }

        tracing_subscriber::EnvFilter::try_new(&self.level)
            .map_err(|e| format!("Invalid log level '{}': {}", self.level, e))?;

        Ok(())
    }
}
