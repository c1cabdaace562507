//! Bulk operation policy validators

use super::trait_def::Validate;
use crate::config::models::BulkOperationConfig;

/// Largest batch the engine accepts
const MAX_BATCH_SIZE: usize = 10_000;

/// Validate the numeric policy fields, ignoring the resource binding
pub fn validate_policy(config: &BulkOperationConfig) -> Result<(), String> {
    if config.batch_size == 0 {
        return Err("Batch size must be greater than 0".to_string());
    }

    if config.batch_size > MAX_BATCH_SIZE {
        return Err(format!(
            "Batch size {} exceeds maximum of {}",
            config.batch_size, MAX_BATCH_SIZE
        ));
    }

    if config.max_concurrent == 0 {
        return Err("Max concurrent batches must be greater than 0".to_string());
    }

    if config.timeout_ms == 0 {
        return Err("Operation timeout must be greater than 0".to_string());
    }

    if config.custom_validators.iter().any(|v| v.trim().is_empty()) {
        return Err("Custom validator names cannot be empty".to_string());
    }

    if config.processors.iter().any(|p| p.trim().is_empty()) {
        return Err("Processor names cannot be empty".to_string());
    }

    Ok(())
}

impl Validate for BulkOperationConfig {
    fn validate(&self) -> Result<(), String> {
        if self.resource_type.trim().is_empty() {
            return Err("Resource type cannot be empty".to_string());
        }

        validate_policy(self)
    }
}
