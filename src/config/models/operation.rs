//! Bulk operation policy configuration

use super::*;
use crate::core::bulk::types::OperationType;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Immutable policy for one bulk operation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOperationConfig {
    /// Mutation applied to every record
    #[serde(default)]
    pub operation_type: OperationType,
    /// Resource type the records belong to (e.g. `vpc`, `subnet`, `gateway`)
    #[serde(default)]
    pub resource_type: String,
    /// Records per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Batches processed concurrently
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Keep going after a record fails terminally
    #[serde(default = "default_true")]
    pub continue_on_error: bool,
    /// Keep an undo ledger and roll back on abort
    #[serde(default)]
    pub enable_rollback: bool,
    /// Wall-clock budget for the whole operation in milliseconds
    #[serde(default = "default_operation_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries per record for retryable adapter errors
    #[serde(default = "default_max_retries")]
    pub retry_attempts: u32,
    /// Fixed delay between retries in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Validate every record before the first mutation
    #[serde(default = "default_true")]
    pub validate_before_process: bool,
    /// Named validators run after the resource checks, in order
    #[serde(default)]
    pub custom_validators: Vec<String>,
    /// Named processors applied to each record before its mutation, in order
    #[serde(default)]
    pub processors: Vec<String>,
    /// Record a ledger savepoint whenever a batch completes
    #[serde(default = "default_true")]
    pub savepoint_per_batch: bool,
    /// How much of the ledger an abort unwinds
    #[serde(default)]
    pub rollback_policy: RollbackPolicy,
}

/// Rollback scope applied when an operation aborts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackPolicy {
    /// Unwind every ledger entry
    #[default]
    All,
    /// Unwind only entries recorded after the last savepoint
    ToLastSavepoint,
}

impl Default for BulkOperationConfig {
    fn default() -> Self {
        Self {
            operation_type: OperationType::default(),
            resource_type: String::new(),
            batch_size: default_batch_size(),
            max_concurrent: default_max_concurrent(),
            continue_on_error: true,
            enable_rollback: false,
            timeout_ms: default_operation_timeout_ms(),
            retry_attempts: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            validate_before_process: true,
            custom_validators: Vec::new(),
            processors: Vec::new(),
            savepoint_per_batch: true,
            rollback_policy: RollbackPolicy::default(),
        }
    }
}

impl BulkOperationConfig {
    /// Create a config for the given operation and resource type
    pub fn new(operation_type: OperationType, resource_type: impl Into<String>) -> Self {
        Self {
            operation_type,
            resource_type: resource_type.into(),
            ..Self::default()
        }
    }

    /// Derive a config from a template, keeping its policy fields
    pub fn from_template(
        template: &Self,
        operation_type: OperationType,
        resource_type: impl Into<String>,
    ) -> Self {
        Self {
            operation_type,
            resource_type: resource_type.into(),
            ..template.clone()
        }
    }

    /// Set batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set concurrency limit
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Set whether to continue on individual errors
    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Enable or disable rollback
    pub fn with_rollback(mut self, enable_rollback: bool) -> Self {
        self.enable_rollback = enable_rollback;
        self
    }

    /// Set rollback policy
    pub fn with_rollback_policy(mut self, policy: RollbackPolicy) -> Self {
        self.rollback_policy = policy;
        self
    }

    /// Set operation timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set max retries
    pub fn with_retry_attempts(mut self, retry_attempts: u32) -> Self {
        self.retry_attempts = retry_attempts;
        self
    }

    /// Set delay between retries
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay_ms = retry_delay.as_millis() as u64;
        self
    }

    /// Validate up front or inline
    pub fn with_validate_before_process(mut self, validate_before_process: bool) -> Self {
        self.validate_before_process = validate_before_process;
        self
    }

    /// Append a named custom validator
    pub fn with_validator(mut self, name: impl Into<String>) -> Self {
        self.custom_validators.push(name.into());
        self
    }

    /// Append a named record processor
    pub fn with_processor(mut self, name: impl Into<String>) -> Self {
        self.processors.push(name.into());
        self
    }

    /// Operation timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay between retries
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
