//! Resource adapter trait
//!
//! The persistence layer the bulk engine drives. One adapter serves one
//! resource type and performs, and can reverse, a single record mutation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::validator::ValidationResult;
use crate::core::bulk::ledger::TransactionOperation;
use crate::core::bulk::types::{BulkRecord, MutationKind, OperationType};

/// Error reported by a resource adapter
///
/// The adapter decides whether a failure is worth retrying.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{}{message}", code_prefix(.code))]
pub struct AdapterError {
    /// Error message
    pub message: String,
    /// Adapter specific error code (if available)
    pub code: Option<String>,
    /// Whether this error is retryable
    pub retryable: bool,
}

impl AdapterError {
    /// A transient failure the engine may retry
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            retryable: true,
        }
    }

    /// A failure that will not go away on retry
    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            retryable: false,
        }
    }

    /// Attach an adapter specific code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

fn code_prefix(code: &Option<String>) -> String {
    code.as_ref()
        .map(|code| format!("[{}] ", code))
        .unwrap_or_default()
}

/// A mutation the adapter durably applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedMutation {
    /// What actually happened (an upsert resolves to create or update)
    pub kind: MutationKind,
    /// Identifier of the affected resource
    pub resource_id: String,
    /// Pre-image, present for update and delete
    pub original_data: Option<Value>,
    /// Post-image, present for create and update
    pub new_data: Option<Value>,
}

impl AppliedMutation {
    pub fn created(resource_id: impl Into<String>, new_data: Value) -> Self {
        Self {
            kind: MutationKind::Create,
            resource_id: resource_id.into(),
            original_data: None,
            new_data: Some(new_data),
        }
    }

    pub fn updated(resource_id: impl Into<String>, original_data: Value, new_data: Value) -> Self {
        Self {
            kind: MutationKind::Update,
            resource_id: resource_id.into(),
            original_data: Some(original_data),
            new_data: Some(new_data),
        }
    }

    pub fn deleted(resource_id: impl Into<String>, original_data: Value) -> Self {
        Self {
            kind: MutationKind::Delete,
            resource_id: resource_id.into(),
            original_data: Some(original_data),
            new_data: None,
        }
    }
}

/// Persistence adapter for one resource type
///
/// Implementations must be safe to call concurrently up to the operation's
/// `max_concurrent`; single-connection stores should be run with a
/// concurrency of 1.
#[async_trait]
pub trait ResourceAdapter: Send + Sync + 'static {
    /// Resource type served by this adapter (e.g. `vpc`)
    fn resource_type(&self) -> &str;

    /// Operation types this adapter can execute
    fn supported_operations(&self) -> &[OperationType] {
        &[
            OperationType::Create,
            OperationType::Update,
            OperationType::Delete,
            OperationType::Upsert,
        ]
    }

    /// Check support for an operation type
    fn supports(&self, operation_type: OperationType) -> bool {
        self.supported_operations().contains(&operation_type)
    }

    /// Create one resource
    async fn create(&self, data: &Value) -> Result<AppliedMutation, AdapterError>;

    /// Apply the fields of `data` to the resource `id`
    async fn update(&self, id: &str, data: &Value) -> Result<AppliedMutation, AdapterError>;

    /// Delete the resource `id`
    async fn delete(&self, id: &str) -> Result<AppliedMutation, AdapterError>;

    /// Create or update depending on whether the resource exists
    async fn upsert(&self, id: Option<&str>, data: &Value)
    -> Result<AppliedMutation, AdapterError>;

    /// Reverse a previously applied mutation using its captured images
    async fn undo(&self, operation: &TransactionOperation) -> Result<(), AdapterError>;

    /// Resource specific required-field and type checks
    fn validate(&self, record: &BulkRecord, operation_type: OperationType) -> ValidationResult;
}
