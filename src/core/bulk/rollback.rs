//! Rollback coordinator
//!
//! Unwinds ledger entries newest first through the resource adapter. Every
//! entry gets exactly one undo attempt; a failed undo is recorded and the walk
//! continues with the next older entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::ledger::TransactionOperation;
use super::types::MutationKind;
use crate::core::traits::adapter::ResourceAdapter;
use crate::utils::error::ErrorCode;

/// One undo attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackOperation {
    /// Sequence of the ledger entry being undone
    pub sequence: usize,
    /// Inverse mutation performed (undoing a create is a delete)
    #[serde(rename = "type")]
    pub rollback_type: MutationKind,
    pub resource_type: String,
    pub resource_id: String,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of a rollback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackInfo {
    pub enabled: bool,
    pub triggered: bool,
    /// Why the rollback ran
    pub reason: String,
    /// True only if every undo succeeded
    pub rollback_success: bool,
    pub rollback_errors: Vec<String>,
    /// `ROLLBACK_FAILED` when any undo failed
    pub error_code: Option<ErrorCode>,
    /// Ledger entries the rollback walked
    pub affected_records: usize,
    /// Savepoint the rollback stopped at, if scoped
    pub savepoint: Option<String>,
    pub operations: Vec<RollbackOperation>,
}

/// Drives undo calls for one resource adapter
pub struct RollbackCoordinator {
    adapter: Arc<dyn ResourceAdapter>,
}

impl RollbackCoordinator {
    pub fn new(adapter: Arc<dyn ResourceAdapter>) -> Self {
        Self { adapter }
    }

    /// Undo `operations` (given oldest first) in reverse order
    pub async fn rollback(
        &self,
        operations: &[TransactionOperation],
        reason: impl Into<String>,
        savepoint: Option<String>,
    ) -> RollbackInfo {
        let reason = reason.into();
        info!(
            "Rolling back {} {} mutation(s): {}",
            operations.len(),
            self.adapter.resource_type(),
            reason
        );

        let mut rollback_ops = Vec::with_capacity(operations.len());
        let mut rollback_errors = Vec::new();

        for operation in operations.iter().rev() {
            let result = self.adapter.undo(operation).await;
            let error = match result {
                Ok(()) => None,
                Err(e) => {
                    warn!(
                        "Undo of ledger entry {} ({} {}) failed: {}",
                        operation.sequence, operation.resource_type, operation.resource_id, e
                    );
                    let message = format!(
                        "{} {} ({}): {}",
                        operation.operation_type.inverse_label(),
                        operation.resource_id,
                        operation.resource_type,
                        e
                    );
                    rollback_errors.push(message);
                    Some(e.to_string())
                }
            };

            rollback_ops.push(RollbackOperation {
                sequence: operation.sequence,
                rollback_type: operation.operation_type.inverse(),
                resource_type: operation.resource_type.clone(),
                resource_id: operation.resource_id.clone(),
                success: error.is_none(),
                error,
                timestamp: Utc::now(),
            });
        }

        let rollback_success = rollback_errors.is_empty();
        if rollback_success {
            info!("Rollback finished: {} undo(s) applied", rollback_ops.len());
        } else {
            warn!(
                "Rollback finished with {} failed undo(s) out of {}",
                rollback_errors.len(),
                rollback_ops.len()
            );
        }

        RollbackInfo {
            enabled: true,
            triggered: true,
            reason,
            rollback_success,
            error_code: (!rollback_success).then_some(ErrorCode::RollbackFailed),
            rollback_errors,
            affected_records: rollback_ops.len(),
            savepoint,
            operations: rollback_ops,
        }
    }
}

impl MutationKind {
    fn inverse_label(&self) -> &'static str {
        match self {
            MutationKind::Create => "delete",
            MutationKind::Update => "restore",
            MutationKind::Delete => "re-create",
        }
    }
}
