//! Transaction ledger
//!
//! Records every mutation the resource adapter durably applied, in the order
//! the mutations completed, together with the pre/post images needed to undo
//! them. Workers append concurrently; the mutex serialises appends so the
//! entry order is a valid serialisation of completion order.
//!
//! Batches finish out of order when several run at once, so a savepoint is
//! the set of batches completed so far rather than a ledger position.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::types::MutationKind;
use crate::core::traits::adapter::AppliedMutation;

/// Lifecycle of a ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Active,
    Committed,
    RolledBack,
}

/// One applied, undoable record mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOperation {
    /// Position in the ledger, starting at zero
    pub sequence: usize,
    #[serde(rename = "type")]
    pub operation_type: MutationKind,
    pub resource_type: String,
    pub resource_id: String,
    /// Batch the record was processed in
    pub batch: usize,
    /// Record that produced this mutation
    pub record_index: usize,
    /// Pre-image for update and delete undo
    pub original_data: Option<Value>,
    /// Post-image for create undo
    pub new_data: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

/// Named position in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Savepoint {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    /// Number of ledger entries recorded when the savepoint was taken
    pub operation_index: usize,
    /// Batches that had run to completion when the savepoint was taken
    pub completed_batches: BTreeSet<usize>,
}

/// Ledger of one operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkTransaction {
    pub id: String,
    pub operation_id: String,
    pub status: TransactionStatus,
    pub operations: Vec<TransactionOperation>,
    pub savepoints: Vec<Savepoint>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Thread-safe ledger shared by all workers of an operation
#[derive(Debug)]
pub struct TransactionLedger {
    resource_type: String,
    inner: Mutex<BulkTransaction>,
}

impl TransactionLedger {
    pub fn new(operation_id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            inner: Mutex::new(BulkTransaction {
                id: format!("txn_{}", uuid::Uuid::new_v4().simple()),
                operation_id: operation_id.into(),
                status: TransactionStatus::Active,
                operations: Vec::new(),
                savepoints: Vec::new(),
                created_at: Utc::now(),
                closed_at: None,
            }),
        }
    }

    /// Record an applied mutation, returning its sequence number
    pub fn append(&self, batch: usize, record_index: usize, mutation: AppliedMutation) -> usize {
        let mut txn = self.inner.lock();
        let sequence = txn.operations.len();
        txn.operations.push(TransactionOperation {
            sequence,
            operation_type: mutation.kind,
            resource_type: self.resource_type.clone(),
            resource_id: mutation.resource_id,
            batch,
            record_index,
            original_data: mutation.original_data,
            new_data: mutation.new_data,
            timestamp: Utc::now(),
        });
        sequence
    }

    /// Record that `batch` ran to completion
    pub fn create_savepoint(&self, name: impl Into<String>, batch: usize) -> Savepoint {
        let mut txn = self.inner.lock();
        let mut completed_batches = txn
            .savepoints
            .last()
            .map(|last| last.completed_batches.clone())
            .unwrap_or_default();
        completed_batches.insert(batch);

        let savepoint = Savepoint {
            name: name.into(),
            timestamp: Utc::now(),
            operation_index: txn.operations.len(),
            completed_batches,
        };
        debug!(
            "Savepoint {} at ledger position {} ({} batches complete)",
            savepoint.name,
            savepoint.operation_index,
            savepoint.completed_batches.len()
        );
        txn.savepoints.push(savepoint.clone());
        savepoint
    }

    pub fn savepoint(&self, name: &str) -> Option<Savepoint> {
        self.inner
            .lock()
            .savepoints
            .iter()
            .rev()
            .find(|s| s.name == name)
            .cloned()
    }

    pub fn last_savepoint(&self) -> Option<Savepoint> {
        self.inner.lock().savepoints.last().cloned()
    }

    /// Entries from batches the savepoint does not cover, oldest first
    pub fn operations_since(&self, savepoint: &Savepoint) -> Vec<TransactionOperation> {
        self.inner
            .lock()
            .operations
            .iter()
            .filter(|op| !savepoint.completed_batches.contains(&op.batch))
            .cloned()
            .collect()
    }

    /// All entries, oldest first
    pub fn operations(&self) -> Vec<TransactionOperation> {
        self.inner.lock().operations.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn status(&self) -> TransactionStatus {
        self.inner.lock().status
    }

    /// Close the ledger after a successful run
    pub fn commit(&self) {
        self.close(TransactionStatus::Committed);
    }

    /// Close the ledger after its entries were unwound
    pub fn mark_rolled_back(&self) {
        self.close(TransactionStatus::RolledBack);
    }

    pub fn snapshot(&self) -> BulkTransaction {
        self.inner.lock().clone()
    }

    fn close(&self, status: TransactionStatus) {
        let mut txn = self.inner.lock();
        if txn.status == TransactionStatus::Active {
            txn.status = status;
            txn.closed_at = Some(Utc::now());
        }
    }
}
