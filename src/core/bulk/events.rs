//! Event surface of the bulk engine
//!
//! Typed status events broadcast to any number of subscribers. A subscriber
//! that falls behind by more than the channel capacity loses the oldest
//! events (`RecvError::Lagged`); progress can always be re-read with
//! `get_progress`.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::rollback::RollbackInfo;
use super::types::{
    BulkOperationProgress, BulkOperationResult, OperationFailure, OperationPriority, OperationType,
};

/// Events emitted over an operation's lifetime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BulkEvent {
    Queued {
        operation_id: String,
        resource_type: String,
        operation_type: OperationType,
        total_records: usize,
        priority: OperationPriority,
    },
    Started {
        operation_id: String,
        total_batches: usize,
    },
    Progress(BulkOperationProgress),
    BatchCompleted {
        operation_id: String,
        batch_index: usize,
        succeeded: usize,
        failed: usize,
        skipped: usize,
    },
    Completed(Box<BulkOperationResult>),
    Failed {
        operation_id: String,
        failure: OperationFailure,
    },
    Cancelled {
        operation_id: String,
    },
    RollbackStarted {
        operation_id: String,
        operations: usize,
        reason: String,
    },
    RollbackCompleted {
        operation_id: String,
        info: RollbackInfo,
    },
}

impl BulkEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            BulkEvent::Queued { .. } => "operation:queued",
            BulkEvent::Started { .. } => "operation:started",
            BulkEvent::Progress(_) => "operation:progress",
            BulkEvent::BatchCompleted { .. } => "operation:batch_completed",
            BulkEvent::Completed(_) => "operation:completed",
            BulkEvent::Failed { .. } => "operation:failed",
            BulkEvent::Cancelled { .. } => "operation:cancelled",
            BulkEvent::RollbackStarted { .. } => "rollback:started",
            BulkEvent::RollbackCompleted { .. } => "rollback:completed",
        }
    }

    pub fn operation_id(&self) -> &str {
        match self {
            BulkEvent::Queued { operation_id, .. }
            | BulkEvent::Started { operation_id, .. }
            | BulkEvent::BatchCompleted { operation_id, .. }
            | BulkEvent::Failed { operation_id, .. }
            | BulkEvent::Cancelled { operation_id }
            | BulkEvent::RollbackStarted { operation_id, .. }
            | BulkEvent::RollbackCompleted { operation_id, .. } => operation_id,
            BulkEvent::Progress(progress) => &progress.operation_id,
            BulkEvent::Completed(result) => &result.operation_id,
        }
    }

    /// Whether this event ends an operation's stream
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BulkEvent::Completed(_) | BulkEvent::Failed { .. } | BulkEvent::Cancelled { .. }
        )
    }
}

/// Broadcast hub shared by the engine and its operations
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BulkEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event; having no subscribers is not an error
    pub fn publish(&self, event: BulkEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<BulkEvent> {
        self.sender.subscribe()
    }
}
