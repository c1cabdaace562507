//! Bulk operation engine
//!
//! Executes large create/update/delete/upsert requests against a resource
//! adapter with bounded concurrency, per-record retry, partial-failure
//! tolerance and optional rollback of everything already applied.

pub mod batcher;
pub mod events;
pub mod ledger;
pub mod orchestrator;
pub mod progress;
pub mod rollback;
pub mod scheduler;
pub mod types;
pub mod validation;


// Re-export all public types
pub use batcher::{Batch, Batcher, batch_count, split_into_batches};
pub use events::{BulkEvent, EventBus};
pub use ledger::{BulkTransaction, Savepoint, TransactionLedger, TransactionOperation, TransactionStatus};
pub use orchestrator::BulkOperationEngine;
pub use progress::ProgressTracker;
pub use rollback::{RollbackCoordinator, RollbackInfo, RollbackOperation};
pub use scheduler::{AbortReason, AbortSignal, BatchScheduler};
pub use types::{
    BulkOperationError, BulkOperationProgress, BulkOperationRequest, BulkOperationResult,
    BulkOperationWarning, BulkRecord, ErrorSeverity, MutationKind, OperationFailure,
    OperationPriority, OperationStatus, OperationType, ResourceRef,
};
pub use validation::ValidationPipeline;
