//! Concurrency scheduler
//!
//! A fixed-size worker pool over batches. Up to `max_concurrent` batches run
//! at once on a `JoinSet`; records inside a batch run one after another with
//! per-record retry. Any abort stops dispatching new batches. A terminal record
//! failure or a timeout lets the other running batches finish; a cancellation
//! also stops them between records. Mutations already handed to the adapter
//! always finish.

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::batcher::Batch;
use super::events::{BulkEvent, EventBus};
use super::ledger::TransactionLedger;
use super::progress::ProgressTracker;
use super::types::{BulkOperationError, BulkRecord, ErrorSeverity, OperationFailure, OperationType};
use super::validation::ValidationPipeline;
use crate::config::BulkOperationConfig;
use crate::core::traits::adapter::{AdapterError, AppliedMutation, ResourceAdapter};
use crate::utils::error::ErrorCode;

/// Why an operation stopped early
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// A record failed terminally with `continue_on_error = false`
    RecordFailed {
        record_index: usize,
        code: ErrorCode,
        message: String,
    },
    /// The operation ran past its timeout
    Timeout(Duration),
    /// A caller cancelled the operation
    Cancelled,
    /// A caller asked for the applied mutations to be rolled back
    RollbackRequested,
    /// A worker task died
    WorkerPanicked(String),
}

impl AbortReason {
    pub fn code(&self) -> ErrorCode {
        match self {
            AbortReason::RecordFailed { code, .. } => *code,
            AbortReason::Timeout(_) => ErrorCode::OperationTimeout,
            AbortReason::Cancelled | AbortReason::RollbackRequested => ErrorCode::Cancelled,
            AbortReason::WorkerPanicked(_) => ErrorCode::InternalError,
        }
    }

    /// Whether the abort came from the caller rather than a failure
    pub fn is_cancellation(&self) -> bool {
        matches!(self, AbortReason::Cancelled | AbortReason::RollbackRequested)
    }

    pub fn to_failure(&self) -> OperationFailure {
        OperationFailure {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::RecordFailed {
                record_index,
                message,
                ..
            } => write!(f, "record {} failed: {}", record_index, message),
            AbortReason::Timeout(timeout) => {
                write!(f, "operation exceeded timeout of {}ms", timeout.as_millis())
            }
            AbortReason::Cancelled => write!(f, "operation cancelled"),
            AbortReason::RollbackRequested => write!(f, "rollback requested"),
            AbortReason::WorkerPanicked(message) => write!(f, "worker panicked: {}", message),
        }
    }
}

/// Shared stop flag plus the first reason that raised it
///
/// `token` stops dispatch for every reason; `halt` also stops running batches
/// and is only raised for cancellations.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    token: CancellationToken,
    halt: CancellationToken,
    reason: Arc<Mutex<Option<AbortReason>>>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal; returns false if it was already raised
    pub fn trigger(&self, reason: AbortReason) -> bool {
        let halts = reason.is_cancellation();
        let mut slot = self.reason.lock();
        if slot.is_some() {
            // A cancellation during a drain still stops the running batches
            if halts {
                self.halt.cancel();
            }
            return false;
        }
        *slot = Some(reason);
        drop(slot);
        self.token.cancel();
        if halts {
            self.halt.cancel();
        }
        true
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether running batches must stop between records
    pub fn is_halted(&self) -> bool {
        self.halt.is_cancelled()
    }

    pub fn reason(&self) -> Option<AbortReason> {
        self.reason.lock().clone()
    }

    /// Resolves once the signal is raised
    pub async fn aborted(&self) {
        self.token.cancelled().await
    }

    /// Resolves once running batches must stop
    pub async fn halted(&self) {
        self.halt.cancelled().await
    }
}

/// Per-batch tally
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub index: usize,
    pub size: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Stopped before reaching the end of the batch
    pub interrupted: bool,
}

/// Dispatch statistics of one scheduler run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub batches_dispatched: usize,
    pub batches_completed: usize,
}

enum RecordOutcome {
    Succeeded,
    Failed,
    Skipped,
}

/// Drives the batches of one operation through the resource adapter
pub struct BatchScheduler {
    operation_id: String,
    config: Arc<BulkOperationConfig>,
    adapter: Arc<dyn ResourceAdapter>,
    pipeline: Arc<ValidationPipeline>,
    ledger: Option<Arc<TransactionLedger>>,
    tracker: Arc<ProgressTracker>,
    events: EventBus,
    abort: AbortSignal,
}

impl BatchScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        operation_id: impl Into<String>,
        config: Arc<BulkOperationConfig>,
        adapter: Arc<dyn ResourceAdapter>,
        pipeline: Arc<ValidationPipeline>,
        ledger: Option<Arc<TransactionLedger>>,
        tracker: Arc<ProgressTracker>,
        events: EventBus,
        abort: AbortSignal,
    ) -> Self {
        Self {
            operation_id: operation_id.into(),
            config,
            adapter,
            pipeline,
            ledger,
            tracker,
            events,
            abort,
        }
    }

    /// Run all batches, returning once every dispatched batch has drained
    pub async fn run(self: Arc<Self>, batches: Vec<Batch>) -> SchedulerReport {
        let max_concurrent = self.config.max_concurrent.max(1);
        let mut join_set: JoinSet<BatchOutcome> = JoinSet::new();
        let mut pending = batches.into_iter();
        let mut report = SchedulerReport::default();

        loop {
            // Fill free worker slots unless the operation is stopping
            while join_set.len() < max_concurrent && !self.abort.is_aborted() {
                let Some(batch) = pending.next() else {
                    break;
                };
                report.batches_dispatched += 1;
                self.tracker.batch_started(batch.index);

                let scheduler = Arc::clone(&self);
                join_set.spawn(async move { scheduler.process_batch(batch).await });
            }

            match join_set.join_next().await {
                Some(Ok(outcome)) => {
                    report.batches_completed += 1;
                    self.on_batch_completed(outcome);
                }
                Some(Err(e)) => {
                    warn!("Batch worker of {} failed: {}", self.operation_id, e);
                    self.abort
                        .trigger(AbortReason::WorkerPanicked(e.to_string()));
                }
                None => break,
            }
        }

        report
    }

    async fn process_batch(&self, batch: Batch) -> BatchOutcome {
        let mut outcome = BatchOutcome {
            index: batch.index,
            size: batch.len(),
            ..BatchOutcome::default()
        };
        debug!(
            "Operation {} processing batch {} ({} records)",
            self.operation_id,
            batch.index,
            batch.len()
        );

        let savepoint_name = batch.savepoint_name();
        for (record_index, record) in batch.records {
            if self.abort.is_halted() {
                outcome.interrupted = true;
                break;
            }

            match self.process_record(batch.index, record_index, record).await {
                RecordOutcome::Succeeded => outcome.succeeded += 1,
                RecordOutcome::Skipped => outcome.skipped += 1,
                RecordOutcome::Failed => {
                    outcome.failed += 1;
                    if !self.config.continue_on_error {
                        outcome.interrupted = true;
                        break;
                    }
                }
            }
        }

        if !outcome.interrupted && self.config.savepoint_per_batch {
            if let Some(ledger) = &self.ledger {
                ledger.create_savepoint(savepoint_name, batch.index);
            }
        }

        outcome
    }

    async fn process_record(
        &self,
        batch_index: usize,
        record_index: usize,
        record: BulkRecord,
    ) -> RecordOutcome {
        if !self.config.validate_before_process {
            let validation = self.pipeline.validate(&record);
            self.tracker.add_warnings(record_index, validation.warnings);
            if !validation.valid {
                let message = validation.errors.join("; ");
                let error = self.record_error(
                    batch_index,
                    record_index,
                    record,
                    message,
                    ErrorCode::ValidationFailed,
                    ErrorSeverity::Warning,
                    0,
                );
                self.tracker.record_skipped(record_index, Some(error));
                self.maybe_emit_progress();
                return RecordOutcome::Skipped;
            }
        }

        let record = match self.pipeline.process(record.clone()) {
            Ok(processed) => processed,
            Err(message) => {
                return self.settle_failure(
                    batch_index,
                    record_index,
                    record,
                    message,
                    ErrorCode::ValidationFailed,
                    0,
                );
            }
        };

        let mut retry_count = 0u32;
        let last_error = loop {
            match self.apply(&record).await {
                Ok(mutation) => {
                    // Ledger entry first: an applied mutation must never lack one
                    let kind = mutation.kind;
                    let resource_id = mutation.resource_id.clone();
                    if let Some(ledger) = &self.ledger {
                        ledger.append(batch_index, record_index, mutation);
                    }
                    self.tracker.record_success(record_index, kind, resource_id);
                    self.maybe_emit_progress();
                    return RecordOutcome::Succeeded;
                }
                Err(error) => {
                    if !error.retryable
                        || retry_count >= self.config.retry_attempts
                        || self.abort.is_halted()
                    {
                        break error;
                    }

                    retry_count += 1;
                    debug!(
                        "Record {} of {} failed ({}), retry {}/{}",
                        record_index,
                        self.operation_id,
                        error,
                        retry_count,
                        self.config.retry_attempts
                    );
                    if !self.wait_retry_delay().await {
                        break error;
                    }
                }
            }
        };

        self.settle_failure(
            batch_index,
            record_index,
            record,
            last_error.to_string(),
            ErrorCode::ResourceAdapterError,
            retry_count,
        )
    }

    async fn apply(&self, record: &BulkRecord) -> Result<AppliedMutation, AdapterError> {
        let id = || {
            record
                .id
                .as_deref()
                .ok_or_else(|| AdapterError::terminal("record has no resource id"))
        };

        match self.config.operation_type {
            OperationType::Create => self.adapter.create(&record.data).await,
            OperationType::Update => self.adapter.update(id()?, &record.data).await,
            OperationType::Delete => self.adapter.delete(id()?).await,
            OperationType::Upsert => {
                self.adapter
                    .upsert(record.id.as_deref(), &record.data)
                    .await
            }
        }
    }

    /// Sleep for the retry delay; false if the operation was cancelled meanwhile
    async fn wait_retry_delay(&self) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.config.retry_delay()) => true,
            _ = self.abort.halted() => false,
        }
    }

    fn settle_failure(
        &self,
        batch_index: usize,
        record_index: usize,
        record: BulkRecord,
        message: String,
        code: ErrorCode,
        retry_count: u32,
    ) -> RecordOutcome {
        let halts = !self.config.continue_on_error;
        let severity = if halts {
            ErrorSeverity::Critical
        } else {
            ErrorSeverity::Error
        };
        let error = self.record_error(
            batch_index,
            record_index,
            record,
            message.clone(),
            code,
            severity,
            retry_count,
        );
        self.tracker.record_failure(error);

        if halts
            && self.abort.trigger(AbortReason::RecordFailed {
                record_index,
                code,
                message,
            })
        {
            warn!(
                "Operation {} aborting: record {} failed terminally",
                self.operation_id, record_index
            );
        }

        self.maybe_emit_progress();
        RecordOutcome::Failed
    }

    #[allow(clippy::too_many_arguments)]
    fn record_error(
        &self,
        batch_index: usize,
        record_index: usize,
        record: BulkRecord,
        error: String,
        error_code: ErrorCode,
        severity: ErrorSeverity,
        retry_count: u32,
    ) -> BulkOperationError {
        BulkOperationError {
            record_index,
            record,
            error,
            error_code,
            severity,
            retry_count,
            batch: Some(batch_index),
            timestamp: Utc::now(),
        }
    }

    fn on_batch_completed(&self, outcome: BatchOutcome) {
        self.tracker.batch_completed();
        debug!(
            "Operation {} batch {} done: {} ok, {} failed, {} skipped",
            self.operation_id, outcome.index, outcome.succeeded, outcome.failed, outcome.skipped
        );

        let not_attempted =
            outcome.size - (outcome.succeeded + outcome.failed + outcome.skipped);
        self.events.publish(BulkEvent::BatchCompleted {
            operation_id: self.operation_id.clone(),
            batch_index: outcome.index,
            succeeded: outcome.succeeded,
            failed: outcome.failed,
            skipped: outcome.skipped + not_attempted,
        });
        self.tracker.mark_emitted();
        self.events
            .publish(BulkEvent::Progress(self.tracker.snapshot()));
    }

    fn maybe_emit_progress(&self) {
        if self.tracker.should_emit() {
            self.events
                .publish(BulkEvent::Progress(self.tracker.snapshot()));
        }
    }
}
