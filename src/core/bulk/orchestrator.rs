//! Bulk operation orchestrator
//!
//! Owns the capability registries and every submitted operation. `submit`
//! checks the request and returns at once; the operation then runs on its own
//! task through the state machine
//!
//! ```text
//! queued -> initializing -> processing -> completed | failed | cancelled
//!                           processing -> rolling_back -> rolled_back
//! ```

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Semaphore, broadcast, watch};
use tracing::{debug, info, warn};

use super::batcher::Batcher;
use super::events::{BulkEvent, EventBus};
use super::ledger::{BulkTransaction, TransactionLedger};
use super::progress::ProgressTracker;
use super::rollback::{RollbackCoordinator, RollbackInfo};
use super::scheduler::{AbortReason, AbortSignal, BatchScheduler};
use super::types::{
    BulkOperationError, BulkOperationProgress, BulkOperationRequest, BulkOperationResult,
    BulkRecord, ErrorSeverity, OperationStatus,
};
use super::validation::ValidationPipeline;
use crate::config::{BulkOperationConfig, EngineConfig, RollbackPolicy, Validate};
use crate::core::traits::adapter::ResourceAdapter;
use crate::core::traits::validator::{RecordProcessor, RecordValidator};
use crate::utils::error::{BulkError, ErrorCode, Result};

/// Bulk operation engine
///
/// Cheap to clone; clones share registries and operations.
#[derive(Clone)]
pub struct BulkOperationEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    adapters: DashMap<String, Arc<dyn ResourceAdapter>>,
    validators: DashMap<String, Arc<dyn RecordValidator>>,
    processors: DashMap<String, Arc<dyn RecordProcessor>>,
    operations: DashMap<String, Arc<OperationHandle>>,
    events: EventBus,
    /// Caps how many operations run at once
    admission: Arc<Semaphore>,
}

/// Capabilities resolved for one operation at submit time
struct Capabilities {
    adapter: Arc<dyn ResourceAdapter>,
    validators: Vec<Arc<dyn RecordValidator>>,
    processors: Vec<Arc<dyn RecordProcessor>>,
}

struct OperationHandle {
    id: String,
    config: Arc<BulkOperationConfig>,
    scheduled_for: Option<chrono::DateTime<Utc>>,
    tracker: Arc<ProgressTracker>,
    ledger: Arc<TransactionLedger>,
    abort: AbortSignal,
    result: watch::Sender<Option<Arc<BulkOperationResult>>>,
}

impl BulkOperationEngine {
    pub fn new(config: EngineConfig) -> Self {
        let events = EventBus::new(config.event_channel_capacity);
        let admission = Arc::new(Semaphore::new(config.max_active_operations.max(1)));

        Self {
            inner: Arc::new(EngineInner {
                config,
                adapters: DashMap::new(),
                validators: DashMap::new(),
                processors: DashMap::new(),
                operations: DashMap::new(),
                events,
                admission,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Register the adapter for its resource type, replacing any previous one
    pub fn register_adapter(&self, adapter: Arc<dyn ResourceAdapter>) {
        let resource_type = adapter.resource_type().to_string();
        debug!("Registering resource adapter for {}", resource_type);
        self.inner.adapters.insert(resource_type, adapter);
    }

    pub fn register_validator(&self, validator: Arc<dyn RecordValidator>) {
        debug!("Registering record validator {}", validator.name());
        self.inner
            .validators
            .insert(validator.name().to_string(), validator);
    }

    pub fn register_processor(&self, processor: Arc<dyn RecordProcessor>) {
        debug!("Registering record processor {}", processor.name());
        self.inner
            .processors
            .insert(processor.name().to_string(), processor);
    }

    /// Accept a request and start it in the background
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, request: BulkOperationRequest) -> Result<String> {
        if request.records.is_empty() {
            return Err(BulkError::empty_batch(format!(
                "Operation {} has no records",
                request.id
            )));
        }

        request.config.validate().map_err(BulkError::invalid_config)?;
        let capabilities = self.resolve(&request.config)?;

        let BulkOperationRequest {
            id,
            config,
            records,
            priority,
            scheduled_for,
            ..
        } = request;

        let handle = match self.inner.operations.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(BulkError::invalid_config(format!(
                    "Operation {} already exists",
                    id
                )));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let handle = Arc::new(OperationHandle {
                    id: id.clone(),
                    tracker: Arc::new(ProgressTracker::new(
                        id.clone(),
                        records.len(),
                        self.inner.config.rate_window(),
                        self.inner.config.progress_interval(),
                    )),
                    ledger: Arc::new(TransactionLedger::new(
                        id.clone(),
                        config.resource_type.clone(),
                    )),
                    config: Arc::new(config),
                    scheduled_for,
                    abort: AbortSignal::new(),
                    result: watch::channel(None).0,
                });
                slot.insert(Arc::clone(&handle));
                handle
            }
        };

        info!(
            "Queued bulk {} of {} {} record(s) as {}",
            handle.config.operation_type,
            records.len(),
            handle.config.resource_type,
            id
        );
        self.inner.events.publish(BulkEvent::Queued {
            operation_id: id.clone(),
            resource_type: handle.config.resource_type.clone(),
            operation_type: handle.config.operation_type,
            total_records: records.len(),
            priority,
        });

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.run_operation(handle, records, capabilities).await;
        });

        Ok(id)
    }

    pub fn get_progress(&self, operation_id: &str) -> Result<BulkOperationProgress> {
        Ok(self.handle(operation_id)?.tracker.snapshot())
    }

    /// Request cancellation; a no-op for terminal or already cancelled operations
    pub fn cancel(&self, operation_id: &str) -> Result<()> {
        let handle = self.handle(operation_id)?;
        if handle.tracker.status().is_terminal() {
            return Ok(());
        }

        if handle.abort.trigger(AbortReason::Cancelled) {
            info!("Cancellation requested for {}", operation_id);
        }
        Ok(())
    }

    /// Stop a running operation and undo what it applied
    pub fn rollback(&self, operation_id: &str) -> Result<()> {
        let handle = self.handle(operation_id)?;
        if !handle.config.enable_rollback {
            return Err(BulkError::invalid_state(format!(
                "Operation {} was submitted without rollback enabled",
                operation_id
            )));
        }

        let status = handle.tracker.status();
        if status.is_terminal() {
            return Err(BulkError::invalid_state(format!(
                "Operation {} is already {}",
                operation_id, status
            )));
        }

        if handle.abort.trigger(AbortReason::RollbackRequested) {
            info!("Rollback requested for {}", operation_id);
        }
        Ok(())
    }

    /// Wait for the operation to reach a terminal state
    pub async fn await_result(&self, operation_id: &str) -> Result<BulkOperationResult> {
        let handle = self.handle(operation_id)?;
        let mut receiver = handle.result.subscribe();
        let result = receiver
            .wait_for(Option::is_some)
            .await
            .map_err(|_| BulkError::internal("Operation result channel closed"))?
            .clone();

        result
            .map(|result| result.as_ref().clone())
            .ok_or_else(|| BulkError::internal("Operation finished without a result"))
    }

    /// Final result, if the operation has finished
    pub fn result(&self, operation_id: &str) -> Result<Option<BulkOperationResult>> {
        let handle = self.handle(operation_id)?;
        let result = handle.result.borrow().clone();
        Ok(result.map(|result| result.as_ref().clone()))
    }

    /// Snapshot of the operation's transaction ledger
    pub fn transaction(&self, operation_id: &str) -> Result<BulkTransaction> {
        Ok(self.handle(operation_id)?.ledger.snapshot())
    }

    /// Progress of every known operation, oldest first
    pub fn list_operations(&self) -> Vec<BulkOperationProgress> {
        let mut operations: Vec<_> = self
            .inner
            .operations
            .iter()
            .map(|entry| entry.value().tracker.snapshot())
            .collect();
        operations.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.operation_id.cmp(&b.operation_id))
        });
        operations
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BulkEvent> {
        self.inner.events.subscribe()
    }

    /// Forget a finished operation
    pub fn remove(&self, operation_id: &str) -> Result<BulkOperationResult> {
        let handle = self.handle(operation_id)?;
        let Some(result) = handle.result.borrow().clone() else {
            return Err(BulkError::invalid_state(format!(
                "Operation {} is still {}",
                operation_id,
                handle.tracker.status()
            )));
        };

        self.inner.operations.remove(operation_id);
        Ok(result.as_ref().clone())
    }

    fn handle(&self, operation_id: &str) -> Result<Arc<OperationHandle>> {
        self.inner
            .operations
            .get(operation_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| BulkError::not_found(format!("Operation {}", operation_id)))
    }

    fn resolve(&self, config: &BulkOperationConfig) -> Result<Capabilities> {
        let adapter = self
            .inner
            .adapters
            .get(&config.resource_type)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                BulkError::invalid_config(format!(
                    "No resource adapter registered for {}",
                    config.resource_type
                ))
            })?;

        if !adapter.supports(config.operation_type) {
            return Err(BulkError::invalid_config(format!(
                "Resource type {} does not support {}",
                config.resource_type, config.operation_type
            )));
        }

        let validators = config
            .custom_validators
            .iter()
            .map(|name| {
                self.inner
                    .validators
                    .get(name)
                    .map(|entry| Arc::clone(entry.value()))
                    .ok_or_else(|| {
                        BulkError::invalid_config(format!("Unknown validator {}", name))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let processors = config
            .processors
            .iter()
            .map(|name| {
                self.inner
                    .processors
                    .get(name)
                    .map(|entry| Arc::clone(entry.value()))
                    .ok_or_else(|| {
                        BulkError::invalid_config(format!("Unknown processor {}", name))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Capabilities {
            adapter,
            validators,
            processors,
        })
    }
}

impl EngineInner {
    async fn run_operation(
        &self,
        handle: Arc<OperationHandle>,
        records: Vec<BulkRecord>,
        capabilities: Capabilities,
    ) {
        if let Some(at) = handle.scheduled_for {
            // Negative durations mean the instant has already passed
            if let Ok(delay) = (at - Utc::now()).to_std() {
                debug!("Operation {} scheduled in {:?}", handle.id, delay);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = handle.abort.aborted() => {}
                }
            }
        }

        let permit = tokio::select! {
            permit = Arc::clone(&self.admission).acquire_owned() => permit.ok(),
            _ = handle.abort.aborted() => None,
        };
        if handle.abort.is_aborted() || permit.is_none() {
            self.finish_early(&handle);
            return;
        }

        self.advance(&handle, OperationStatus::Initializing);
        let deadline = tokio::time::Instant::now() + handle.config.timeout();

        let pipeline = Arc::new(ValidationPipeline::new(
            handle.config.operation_type,
            Arc::clone(&capabilities.adapter),
            capabilities.validators.clone(),
            capabilities.processors.clone(),
        ));

        let accepted = if handle.config.validate_before_process {
            self.prevalidate(&handle, &pipeline, records)
        } else {
            records.into_iter().enumerate().collect()
        };

        if tokio::time::Instant::now() >= deadline {
            handle
                .abort
                .trigger(AbortReason::Timeout(handle.config.timeout()));
        }
        if handle.abort.is_aborted() {
            self.finish_early(&handle);
            return;
        }

        let batches: Vec<_> = Batcher::new(accepted, handle.config.batch_size).collect();
        handle.tracker.set_total_batches(batches.len());
        self.advance(&handle, OperationStatus::Processing);
        self.events.publish(BulkEvent::Started {
            operation_id: handle.id.clone(),
            total_batches: batches.len(),
        });
        handle.tracker.mark_emitted();
        self.events
            .publish(BulkEvent::Progress(handle.tracker.snapshot()));

        let scheduler = Arc::new(BatchScheduler::new(
            handle.id.clone(),
            Arc::clone(&handle.config),
            Arc::clone(&capabilities.adapter),
            pipeline,
            Some(Arc::clone(&handle.ledger)),
            Arc::clone(&handle.tracker),
            self.events.clone(),
            handle.abort.clone(),
        ));

        let run = scheduler.run(batches);
        tokio::pin!(run);
        let timed = tokio::time::timeout_at(deadline, &mut run).await;
        let report = match timed {
            Ok(report) => report,
            Err(_) => {
                warn!(
                    "Operation {} timed out after {}ms, draining in-flight batches",
                    handle.id, handle.config.timeout_ms
                );
                handle
                    .abort
                    .trigger(AbortReason::Timeout(handle.config.timeout()));
                run.await
            }
        };
        debug!(
            "Operation {} dispatched {} batch(es), {} drained",
            handle.id, report.batches_dispatched, report.batches_completed
        );

        let skipped = handle.tracker.skip_unsettled();
        if skipped > 0 {
            debug!("Operation {} skipped {} unattempted record(s)", handle.id, skipped);
        }

        match handle.abort.reason() {
            None => {
                handle.ledger.commit();
                self.advance(&handle, OperationStatus::Completed);
                self.finish(&handle, None, None);
            }
            Some(reason) if handle.config.enable_rollback && !handle.ledger.is_empty() => {
                let info = self.roll_back(&handle, &capabilities, &reason).await;
                self.finish(&handle, Some(reason), Some(info));
            }
            Some(reason) => {
                handle.ledger.commit();
                let status = if reason.is_cancellation() {
                    OperationStatus::Cancelled
                } else {
                    OperationStatus::Failed
                };
                self.advance(&handle, status);
                self.finish(&handle, Some(reason), None);
            }
        }

        drop(permit);
    }

    /// Validate every record up front, skipping the invalid ones
    fn prevalidate(
        &self,
        handle: &OperationHandle,
        pipeline: &ValidationPipeline,
        records: Vec<BulkRecord>,
    ) -> Vec<(usize, BulkRecord)> {
        let mut accepted = Vec::with_capacity(records.len());
        for (record_index, record) in records.into_iter().enumerate() {
            let validation = pipeline.validate(&record);
            handle.tracker.add_warnings(record_index, validation.warnings);
            if validation.valid {
                accepted.push((record_index, record));
                continue;
            }

            handle.tracker.record_skipped(
                record_index,
                Some(BulkOperationError {
                    record_index,
                    record,
                    error: validation.errors.join("; "),
                    error_code: ErrorCode::ValidationFailed,
                    severity: ErrorSeverity::Warning,
                    retry_count: 0,
                    batch: None,
                    timestamp: Utc::now(),
                }),
            );
        }

        debug!(
            "Operation {}: {} record(s) passed validation",
            handle.id,
            accepted.len()
        );
        accepted
    }

    async fn roll_back(
        &self,
        handle: &OperationHandle,
        capabilities: &Capabilities,
        reason: &AbortReason,
    ) -> RollbackInfo {
        self.advance(handle, OperationStatus::RollingBack);

        let (operations, savepoint) = match handle.config.rollback_policy {
            RollbackPolicy::All => (handle.ledger.operations(), None),
            RollbackPolicy::ToLastSavepoint => match handle.ledger.last_savepoint() {
                Some(savepoint) => (
                    handle.ledger.operations_since(&savepoint),
                    Some(savepoint.name),
                ),
                None => (handle.ledger.operations(), None),
            },
        };

        self.events.publish(BulkEvent::RollbackStarted {
            operation_id: handle.id.clone(),
            operations: operations.len(),
            reason: reason.to_string(),
        });

        let info = RollbackCoordinator::new(Arc::clone(&capabilities.adapter))
            .rollback(&operations, reason.to_string(), savepoint)
            .await;

        handle.ledger.mark_rolled_back();
        self.advance(handle, OperationStatus::RolledBack);
        self.events.publish(BulkEvent::RollbackCompleted {
            operation_id: handle.id.clone(),
            info: info.clone(),
        });
        info
    }

    /// Resolve an operation aborted before processing started
    fn finish_early(&self, handle: &OperationHandle) {
        let reason = handle.abort.reason().unwrap_or(AbortReason::Cancelled);
        let status = if !reason.is_cancellation()
            && handle.tracker.status() == OperationStatus::Initializing
        {
            OperationStatus::Failed
        } else {
            OperationStatus::Cancelled
        };

        debug!("Operation {} stopped before processing: {}", handle.id, reason);
        handle.tracker.skip_unsettled();
        handle.ledger.commit();
        self.advance(handle, status);
        self.finish(handle, Some(reason), None);
    }

    /// Publish the result and the terminal event
    fn finish(
        &self,
        handle: &OperationHandle,
        reason: Option<AbortReason>,
        rollback: Option<RollbackInfo>,
    ) {
        let result = Arc::new(handle.tracker.build_result(
            &handle.config.resource_type,
            handle.config.operation_type,
            reason.as_ref().map(AbortReason::to_failure),
            rollback,
        ));

        info!(
            "Operation {} finished as {}: {} succeeded, {} failed, {} skipped",
            handle.id,
            result.status,
            result.successful_records,
            result.failed_records,
            result.skipped_records
        );

        handle.result.send_replace(Some(Arc::clone(&result)));

        let event = match reason {
            None => BulkEvent::Completed(Box::new(result.as_ref().clone())),
            Some(reason) if reason.is_cancellation() => BulkEvent::Cancelled {
                operation_id: handle.id.clone(),
            },
            Some(reason) => BulkEvent::Failed {
                operation_id: handle.id.clone(),
                failure: reason.to_failure(),
            },
        };
        self.events.publish(event);
    }

    fn advance(&self, handle: &OperationHandle, next: OperationStatus) {
        match handle.tracker.transition(next) {
            Ok(previous) => debug!("Operation {}: {} -> {}", handle.id, previous, next),
            Err(e) => warn!("{}", e),
        }
    }
}
