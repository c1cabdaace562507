//! Progress tracker
//!
//! Single source of truth for an operation's status and counters. Every
//! record outcome is folded in under one mutex, so
//! `processed = successful + failed + skipped` holds in every snapshot, and
//! each record is settled at most once.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::rollback::RollbackInfo;
use super::types::{
    BulkOperationError, BulkOperationProgress, BulkOperationResult, BulkOperationWarning,
    MutationKind, OperationFailure, OperationStatus, OperationType, ResourceRef,
};
use crate::utils::error::{BulkError, Result};

#[derive(Debug)]
struct TrackerState {
    status: OperationStatus,
    settled: Vec<bool>,
    successful: usize,
    failed: usize,
    skipped: usize,
    current_batch: usize,
    completed_batches: usize,
    total_batches: usize,
    started_at: Option<DateTime<Utc>>,
    started: Option<Instant>,
    finished: Option<Instant>,
    /// Completion instants inside the rate window
    recent: VecDeque<Instant>,
    errors: Vec<BulkOperationError>,
    warnings: Vec<BulkOperationWarning>,
    created: Vec<ResourceRef>,
    updated: Vec<ResourceRef>,
    deleted: Vec<ResourceRef>,
    last_emit: Option<Instant>,
}

impl TrackerState {
    fn processed(&self) -> usize {
        self.successful + self.failed + self.skipped
    }

    /// Mark the record settled; false if it already was
    fn settle(&mut self, record_index: usize, now: Instant) -> bool {
        match self.settled.get_mut(record_index) {
            Some(slot) if !*slot => {
                *slot = true;
                self.recent.push_back(now);
                true
            }
            _ => false,
        }
    }

    fn elapsed(&self, now: Instant) -> Duration {
        match (self.started, self.finished) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => now.duration_since(start),
            _ => Duration::ZERO,
        }
    }
}

/// Aggregates record outcomes for one operation
#[derive(Debug)]
pub struct ProgressTracker {
    operation_id: String,
    total_records: usize,
    rate_window: Duration,
    progress_interval: Duration,
    state: Mutex<TrackerState>,
}

impl ProgressTracker {
    pub fn new(
        operation_id: impl Into<String>,
        total_records: usize,
        rate_window: Duration,
        progress_interval: Duration,
    ) -> Self {
        Self {
            operation_id: operation_id.into(),
            total_records,
            rate_window: rate_window.max(Duration::from_millis(1)),
            progress_interval,
            state: Mutex::new(TrackerState {
                status: OperationStatus::Queued,
                settled: vec![false; total_records],
                successful: 0,
                failed: 0,
                skipped: 0,
                current_batch: 0,
                completed_batches: 0,
                total_batches: 0,
                started_at: None,
                started: None,
                finished: None,
                recent: VecDeque::new(),
                errors: Vec::new(),
                warnings: Vec::new(),
                created: Vec::new(),
                updated: Vec::new(),
                deleted: Vec::new(),
                last_emit: None,
            }),
        }
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn status(&self) -> OperationStatus {
        self.state.lock().status
    }

    /// Move to `next`, enforcing the operation state machine
    pub fn transition(&self, next: OperationStatus) -> Result<OperationStatus> {
        let mut state = self.state.lock();
        let current = state.status;
        if !current.can_transition_to(next) {
            return Err(BulkError::invalid_state(format!(
                "Operation {} cannot move from {} to {}",
                self.operation_id, current, next
            )));
        }

        state.status = next;
        let now = Instant::now();
        if next == OperationStatus::Initializing {
            state.started = Some(now);
            state.started_at = Some(Utc::now());
        }
        if next.is_terminal() {
            if state.started.is_none() {
                state.started = Some(now);
            }
            state.finished = Some(now);
        }
        Ok(current)
    }

    pub fn set_total_batches(&self, total_batches: usize) {
        self.state.lock().total_batches = total_batches;
    }

    pub fn batch_started(&self, batch_index: usize) {
        let mut state = self.state.lock();
        state.current_batch = state.current_batch.max(batch_index + 1);
    }

    pub fn batch_completed(&self) {
        self.state.lock().completed_batches += 1;
    }

    pub fn record_success(&self, record_index: usize, kind: MutationKind, resource_id: String) {
        let mut state = self.state.lock();
        if !state.settle(record_index, Instant::now()) {
            return;
        }
        state.successful += 1;
        let reference = ResourceRef {
            resource_id,
            record_index,
        };
        match kind {
            MutationKind::Create => state.created.push(reference),
            MutationKind::Update => state.updated.push(reference),
            MutationKind::Delete => state.deleted.push(reference),
        }
    }

    pub fn record_failure(&self, error: BulkOperationError) {
        let mut state = self.state.lock();
        if !state.settle(error.record_index, Instant::now()) {
            return;
        }
        state.failed += 1;
        state.errors.push(error);
    }

    /// Skip a record, optionally explaining why
    pub fn record_skipped(&self, record_index: usize, error: Option<BulkOperationError>) {
        let mut state = self.state.lock();
        if !state.settle(record_index, Instant::now()) {
            return;
        }
        state.skipped += 1;
        if let Some(error) = error {
            state.errors.push(error);
        }
    }

    pub fn add_warnings(&self, record_index: usize, warnings: Vec<String>) {
        if warnings.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        state
            .warnings
            .extend(warnings.into_iter().map(|message| BulkOperationWarning {
                record_index,
                message,
            }));
    }

    /// Count every record without an outcome as skipped
    pub fn skip_unsettled(&self) -> usize {
        let mut state = self.state.lock();
        let now = Instant::now();
        let mut skipped = 0;
        for index in 0..state.settled.len() {
            if state.settle(index, now) {
                skipped += 1;
            }
        }
        state.skipped += skipped;
        skipped
    }

    /// Throttle for record-level progress events
    pub fn should_emit(&self) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();
        let due = state
            .last_emit
            .is_none_or(|last| now.duration_since(last) >= self.progress_interval);
        if due {
            state.last_emit = Some(now);
        }
        due
    }

    /// Reset the throttle after an unconditional emission
    pub fn mark_emitted(&self) {
        self.state.lock().last_emit = Some(Instant::now());
    }

    pub fn snapshot(&self) -> BulkOperationProgress {
        let mut state = self.state.lock();
        let now = Instant::now();
        let processed = state.processed();
        let elapsed = state.elapsed(now);
        let rate = self.processing_rate(&mut state, now);
        let remaining = self.total_records.saturating_sub(processed);

        BulkOperationProgress {
            operation_id: self.operation_id.clone(),
            status: state.status,
            total_records: self.total_records,
            processed_records: processed,
            successful_records: state.successful,
            failed_records: state.failed,
            skipped_records: state.skipped,
            current_batch: state.current_batch,
            completed_batches: state.completed_batches,
            total_batches: state.total_batches,
            progress: percentage(processed, self.total_records),
            started_at: state.started_at,
            elapsed_time: elapsed.as_millis() as u64,
            processing_rate: rate,
            estimated_time_remaining: (rate > 0.0)
                .then(|| (remaining as f64 / rate * 1000.0).round() as u64),
            errors: state.errors.clone(),
            warnings: state.warnings.clone(),
        }
    }

    /// Assemble the final report; call once the status is terminal
    pub fn build_result(
        &self,
        resource_type: &str,
        operation_type: OperationType,
        failure: Option<OperationFailure>,
        rollback: Option<RollbackInfo>,
    ) -> BulkOperationResult {
        let state = self.state.lock();
        let processed = state.processed();
        let duration = state.elapsed(Instant::now());
        let throughput = if duration.as_secs_f64() > 0.0 {
            processed as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        BulkOperationResult {
            operation_id: self.operation_id.clone(),
            resource_type: resource_type.to_string(),
            operation_type,
            status: state.status,
            success: state.status == OperationStatus::Completed && state.failed == 0,
            total_records: self.total_records,
            processed_records: processed,
            successful_records: state.successful,
            failed_records: state.failed,
            skipped_records: state.skipped,
            duration: duration.as_millis() as u64,
            throughput,
            errors: state.errors.clone(),
            warnings: state.warnings.clone(),
            created_resources: state.created.clone(),
            updated_resources: state.updated.clone(),
            deleted_resources: state.deleted.clone(),
            failure,
            rollback,
            started_at: state.started_at,
            completed_at: Utc::now(),
        }
    }

    /// Records per second over the rate window, or since start if shorter
    fn processing_rate(&self, state: &mut TrackerState, now: Instant) -> f64 {
        let elapsed = state.elapsed(now);
        if elapsed.is_zero() {
            return 0.0;
        }

        if state.finished.is_some() {
            return state.processed() as f64 / elapsed.as_secs_f64();
        }

        while let Some(oldest) = state.recent.front() {
            if now.duration_since(*oldest) > self.rate_window {
                state.recent.pop_front();
            } else {
                break;
            }
        }

        let span = elapsed.min(self.rate_window).as_secs_f64();
        state.recent.len() as f64 / span
    }
}

fn percentage(processed: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        processed as f64 / total as f64 * 100.0
    }
}
