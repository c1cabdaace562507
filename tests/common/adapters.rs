//! Failure-injecting resource adapter
//!
//! Wraps the real inventory adapter. Failures are scripted per key: the
//! record's `name` for create and upsert, the resource id for update and
//! delete.

use async_trait::async_trait;
use netinv_bulk::{
    AdapterError, AppliedMutation, BulkRecord, InventoryAdapter, InventoryStore, OperationType,
    ResourceAdapter, ResourceKind, TransactionOperation, ValidationResult,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
struct FailurePlan {
    remaining: u32,
    retryable: bool,
}

/// Inventory adapter with scripted failures, delays and a call log
#[derive(Clone)]
pub struct ScriptedAdapter {
    inner: InventoryAdapter,
    failures: Arc<Mutex<HashMap<String, FailurePlan>>>,
    undo_failures: Arc<Mutex<HashSet<String>>>,
    delay: Duration,
    key_delays: Arc<Mutex<HashMap<String, Duration>>>,
    calls: Arc<Mutex<Vec<String>>>,
    undone: Arc<Mutex<Vec<usize>>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl ScriptedAdapter {
    pub fn new(store: Arc<InventoryStore>, kind: ResourceKind) -> Self {
        Self {
            inner: InventoryAdapter::new(store, kind),
            failures: Arc::new(Mutex::new(HashMap::new())),
            undo_failures: Arc::new(Mutex::new(HashSet::new())),
            delay: Duration::ZERO,
            key_delays: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            undone: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn vpc(store: Arc<InventoryStore>) -> Self {
        Self::new(store, ResourceKind::Vpc)
    }

    /// Sleep this long inside every mutation
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sleep this long inside mutations of `key`, overriding the uniform delay
    pub fn delay_key(self, key: &str, delay: Duration) -> Self {
        self.key_delays.lock().insert(key.to_string(), delay);
        self
    }

    /// Fail `key` terminally on every attempt
    pub fn fail_terminal(self, key: &str) -> Self {
        self.script(key, u32::MAX, false)
    }

    /// Fail `key` with a retryable error `times` times, then succeed
    pub fn fail_retryable(self, key: &str, times: u32) -> Self {
        self.script(key, times, true)
    }

    /// Make undo of `resource_id` fail
    pub fn fail_undo(self, resource_id: &str) -> Self {
        self.undo_failures.lock().insert(resource_id.to_string());
        self
    }

    fn script(self, key: &str, times: u32, retryable: bool) -> Self {
        self.failures.lock().insert(
            key.to_string(),
            FailurePlan {
                remaining: times,
                retryable,
            },
        );
        self
    }

    /// Keys of every mutation attempt, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn attempts(&self, key: &str) -> usize {
        self.calls.lock().iter().filter(|k| *k == key).count()
    }

    /// Ledger sequences passed to `undo`, in call order
    pub fn undone(&self) -> Vec<usize> {
        self.undone.lock().clone()
    }

    /// Highest number of mutations observed running at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn gate(&self, key: &str) -> Result<(), AdapterError> {
        self.calls.lock().push(key.to_string());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = self.key_delays.lock().get(key).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut failures = self.failures.lock();
        match failures.get_mut(key) {
            Some(plan) if plan.remaining > 0 => {
                plan.remaining -= 1;
                Err(if plan.retryable {
                    AdapterError::retryable(format!("{} is throttled", key)).with_code("THROTTLED")
                } else {
                    AdapterError::terminal(format!("{} was rejected", key)).with_code("REJECTED")
                })
            }
            _ => Ok(()),
        }
    }
}

fn name_of(data: &Value) -> &str {
    data.get("name").and_then(Value::as_str).unwrap_or_default()
}

#[async_trait]
impl ResourceAdapter for ScriptedAdapter {
    fn resource_type(&self) -> &str {
        self.inner.resource_type()
    }

    async fn create(&self, data: &Value) -> Result<AppliedMutation, AdapterError> {
        self.gate(name_of(data)).await?;
        self.inner.create(data).await
    }

    async fn update(&self, id: &str, data: &Value) -> Result<AppliedMutation, AdapterError> {
        self.gate(id).await?;
        self.inner.update(id, data).await
    }

    async fn delete(&self, id: &str) -> Result<AppliedMutation, AdapterError> {
        self.gate(id).await?;
        self.inner.delete(id).await
    }

    async fn upsert(&self, id: Option<&str>, data: &Value) -> Result<AppliedMutation, AdapterError> {
        self.gate(name_of(data)).await?;
        self.inner.upsert(id, data).await
    }

    async fn undo(&self, operation: &TransactionOperation) -> Result<(), AdapterError> {
        self.undone.lock().push(operation.sequence);
        if self.undo_failures.lock().contains(&operation.resource_id) {
            return Err(AdapterError::terminal(format!(
                "undo of {} refused",
                operation.resource_id
            )));
        }
        self.inner.undo(operation).await
    }

    fn validate(&self, record: &BulkRecord, operation_type: OperationType) -> ValidationResult {
        self.inner.validate(record, operation_type)
    }
}
