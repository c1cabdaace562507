//! Test fixtures and data factories
//!
//! All factories create real objects backed by the in-memory inventory.

use netinv_bulk::{
    BulkEvent, BulkOperationConfig, BulkOperationEngine, BulkOperationRequest,
    BulkOperationResult, BulkRecord, EngineConfig, InventoryStore, OperationType, ResourceAdapter,
    ResourceKind,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

pub fn store() -> Arc<InventoryStore> {
    Arc::new(InventoryStore::new())
}

/// Valid VPC payloads named `vpc0`, `vpc1`, ...
pub fn vpc_records(n: usize) -> Vec<BulkRecord> {
    (0..n)
        .map(|i| {
            BulkRecord::new(json!({
                "name": format!("vpc{}", i),
                "cidr_block": format!("10.{}.0.0/16", i % 256),
                "region": "eu-west-1",
            }))
        })
        .collect()
}

/// Store holding `n` VPCs with ids `vpc-seed-0`, `vpc-seed-1`, ...
pub fn seeded_store(n: usize) -> Arc<InventoryStore> {
    let store = store();
    for i in 0..n {
        let id = format!("vpc-seed-{}", i);
        store.insert(
            ResourceKind::Vpc,
            id.clone(),
            json!({
                "id": id,
                "name": format!("seed{}", i),
                "cidr_block": format!("172.16.{}.0/24", i),
                "region": "us-east-1",
            }),
        );
    }
    store
}

pub fn engine_with(adapter: impl ResourceAdapter) -> BulkOperationEngine {
    let engine = BulkOperationEngine::new(EngineConfig::default());
    engine.register_adapter(Arc::new(adapter));
    engine
}

/// Create policy with a short retry delay
pub fn create_policy() -> BulkOperationConfig {
    policy(OperationType::Create)
}

pub fn policy(operation_type: OperationType) -> BulkOperationConfig {
    BulkOperationConfig::new(operation_type, "vpc").with_retry_delay(Duration::from_millis(2))
}

pub async fn run_to_end(
    engine: &BulkOperationEngine,
    config: BulkOperationConfig,
    records: Vec<BulkRecord>,
) -> BulkOperationResult {
    let id = engine
        .submit(BulkOperationRequest::new(config, records))
        .expect("submit failed");
    finish(engine, &id).await
}

pub async fn finish(engine: &BulkOperationEngine, id: &str) -> BulkOperationResult {
    tokio::time::timeout(Duration::from_secs(10), engine.await_result(id))
        .await
        .expect("operation did not reach a terminal state")
        .expect("operation result unavailable")
}

/// Poll until the operation has `count` successful records
pub async fn wait_for_successes(engine: &BulkOperationEngine, id: &str, count: usize) {
    for _ in 0..1000 {
        let progress = engine.get_progress(id).expect("unknown operation");
        if progress.successful_records >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("operation {} never reached {} successes", id, count);
}

/// Drain events already published for `id`
pub fn drain_events(events: &mut broadcast::Receiver<BulkEvent>, id: &str) -> Vec<BulkEvent> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        if event.operation_id() == id {
            collected.push(event);
        }
    }
    collected
}
