//! # netinv-bulk
//!
//! Bulk operation engine for a cloud network inventory (VPCs, subnets,
//! gateways).
//!
//! ## Features
//!
//! - **Batched execution**: records are sliced into ordered batches and run
//!   through a bounded worker pool
//! - **Partial failure tolerance**: per-record retry with a fixed delay, and
//!   `continue_on_error` to decide whether one failure stops the operation
//! - **Rollback**: every applied mutation is recorded in a transaction ledger
//!   and can be undone newest first, fully or back to the last batch savepoint
//! - **Observable**: progress polling plus a typed event stream
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netinv_bulk::{
//!     BulkOperationConfig, BulkOperationEngine, BulkOperationRequest, BulkRecord,
//!     EngineConfig, InventoryAdapter, InventoryStore, OperationType, ResourceKind,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InventoryStore::new());
//!     let engine = BulkOperationEngine::new(EngineConfig::default());
//!     engine.register_adapter(Arc::new(InventoryAdapter::new(store, ResourceKind::Vpc)));
//!
//!     let config = BulkOperationConfig::new(OperationType::Create, "vpc")
//!         .with_batch_size(50)
//!         .with_rollback(true);
//!     let records = vec![BulkRecord::new(json!({
//!         "name": "core",
//!         "cidr_block": "10.0.0.0/16",
//!         "region": "eu-west-1",
//!     }))];
//!
//!     let id = engine.submit(BulkOperationRequest::new(config, records))?;
//!     let result = engine.await_result(&id).await?;
//!     println!("{} created", result.successful_records);
//!     Ok(())
//! }
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod config;
pub mod core;
pub mod storage;
pub mod utils;

// Re-export main types
pub use config::{BulkOperationConfig, Config, EngineConfig, LoggingConfig, RollbackPolicy};
pub use core::bulk::{
    BulkEvent, BulkOperationEngine, BulkOperationError, BulkOperationProgress,
    BulkOperationRequest, BulkOperationResult, BulkRecord, BulkTransaction, MutationKind,
    OperationPriority, OperationStatus, OperationType, RollbackInfo, TransactionOperation,
    TransactionStatus,
};
pub use core::traits::{
    AdapterError, AppliedMutation, RecordProcessor, RecordValidator, ResourceAdapter,
    ValidationResult,
};
pub use storage::{
    InventoryAdapter, InventoryStore, NormalizeNames, RegionAllowList, ResourceKind,
};
pub use utils::error::{BulkError, ErrorCode, Result};

// Version information
/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Name of the crate
pub const NAME: &str = env!("CARGO_PKG_NAME");
/// Description of the crate
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
