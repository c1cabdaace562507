//! Shared data types of the bulk operation engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::BulkOperationConfig;
use crate::utils::error::ErrorCode;

use super::rollback::RollbackInfo;

/// Mutation requested for every record of an operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    #[default]
    Create,
    Update,
    Delete,
    Upsert,
}

impl OperationType {
    /// Whether records must carry an existing resource id
    pub fn requires_id(&self) -> bool {
        matches!(self, OperationType::Update | OperationType::Delete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Create => "create",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
            OperationType::Upsert => "upsert",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "create" => Ok(OperationType::Create),
            "update" => Ok(OperationType::Update),
            "delete" => Ok(OperationType::Delete),
            "upsert" => Ok(OperationType::Upsert),
            other => Err(format!("Unknown operation type: {}", other)),
        }
    }
}

/// Mutation actually applied to a single resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl MutationKind {
    /// The mutation that reverses this one
    pub fn inverse(&self) -> MutationKind {
        match self {
            MutationKind::Create => MutationKind::Delete,
            MutationKind::Update => MutationKind::Update,
            MutationKind::Delete => MutationKind::Create,
        }
    }
}

/// One input record
///
/// `data` is an arbitrary JSON document; only the resource adapter and the
/// injected validators look inside it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkRecord {
    /// Existing resource id, required for update and delete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Record payload
    #[serde(default)]
    pub data: Value,
}

impl BulkRecord {
    /// A record without an id (create, upsert)
    pub fn new(data: Value) -> Self {
        Self { id: None, data }
    }

    /// A record addressing an existing resource
    pub fn with_id(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: Some(id.into()),
            data,
        }
    }
}

/// Submission priority, carried for ordering by callers and logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// One unit of bulk work
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOperationRequest {
    /// Unique operation id
    pub id: String,
    /// Policy for this run
    pub config: BulkOperationConfig,
    /// Ordered input records
    pub records: Vec<BulkRecord>,
    #[serde(default)]
    pub priority: OperationPriority,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Do not start before this instant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl BulkOperationRequest {
    /// Create a request with a fresh id
    pub fn new(config: BulkOperationConfig, records: Vec<BulkRecord>) -> Self {
        Self {
            id: format!("bulk_{}", uuid::Uuid::new_v4().simple()),
            config,
            records,
            priority: OperationPriority::default(),
            created_at: Utc::now(),
            scheduled_for: None,
        }
    }

    /// Use a caller supplied id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: OperationPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Delay the start of processing
    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }
}

/// Lifecycle of an operation
///
/// ```text
/// queued -> initializing -> processing -> completed | failed | cancelled
///                           processing -> rolling_back -> rolled_back
/// queued | initializing -> cancelled,   initializing -> failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Queued,
    Initializing,
    Processing,
    Completed,
    Failed,
    Cancelled,
    RollingBack,
    RolledBack,
}

impl OperationStatus {
    /// No further transitions occur from a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Completed
                | OperationStatus::Failed
                | OperationStatus::Cancelled
                | OperationStatus::RolledBack
        )
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: OperationStatus) -> bool {
        use OperationStatus::*;

        matches!(
            (self, next),
            (Queued, Initializing)
                | (Queued, Cancelled)
                | (Initializing, Processing)
                | (Initializing, Failed)
                | (Initializing, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
                | (Processing, RollingBack)
                | (RollingBack, RolledBack)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Queued => "queued",
            OperationStatus::Initializing => "initializing",
            OperationStatus::Processing => "processing",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
            OperationStatus::Cancelled => "cancelled",
            OperationStatus::RollingBack => "rolling_back",
            OperationStatus::RolledBack => "rolled_back",
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a record-level error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Record skipped, operation unaffected
    Warning,
    /// Record failed
    Error,
    /// Record failed and halted the operation
    Critical,
}

/// One record-level failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOperationError {
    /// Position of the record in the request
    pub record_index: usize,
    pub record: BulkRecord,
    pub error: String,
    pub error_code: ErrorCode,
    pub severity: ErrorSeverity,
    /// Retries performed before giving up
    pub retry_count: u32,
    /// Batch the record belonged to, if it was batched
    pub batch: Option<usize>,
    pub timestamp: DateTime<Utc>,
}

/// Non-blocking validation finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOperationWarning {
    pub record_index: usize,
    pub message: String,
}

/// Reference to a resource touched by the operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub resource_id: String,
    pub record_index: usize,
}

/// Why an operation stopped early
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationFailure {
    pub code: ErrorCode,
    pub message: String,
}

/// Live status snapshot of one operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOperationProgress {
    pub operation_id: String,
    pub status: OperationStatus,
    pub total_records: usize,
    /// successful + failed + skipped
    pub processed_records: usize,
    pub successful_records: usize,
    pub failed_records: usize,
    pub skipped_records: usize,
    /// Highest batch number dispatched so far (1-based)
    pub current_batch: usize,
    pub completed_batches: usize,
    pub total_batches: usize,
    /// Percentage in 0..=100
    pub progress: f64,
    pub started_at: Option<DateTime<Utc>>,
    /// Milliseconds since processing started
    pub elapsed_time: u64,
    /// Records per second
    pub processing_rate: f64,
    /// Milliseconds, unknown while the rate is zero
    pub estimated_time_remaining: Option<u64>,
    pub errors: Vec<BulkOperationError>,
    pub warnings: Vec<BulkOperationWarning>,
}

/// Final report of one operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOperationResult {
    pub operation_id: String,
    pub resource_type: String,
    pub operation_type: OperationType,
    pub status: OperationStatus,
    /// Completed with no record errors
    pub success: bool,
    pub total_records: usize,
    pub processed_records: usize,
    pub successful_records: usize,
    pub failed_records: usize,
    pub skipped_records: usize,
    /// Milliseconds from start of processing to terminal state
    pub duration: u64,
    /// Records per second over the whole run
    pub throughput: f64,
    pub errors: Vec<BulkOperationError>,
    pub warnings: Vec<BulkOperationWarning>,
    pub created_resources: Vec<ResourceRef>,
    pub updated_resources: Vec<ResourceRef>,
    pub deleted_resources: Vec<ResourceRef>,
    /// Error that stopped the operation early
    pub failure: Option<OperationFailure>,
    pub rollback: Option<RollbackInfo>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: DateTime<Utc>,
}
