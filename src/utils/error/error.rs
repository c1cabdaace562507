//! Error handling for the bulk operation engine
//!
//! This module defines the operation-level error type and the error code
//! taxonomy shared by record-level failures, results and events.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for the engine
pub type Result<T> = std::result::Result<T, BulkError>;

/// Stable error codes surfaced on errors, results and events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Configuration rejected at submission
    InvalidConfig,
    /// Request carried no records
    EmptyBatch,
    /// A record failed validation or processing
    ValidationFailed,
    /// The resource adapter reported a failure
    ResourceAdapterError,
    /// The operation exceeded its wall-clock budget
    OperationTimeout,
    /// The operation was cancelled
    Cancelled,
    /// One or more undo attempts failed
    RollbackFailed,
    /// Unknown operation id
    NotFound,
    /// Anything else
    InternalError,
}

impl ErrorCode {
    /// Wire representation of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::EmptyBatch => "EMPTY_BATCH",
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::ResourceAdapterError => "RESOURCE_ADAPTER_ERROR",
            ErrorCode::OperationTimeout => "OPERATION_TIMEOUT",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::RollbackFailed => "ROLLBACK_FAILED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum BulkError {
    /// Operation configuration or capability errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Submission without records
    #[error("Empty batch: {0}")]
    EmptyBatch(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request not valid in the operation's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Engine configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BulkError {
    /// Map the error onto the shared code taxonomy
    pub fn code(&self) -> ErrorCode {
        match self {
            BulkError::InvalidConfig(_) | BulkError::Config(_) => ErrorCode::InvalidConfig,
            BulkError::EmptyBatch(_) => ErrorCode::EmptyBatch,
            BulkError::NotFound(_) => ErrorCode::NotFound,
            BulkError::InvalidState(_) | BulkError::Internal(_) => ErrorCode::InternalError,
        }
    }
}

/// Helper functions for creating specific errors
impl BulkError {
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig(message.into())
    }

    pub fn empty_batch<S: Into<String>>(message: S) -> Self {
        Self::EmptyBatch(message.into())
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound(message.into())
    }

    pub fn invalid_state<S: Into<String>>(message: S) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }
}
