//! Record validation and processing capabilities
//!
//! Custom validators and processors are injected into the engine by name and
//! referenced from an operation's configuration.

use serde::{Deserialize, Serialize};

use crate::core::bulk::types::{BulkRecord, OperationType};

/// Outcome of validating one record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// A passing result
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// A failing result with one error
    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            errors: vec![error.into()],
            warnings: Vec::new(),
        }
    }

    /// Add an error, marking the result invalid
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.valid = false;
        self.errors.push(error.into());
        self
    }

    /// Add a non-blocking warning
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Fold another result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.valid = self.valid && other.valid && other.errors.is_empty();
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// A named validation rule run after the resource checks
pub trait RecordValidator: Send + Sync + 'static {
    /// Name referenced from `custom_validators`
    fn name(&self) -> &str;

    fn validate(&self, record: &BulkRecord, operation_type: OperationType) -> ValidationResult;
}

/// A named transformation applied to a record right before its mutation
pub trait RecordProcessor: Send + Sync + 'static {
    /// Name referenced from `processors`
    fn name(&self) -> &str;

    /// Return the record to submit, or a reason to reject it
    fn process(&self, record: BulkRecord, operation_type: OperationType)
    -> Result<BulkRecord, String>;
}
