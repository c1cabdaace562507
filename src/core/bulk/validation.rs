//! Record validation pipeline
//!
//! Runs the structural id check, the adapter's resource checks and then the
//! configured custom validators in order. Processors run afterwards, right
//! before the mutation.

use std::sync::Arc;

use super::types::{BulkRecord, OperationType};
use crate::core::traits::adapter::ResourceAdapter;
use crate::core::traits::validator::{RecordProcessor, RecordValidator, ValidationResult};

/// Validators and processors resolved for one operation
pub struct ValidationPipeline {
    operation_type: OperationType,
    adapter: Arc<dyn ResourceAdapter>,
    validators: Vec<Arc<dyn RecordValidator>>,
    processors: Vec<Arc<dyn RecordProcessor>>,
}

impl ValidationPipeline {
    pub fn new(
        operation_type: OperationType,
        adapter: Arc<dyn ResourceAdapter>,
        validators: Vec<Arc<dyn RecordValidator>>,
        processors: Vec<Arc<dyn RecordProcessor>>,
    ) -> Self {
        Self {
            operation_type,
            adapter,
            validators,
            processors,
        }
    }

    pub fn validate(&self, record: &BulkRecord) -> ValidationResult {
        let mut result = ValidationResult::ok();

        if self.operation_type.requires_id() && record.id.as_deref().is_none_or(str::is_empty) {
            return ValidationResult::invalid(format!(
                "{} requires a resource id",
                self.operation_type
            ));
        }

        result.merge(self.adapter.validate(record, self.operation_type));
        for validator in &self.validators {
            let outcome = validator.validate(record, self.operation_type);
            result.merge(ValidationResult {
                valid: outcome.valid,
                errors: outcome
                    .errors
                    .into_iter()
                    .map(|e| format!("{}: {}", validator.name(), e))
                    .collect(),
                warnings: outcome.warnings,
            });
        }

        result
    }

    /// Apply processors in order; the first rejection wins
    pub fn process(&self, record: BulkRecord) -> Result<BulkRecord, String> {
        self.processors.iter().try_fold(record, |record, processor| {
            processor
                .process(record, self.operation_type)
                .map_err(|e| format!("{}: {}", processor.name(), e))
        })
    }
}
