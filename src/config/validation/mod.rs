//! Configuration validation
//!
//! This module provides validation logic for all configuration structures.
//!
//! The validation is organized into several submodules:
//! - `trait_def`: Core Validate trait definition
//! - `engine_validators`: EngineConfig and LoggingConfig validators
//! - `operation_validators`: BulkOperationConfig validators
//! - `tests`: Test suite for all validators

mod engine_validators;
mod operation_validators;
mod trait_def;

pub use operation_validators::validate_policy;
pub use trait_def::Validate;
