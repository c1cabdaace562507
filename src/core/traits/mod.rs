//! Core capability traits
//!
//! This module contains the interfaces the bulk engine consumes.

pub mod adapter;
pub mod validator;

pub use adapter::{AdapterError, AppliedMutation, ResourceAdapter};
pub use validator::{RecordProcessor, RecordValidator, ValidationResult};
