//! Error Handling utilities
//!
//! This module provides the engine error type and the shared error code taxonomy.

pub mod error;

// Re-export commonly used types
pub use error::*;
