//! Integration tests for netinv-bulk
//!
//! These tests drive the whole engine against the in-memory inventory
//! without mocking its internals.

pub mod config_tests;
pub mod lifecycle_tests;
pub mod processing_tests;
