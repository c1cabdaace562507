//! Configuration data models
//!
//! This module defines all configuration structures used by the engine.

pub mod engine;
pub mod logging;
pub mod operation;

// Re-export all configuration types
pub use engine::*;
pub use logging::*;
pub use operation::*;

/// Default number of records per batch
pub fn default_batch_size() -> usize {
    100
}

/// Default number of concurrently processed batches
pub fn default_max_concurrent() -> usize {
    5
}

/// Default operation timeout (5 minutes)
pub fn default_operation_timeout_ms() -> u64 {
    300_000
}

/// Default maximum retry attempts
pub fn default_max_retries() -> u32 {
    3
}

/// Default delay between retries
pub fn default_retry_delay_ms() -> u64 {
    1_000
}

pub fn default_max_active_operations() -> usize {
    4
}

pub fn default_event_channel_capacity() -> usize {
    1024
}

pub fn default_progress_interval_ms() -> u64 {
    250
}

pub fn default_rate_window_secs() -> u64 {
    10
}

pub fn default_true() -> bool {
    true
}
