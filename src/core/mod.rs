//! Core functionality
//!
//! - `traits`: capability traits implemented outside the engine
//! - `bulk`: the bulk operation engine

pub mod bulk;
pub mod traits;
