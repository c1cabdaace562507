//! Storage layer
//!
//! The engine reaches persistence only through `ResourceAdapter`. This module
//! ships the in-memory network inventory used by the binary and the tests,
//! plus stock record rules for it.

pub mod memory;
pub mod rules;

pub use memory::{InventoryAdapter, InventoryStore, ResourceKind};
pub use rules::{NormalizeNames, RegionAllowList};
