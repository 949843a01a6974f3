//! Persistent Rule Store
//!
//! This module provides the storage backend abstraction, an in-memory
//! backend with change notifications, and the typed accessors every
//! extension context uses.

mod backend;
mod memory;
mod rule_store;

pub use backend::*;
pub use memory::MemoryStorage;
pub use rule_store::RuleStore;
