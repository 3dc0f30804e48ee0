//! # Adapters
//!
//! - `memory` - `BTreeMap` backed store for tests and ephemeral routers
//! - `file` - snapshot-to-disk store for a router that survives restarts

pub mod file;
pub mod memory;

pub use file::FileBackedKVStore;
pub use memory::InMemoryKVStore;
