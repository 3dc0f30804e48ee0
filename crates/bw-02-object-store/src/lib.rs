//! # Object Store (bw-02)
//!
//! Local persistence for the router: routing objects the router has seen
//! or created, and the persisted-message index used by `pers`, `quer` and
//! `list`.
//!
//! ## Key Layout
//!
//! | Column family | Key | Value |
//! |---------------|-----|-------|
//! | `dot/` | DOT hash | RO number, DOT content |
//! | `dch/` | chain hash | RO number, DOT hashes |
//! | `ent/` | entity VK | entity content (public form) |
//! | `msg/` | `base64(mvk)/suffix` | encoded message, last value wins |
//!
//! ## Crate Structure
//!
//! - `domain/` - errors and key layout
//! - `ports/` - `KeyValueStore`, the backend trait
//! - `adapters/` - in-memory and file-backed backends
//! - `service.rs` - `ObjectStore`, the typed API the router uses

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{FileBackedKVStore, InMemoryKVStore};
pub use domain::errors::KVStoreError;
pub use ports::{BatchOperation, KeyValueStore};
pub use service::{DynObjectStore, ObjectStore};
