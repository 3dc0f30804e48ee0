//! # Ports
//!
//! - `outbound` - the key-value backend this crate is driven against

pub mod outbound;

pub use outbound::{BatchOperation, KeyValueStore};
