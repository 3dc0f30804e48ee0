//! # Adapters
//!
//! - `memory_registry` - a registry held in process, mining blocks on a
//!   timer. Used by the router when no external registry is configured and
//!   by every test.

pub mod memory_registry;

pub use memory_registry::InMemoryRegistry;
