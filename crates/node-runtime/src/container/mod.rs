//! # Router Container
//!
//! Configuration and the wired-up components the runtime drives.
//!
//! ## Initialization Order
//!
//! 1. Object store (in memory, or a file snapshot when `store.path` is set)
//! 2. In-memory registry with the configured transaction parameters
//! 3. `Router` over both

pub mod components;
pub mod config;

pub use components::RouterComponents;
pub use config::{ConfigError, RouterConfig};
