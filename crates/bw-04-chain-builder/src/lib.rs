//! # Chain Builder (bw-04)
//!
//! Finds access chains that let a target entity act on a namespace URI.
//!
//! ## Search
//!
//! Nodes are VKs, edges are valid access DOTs on the namespace that carry
//! the required permissions and whose URI can still cover the request.
//! The walk starts at the namespace VK and goes breadth first:
//!
//! | Step | Rule |
//! |------|------|
//! | extend | URI restricted by the DOT, permissions reduced, TTL decremented and capped |
//! | accept | terminal is the target, or everybody when allowed |
//! | prune | TTL spent, URI overconstrained, VK already on the path, depth 256 |
//! | dedupe | by chain hash |
//!
//! Results go to the built-chain cache unless the namespace is in holdoff.
//!
//! ## Crate Structure
//!
//! - `domain/` - `BuildRequest`, `Scenario`
//! - `ports/` - `GrantSource`
//! - `adapters/` - `GrantSource` for the resolver
//! - `service.rs` - `ChainBuilder`

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use domain::{BuildRequest, Scenario};
pub use ports::GrantSource;
pub use service::{ChainBuilder, ChainBuilderConfig, MAX_CHAIN_DEPTH};
