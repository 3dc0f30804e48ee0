//! Cross-crate scenarios over the in-memory registry and KV store.

pub mod fixtures;

mod aliases;
mod chain_build;
mod oob_wire;
mod publish_flow;
mod revocation;
