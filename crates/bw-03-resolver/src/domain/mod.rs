//! # Domain Layer
//!
//! - `alias` - alias key derivation
//! - `cache` - the resolution caches and their invalidation rules
//! - `events` - registry events and interaction parameters

pub mod alias;
pub mod cache;
pub mod events;
