//! # Resolver (bw-03)
//!
//! Turns VKs, hashes and aliases into routing objects with a validity
//! state, backed by the registry and a set of caches that are flushed as
//! registry events arrive.
//!
//! ## Validity
//!
//! | Object | Valid when |
//! |--------|-----------|
//! | Entity | registered, not revoked, not past its expiry |
//! | DOT | registered, not revoked or expired, giver and receiver valid |
//! | Access chain | registered and every DOT valid |
//!
//! A revoked or expired object resolves successfully with a non-`Valid`
//! state; only registry failures are errors.
//!
//! ## Invalidation
//!
//! | Registry event | Flushes |
//! |----------------|---------|
//! | new DOT | giver's granted set, built chains on its namespace (plus holdoff), the DOT |
//! | DOT revocation | the DOT |
//! | new entity / entity revocation | the entity and every cached DOT naming it |
//!
//! ## Crate Structure
//!
//! - `domain/` - caches, alias keys, registry events
//! - `ports/` - `RegistryProvider`
//! - `adapters/` - `InMemoryRegistry`
//! - `service.rs` - `Resolver`

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::InMemoryRegistry;
pub use domain::alias::{long_alias_key, parse_short_alias, short_alias_key, value_as_text};
pub use domain::cache::{ChainCacheKey, DotLink, ResolutionCaches};
pub use domain::events::{BlockEvent, RegistryEvent, RouterOffer, TransactionParams};
pub use ports::RegistryProvider;
pub use service::{Resolver, ResolverConfig};
