//! # Adapters
//!
//! - `resolver` - `GrantSource` backed by the resolver's caches

mod resolver;
