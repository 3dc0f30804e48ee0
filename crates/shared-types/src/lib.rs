//! # Shared Types Crate
//!
//! Vocabulary shared by every router subsystem.
//!
//! ## Contents
//!
//! | Module | Provides |
//! |--------|----------|
//! | `entities` | `Vk`, `Hash32`, the everybody sentinel, `ValidityState`, timestamps |
//! | `errors` | `StatusCode` and `BwError` |
//! | `uri` | suffix grammar, `restrict_by`, `topic_match` |
//! | `permissions` | `AccessPermissions` (C/T/P/L family) |
//! | `ponum` | payload object numbers in dotted form |
//! | `duration` | `1d2h`-style durations |
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: status codes and URI semantics are defined
//!   once here and reused by the resolver, chain builder, terminus and
//!   command dispatcher.
//! - **No I/O**: everything in this crate is pure.

pub mod duration;
pub mod entities;
pub mod errors;
pub mod permissions;
pub mod ponum;
pub mod uri;

pub use duration::parse_duration;
pub use entities::*;
pub use errors::*;
pub use permissions::AccessPermissions;
pub use ponum::*;
pub use uri::{analyze_suffix, restrict_by, topic_match, topic_match_str, SuffixInfo};
