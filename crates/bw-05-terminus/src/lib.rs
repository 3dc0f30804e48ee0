//! # Terminus (bw-05)
//!
//! Local topic matching and dispatch for messages that passed verification.
//!
//! ## Topic Matching
//!
//! | Pattern cell | Matches |
//! |--------------|---------|
//! | literal | the same cell |
//! | `+` | exactly one cell |
//! | `*` | zero or more cells |
//!
//! ## Dispatch
//!
//! Each subscription has one bounded queue. A full queue drops its oldest
//! message rather than blocking the publisher. Unsubscribing closes the
//! queue; the stream ends once drained.
//!
//! Persisted messages live in the object store, last value per topic, and
//! serve `quer` and `list`.
//!
//! ## Crate Structure
//!
//! - `domain/` - client ids, subscriptions, subscription streams
//! - `service.rs` - `Terminus`

pub mod domain;
pub mod service;

pub use domain::{ClientId, SubscribeOutcome, Subscription, SubscriptionStream};
pub use service::{Terminus, TerminusConfig};
