//! # Domain Layer
//!
//! - `subscription` - client ids, subscription records and the receiving
//!   end of a dispatch queue

pub mod subscription;

pub use subscription::{ClientId, SubscribeOutcome, Subscription, SubscriptionStream};
