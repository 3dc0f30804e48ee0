//! # Message Pipeline (bw-06)
//!
//! Ties the subsystems together: the [`Router`] owns the resolver, chain
//! builder, terminus and object store, verifies every message before
//! delivery, and hands out one [`BosswaveClient`] per connection.
//!
//! ## Message Flow
//!
//! ```text
//! client command ──► compose (sign, attach PAC/origin/expiry)
//!                        │
//!                        ▼
//!                   MessageVerifier::verify
//!                        │  chain elaboration: inline DOTs → store → registry
//!                        ▼
//!                   Terminus (publish / persist / subscribe / query / list)
//! ```
//!
//! ## PAC Elaboration
//!
//! | Mode | Routing objects attached |
//! |------|--------------------------|
//! | `none` | chain hash |
//! | `partial` | elaborated chain |
//! | `full` | elaborated chain and each DOT |
//!
//! ## Crate Structure
//!
//! - `domain/` - command parameters
//! - `verify.rs` - `MessageVerifier`
//! - `router.rs` - `Router`, `RouterSettings`
//! - `client.rs` - `BosswaveClient`

pub mod client;
pub mod domain;
pub mod router;
pub mod verify;

pub use client::BosswaveClient;
pub use domain::{
    BcInteractionParams, BcipUpdate, BuildChainParams, CreateDotParams, CreateEntityParams,
    ElaboratePac, MessageRequest,
};
pub use router::{Router, RouterSettings};
pub use verify::MessageVerifier;
