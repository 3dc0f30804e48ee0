//! # Domain Layer
//!
//! Canonical encodings of every signed object the router handles.
//!
//! ## Modules
//!
//! - `codec` - bounds-checked reader and the shared metadata TLV block
//! - `entity` - principals
//! - `dot` - delegations of trust (access and permission)
//! - `dchain` - DOT chains and access chain analysis
//! - `revocation` - revocations of DOTs and entities
//! - `routing` - routing object union and numbers
//! - `payload` - payload objects
//! - `message` - signed messages

pub mod codec;
pub mod dchain;
pub mod dot;
pub mod entity;
pub mod message;
pub mod payload;
pub mod revocation;
pub mod routing;
