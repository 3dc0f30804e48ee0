//! # Ports
//!
//! - `outbound` - the registry the resolver is driven against

pub mod outbound;

pub use outbound::RegistryProvider;
