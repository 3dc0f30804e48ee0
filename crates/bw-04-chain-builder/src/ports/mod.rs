//! # Ports
//!
//! - `outbound` - where grants come from and where built chains are kept

pub mod outbound;

pub use outbound::GrantSource;
