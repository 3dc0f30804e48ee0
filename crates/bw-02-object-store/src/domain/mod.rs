//! # Domain Layer
//!
//! - `errors` - store errors
//! - `keys` - key layout of the column families

pub mod errors;
pub mod keys;
