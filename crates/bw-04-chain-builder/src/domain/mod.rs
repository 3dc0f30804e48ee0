//! # Domain Layer
//!
//! - `request` - what a build is asked to find
//! - `scenario` - one partial chain under exploration

pub mod request;
pub mod scenario;

pub use request::BuildRequest;
pub use scenario::Scenario;
