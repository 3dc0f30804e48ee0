//! # Domain Layer
//!
//! - `command` - four-character command codes
//! - `frame` - frames and their header accessors
//! - `errors` - framing errors

pub mod command;
pub mod errors;
pub mod frame;

pub use command::Command;
pub use errors::FrameError;
pub use frame::{Frame, FRAME_HEADER_LEN, MAX_SEQNO};
