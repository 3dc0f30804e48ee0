//! # Adapters
//!
//! - `codec` - async frame reader and writer over any byte stream

pub mod codec;

pub use codec::{FrameReader, FrameWriter, DEFAULT_MAX_FRAME_BYTES};
