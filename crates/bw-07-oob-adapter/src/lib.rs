//! # OOB Adapter (bw-07)
//!
//! The framed text protocol local clients speak to the router over TCP.
//! Each connection gets its own client handle from the [`Router`] and a
//! [`Session`] that turns command frames into pipeline calls.
//!
//! [`Router`]: bw_06_message_pipeline::Router
//!
//! ## Frame Layout
//!
//! ```text
//! publ 0000000042 0000001234\n      cmd4, body length, seqno
//! kv uri 12\n<12 bytes>\n           headers
//! ro 2\n...                         routing objects
//! po 1.0.1.1:16777473 5\n...        payload objects
//! end\n
//! ```
//!
//! ## Response Conventions
//!
//! | Command kind | Frames sent back |
//! |--------------|------------------|
//! | one-shot (`publ`, `make`, `putd`, ...) | `resp{finished=true}` |
//! | streaming (`subs`, `quer`, `list`, `bldc`, `ldro`) | `resp`, `rslt`*, `rslt{finished=true}` |
//! | any failure | `resp{status=error, code, reason, finished=true}` |
//!
//! A malformed frame drops the connection. An unknown command code does not.
//!
//! ## Crate Structure
//!
//! - `domain/` - command codes, frames, framing errors
//! - `adapters/` - async frame reader and writer
//! - `session.rs` - per-connection command dispatch
//! - `service.rs` - `OobServer`, `OobConfig`

pub mod adapters;
pub mod domain;
pub mod service;
pub mod session;

pub use adapters::{FrameReader, FrameWriter, DEFAULT_MAX_FRAME_BYTES};
pub use domain::{Command, Frame, FrameError, FRAME_HEADER_LEN, MAX_SEQNO};
pub use service::{OobConfig, OobServer, PROTOCOL_VERSION};
pub use session::{error_frame, message_result, Session};
