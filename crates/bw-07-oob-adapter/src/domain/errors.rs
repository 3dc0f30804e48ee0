//! Connection-level framing errors. Any of these aborts the connection.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad frame header: {reason}")]
    BadHeader { reason: String },
    #[error("bad frame line: {reason}")]
    BadLine { reason: String },
    #[error("frame too large: max {max_frame_bytes} got {got_bytes}")]
    FrameTooLarge {
        max_frame_bytes: usize,
        got_bytes: usize,
    },
    #[error("frame body runs past its declared length of {declared} bytes")]
    LengthExceeded { declared: usize },
}

impl FrameError {
    pub(crate) fn header(reason: impl Into<String>) -> Self {
        Self::BadHeader {
            reason: reason.into(),
        }
    }

    pub(crate) fn line(reason: impl Into<String>) -> Self {
        Self::BadLine {
            reason: reason.into(),
        }
    }
}
