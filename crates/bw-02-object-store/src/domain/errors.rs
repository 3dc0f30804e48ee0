//! Store errors.

use shared_types::{BwError, StatusCode};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KVStoreError {
    /// I/O error during read/write.
    #[error("KV store I/O error: {message}")]
    IOError { message: String },
    /// A stored value failed to decode.
    #[error("KV store corruption: {message}")]
    CorruptionError { message: String },
}

impl From<KVStoreError> for BwError {
    fn from(err: KVStoreError) -> Self {
        BwError::new(StatusCode::ResolutionFailed, err.to_string())
    }
}
