//! Transport-level errors.

use thiserror::Error;

use crate::status::Status;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("frame exceeds {max} bytes")]
    FrameTooLarge { max: usize },

    #[error("connection closed mid-frame")]
    Truncated,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("unexpected frame: {0}")]
    UnexpectedFrame(String),

    /// The remote side finished the call with a non-OK status.
    #[error("call failed: {0}")]
    Rpc(#[from] Status),
}

impl TransportError {
    /// The call status, if this error is a failed call.
    #[must_use]
    pub fn status(&self) -> Option<&Status> {
        match self {
            Self::Rpc(status) => Some(status),
            _ => None,
        }
    }
}
