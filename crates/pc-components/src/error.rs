//! Domain error type shared by every component capability.

use thiserror::Error;

/// Errors a component implementation (or its factory) may report.
///
/// The host maps each variant onto a distinct RPC status so the sidecar can
/// tell concurrency conflicts apart from plain failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ComponentError {
    /// Optimistic concurrency check failed (stale etag).
    #[error("etag mismatch: {0}")]
    ETagMismatch(String),

    /// The supplied etag could not be parsed by the store.
    #[error("invalid etag: {0}")]
    ETagInvalid(String),

    /// A bulk delete touched a different number of rows than requested.
    #[error("bulk delete affected {actual} rows, expected {expected}")]
    BulkDeleteRowMismatch { expected: u64, actual: u64 },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The component instance could not be constructed.
    #[error("component construction failed: {0}")]
    Construction(String),

    /// The component does not implement the requested operation.
    #[error("operation not supported: {0}")]
    Unsupported(String),

    /// Any other failure raised by the implementation.
    #[error("{0}")]
    Failed(String),
}

impl ComponentError {
    /// Shorthand for [`ComponentError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Shorthand for [`ComponentError::Construction`].
    pub fn construction(message: impl Into<String>) -> Self {
        Self::Construction(message.into())
    }
}

/// Result alias for component operations.
pub type ComponentResult<T> = Result<T, ComponentError>;
