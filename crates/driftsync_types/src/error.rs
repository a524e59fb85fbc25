//! Error types for record stores.

use thiserror::Error;

/// Result type for record-store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors a record store can report.
///
/// The in-memory store is infallible; durable implementations surface
/// their backend and codec failures through these variants.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying storage backend failed.
    #[error("store backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },

    /// A persisted record could not be encoded or decoded.
    #[error("record codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl StoreError {
    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_display() {
        let err = StoreError::backend("disk full");
        assert_eq!(err.to_string(), "store backend error: disk full");
    }
}
