//! Error types for the sync engine.

use driftsync_types::{RecordId, StoreError};
use thiserror::Error;

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors the sync engine surfaces to callers.
///
/// These are structural failures that fail fast and synchronously.
/// Expected runtime conditions of a sync attempt (timeouts, server
/// errors, version conflicts) are absorbed by the state machine and end
/// up as persisted record state, never as an error.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The referenced record does not exist.
    #[error("record not found: {id}")]
    RecordNotFound {
        /// The ID that was looked up.
        id: RecordId,
    },

    /// The record is not in a state that permits the operation.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of the mismatch.
        message: String,
    },

    /// The engine configuration is unusable.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// The record store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The engine has been shut down.
    #[error("engine is shut down")]
    Shutdown,
}

impl SyncError {
    /// Creates a record-not-found error.
    pub fn record_not_found(id: RecordId) -> Self {
        Self::RecordNotFound { id }
    }

    /// Creates an invalid-state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let id = RecordId::new();
        let err = SyncError::record_not_found(id);
        assert!(err.to_string().contains(&id.to_string()));

        let err = SyncError::invalid_state("record is not in conflict");
        assert_eq!(err.to_string(), "invalid state: record is not in conflict");

        assert_eq!(SyncError::Shutdown.to_string(), "engine is shut down");
    }
}
