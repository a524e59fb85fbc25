//! Outcomes of remote write attempts.

use crate::record::ConflictSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A successful remote write.
///
/// The authority may enrich the acknowledgment with an identifier of its
/// own and a server-side rendering of the payload; it always reports the
/// advanced version token and its last-modified timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAck {
    /// Authority-assigned identifier, present on the first create ack.
    pub remote_id: Option<String>,
    /// Server-returned payload fields, merged into the local payload.
    pub payload: Option<Value>,
    /// The advanced version token.
    pub version: u64,
    /// When the authority recorded the write, unix milliseconds.
    pub last_modified: u64,
}

impl RemoteAck {
    /// Creates an acknowledgment carrying only the version token and
    /// timestamp.
    pub fn new(version: u64, last_modified: u64) -> Self {
        Self {
            remote_id: None,
            payload: None,
            version,
            last_modified,
        }
    }

    /// Attaches an authority-assigned identifier.
    #[must_use]
    pub fn with_remote_id(mut self, remote_id: impl Into<String>) -> Self {
        self.remote_id = Some(remote_id.into());
        self
    }

    /// Attaches server-returned payload fields.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Classified outcome of one remote write attempt.
///
/// Every response from the authority falls into one of three families;
/// anything the adapter cannot classify is a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RemoteOutcome {
    /// The write was accepted.
    Ack(RemoteAck),
    /// The version precondition failed; carries the authority's current
    /// state of the entity.
    Conflict(ConflictSnapshot),
    /// The write did not reach a decision.
    Failure {
        /// Human-readable cause, for logs and diagnostics.
        cause: String,
        /// Whether re-issuing the same write may succeed.
        retryable: bool,
    },
}

impl RemoteOutcome {
    /// Creates a retryable failure (timeout, connection reset, 5xx).
    pub fn failure_retryable(cause: impl Into<String>) -> Self {
        Self::Failure {
            cause: cause.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable failure (malformed request, 4xx).
    pub fn failure_fatal(cause: impl Into<String>) -> Self {
        Self::Failure {
            cause: cause.into(),
            retryable: false,
        }
    }

    /// Returns true if this outcome is an acknowledgment.
    #[must_use]
    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack(_))
    }

    /// Returns true if this outcome is a conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
