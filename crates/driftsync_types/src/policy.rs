//! Conflict-resolution policies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Policy applied when a remote write reports a version conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// The local payload wins; the version token is bumped and the record
    /// is re-pushed, overwriting the remote state.
    ClientWins,
    /// The remote state wins; the record adopts the authority's payload,
    /// version, and timestamp.
    ServerWins,
    /// Whichever side was modified later wins; equal timestamps resolve to
    /// the server.
    LastWriteWins,
    /// A configured merge function combines both payloads; the merged
    /// result is re-pushed.
    Merge,
    /// The record is parked as a conflict, holding the remote snapshot,
    /// until resolved explicitly.
    Manual,
}

impl ConflictPolicy {
    /// Returns true if this policy resolves conflicts without user input.
    #[must_use]
    pub fn auto_resolves(&self) -> bool {
        !matches!(self, ConflictPolicy::Manual)
    }
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        ConflictPolicy::ServerWins
    }
}

/// Explicit resolution of a record parked as a conflict.
#[derive(Debug, Clone, PartialEq)]
pub enum ManualResolution {
    /// Keep the local payload and re-push it; the authority has not yet
    /// acknowledged the local state.
    AcceptClient,
    /// Adopt the conflict snapshot as the record's new state.
    AcceptServer,
    /// Replace the payload with a caller-supplied value and re-push.
    Custom(Value),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_is_the_only_non_automatic_policy() {
        assert!(ConflictPolicy::ClientWins.auto_resolves());
        assert!(ConflictPolicy::ServerWins.auto_resolves());
        assert!(ConflictPolicy::LastWriteWins.auto_resolves());
        assert!(ConflictPolicy::Merge.auto_resolves());
        assert!(!ConflictPolicy::Manual.auto_resolves());
    }

    #[test]
    fn default_policy_is_server_wins() {
        assert_eq!(ConflictPolicy::default(), ConflictPolicy::ServerWins);
    }

    #[test]
    fn policy_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&ConflictPolicy::LastWriteWins).unwrap(),
            "\"last-write-wins\""
        );
        let decoded: ConflictPolicy = serde_json::from_str("\"client-wins\"").unwrap();
        assert_eq!(decoded, ConflictPolicy::ClientWins);
    }
}
