//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use driftsync_types::ConflictPolicy;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A user-supplied merge function for the [`ConflictPolicy::Merge`] policy.
///
/// Called with (local payload, remote payload); the returned value becomes
/// the record's payload and is re-pushed to the authority.
pub type MergeFn = Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>;

/// Configuration for a sync engine instance.
#[derive(Clone)]
pub struct SyncConfig {
    /// Namespace identifying the record table this engine owns.
    pub namespace: String,
    /// Field name the remote authority keys entities by.
    pub primary_key: String,
    /// Policy applied when a write reports a version conflict.
    pub policy: ConflictPolicy,
    /// Maximum records synced concurrently per reconnect batch.
    pub batch_size: usize,
    /// Maximum consecutive retries before a record is parked.
    pub max_retries: u32,
    /// Base delay for the exponential backoff.
    pub base_delay: Duration,
    /// Merge function, required by the `Merge` policy.
    pub merge_fn: Option<MergeFn>,
}

impl SyncConfig {
    /// Creates a configuration with the documented defaults.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            primary_key: "id".into(),
            policy: ConflictPolicy::default(),
            batch_size: 50,
            max_retries: 4,
            base_delay: Duration::from_millis(1000),
            merge_fn: None,
        }
    }

    /// Sets the primary-key field name.
    #[must_use]
    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    /// Sets the conflict policy.
    #[must_use]
    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the reconnect batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the maximum retry count.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the base backoff delay.
    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Sets the merge function used by the `Merge` policy.
    #[must_use]
    pub fn with_merge_fn(mut self, merge_fn: MergeFn) -> Self {
        self.merge_fn = Some(merge_fn);
        self
    }

    /// Validates the configuration.
    ///
    /// Fails fast at engine construction rather than on the first
    /// conflict.
    pub fn validate(&self) -> SyncResult<()> {
        if self.namespace.is_empty() {
            return Err(SyncError::configuration("namespace must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(SyncError::configuration("batch size must be non-zero"));
        }
        if self.policy == ConflictPolicy::Merge && self.merge_fn.is_none() {
            return Err(SyncError::configuration(
                "merge policy requires a merge function",
            ));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("driftsync")
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("namespace", &self.namespace)
            .field("primary_key", &self.primary_key)
            .field("policy", &self.policy)
            .field("batch_size", &self.batch_size)
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("merge_fn", &self.merge_fn.as_ref().map(|_| "<fn>"))
            .finish()
    }
}
