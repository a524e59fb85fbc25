//! Retry scheduling with jittered exponential backoff.

use crate::config::SyncConfig;
use driftsync_types::MutationRecord;
use rand::Rng;
use std::time::Duration;

/// Ceiling for any computed backoff delay.
pub const MAX_BACKOFF: Duration = Duration::from_millis(30_000);

/// Decides whether a failed record retries and how long to wait first.
///
/// Delays grow exponentially to bound load on the authority; the uniform
/// jitter and the 30-second ceiling keep a fleet of reconnecting clients
/// from retrying in lockstep.
#[derive(Debug, Clone)]
pub struct RetryScheduler {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryScheduler {
    /// Creates a scheduler from the engine configuration.
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.base_delay,
        }
    }

    /// Returns true if the record has retries left.
    #[must_use]
    pub fn should_retry(&self, record: &MutationRecord) -> bool {
        record.retry_count < self.max_retries
    }

    /// Computes the delay before the next attempt.
    ///
    /// `base_delay * 2^retry_count * jitter`, `jitter ~ U(0.85, 1.15)`,
    /// jittered first and then clamped to [`MAX_BACKOFF`].
    #[must_use]
    pub fn next_delay(&self, retry_count: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.85..1.15);
        let exponent = retry_count.min(31) as i32;
        let millis = self.base_delay.as_millis() as f64 * 2f64.powi(exponent) * jitter;
        Duration::from_millis(millis.min(MAX_BACKOFF.as_millis() as f64) as u64)
    }

    /// Suspends the caller for the computed delay.
    ///
    /// This is the scheduler's only effect; persisting the record before
    /// and re-dispatching after are the engine's business.
    pub async fn wait(&self, retry_count: u32) {
        tokio::time::sleep(self.next_delay(retry_count)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scheduler(base_ms: u64, max_retries: u32) -> RetryScheduler {
        let config = SyncConfig::new("test")
            .with_base_delay(Duration::from_millis(base_ms))
            .with_max_retries(max_retries);
        RetryScheduler::new(&config)
    }

    #[test]
    fn should_retry_below_max() {
        let scheduler = scheduler(1000, 4);
        let mut record = MutationRecord::create(json!({}), 0);

        record.retry_count = 0;
        assert!(scheduler.should_retry(&record));
        record.retry_count = 3;
        assert!(scheduler.should_retry(&record));
        record.retry_count = 4;
        assert!(!scheduler.should_retry(&record));
    }

    #[test]
    fn first_delay_within_jitter_bounds() {
        let scheduler = scheduler(1000, 4);
        for _ in 0..100 {
            let delay = scheduler.next_delay(0).as_millis();
            assert!((850..=1150).contains(&delay), "delay {delay} out of bounds");
        }
    }

    #[test]
    fn fourth_delay_within_jitter_bounds() {
        let scheduler = scheduler(1000, 4);
        for _ in 0..100 {
            let delay = scheduler.next_delay(3).as_millis();
            assert!(
                (6800..=9200).contains(&delay),
                "delay {delay} out of bounds"
            );
        }
    }

    #[test]
    fn large_counts_clamp_to_ceiling() {
        let scheduler = scheduler(1000, 4);
        for _ in 0..100 {
            let delay = scheduler.next_delay(10);
            assert_eq!(delay, MAX_BACKOFF);
        }
        // Far past any representable exponent.
        assert_eq!(scheduler.next_delay(u32::MAX), MAX_BACKOFF);
    }
}
