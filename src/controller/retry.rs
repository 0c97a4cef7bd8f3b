//! Per-object retry bookkeeping for the error policy

use std::time::Duration;

use dashmap::DashMap;

use super::store::ObjectKey;

/// Base delay before the first retry of a failed reconciliation
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 15;
/// Upper bound on the retry delay
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Calculate exponential backoff duration for retries
///
/// # Arguments
/// * `attempt` - Number of consecutive failures before this one (0-based)
/// * `base_delay_secs` - Base delay in seconds (default: 15)
/// * `max_delay_secs` - Maximum delay cap in seconds (default: 300)
pub fn calculate_backoff(
    attempt: u32,
    base_delay_secs: Option<u64>,
    max_delay_secs: Option<u64>,
) -> Duration {
    let base = base_delay_secs.unwrap_or(DEFAULT_BACKOFF_BASE_SECS);
    let max = max_delay_secs.unwrap_or(DEFAULT_BACKOFF_MAX_SECS);

    // Exponential: base * 2^attempt, capped at max
    let delay_secs = base.saturating_mul(2_u64.saturating_pow(attempt.min(5)));
    Duration::from_secs(delay_secs.min(max))
}

/// Consecutive failure counts keyed by controller and object
#[derive(Default)]
pub struct RetryTracker {
    failures: DashMap<(&'static str, ObjectKey), u32>,
}

impl RetryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure and return the delay before the next attempt
    pub fn next_delay(&self, controller: &'static str, key: &ObjectKey) -> Duration {
        let mut entry = self.failures.entry((controller, key.clone())).or_insert(0);
        let attempt = *entry;
        *entry = attempt.saturating_add(1);
        calculate_backoff(attempt, None, None)
    }

    /// Forget the failure history after a successful reconciliation
    pub fn reset(&self, controller: &'static str, key: &ObjectKey) {
        self.failures.remove(&(controller, key.clone()));
    }

    pub fn failures(&self, controller: &'static str, key: &ObjectKey) -> u32 {
        self.failures
            .get(&(controller, key.clone()))
            .map(|count| *count)
            .unwrap_or(0)
    }
}
