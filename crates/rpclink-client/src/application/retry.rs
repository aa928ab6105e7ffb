//! Retry policy: how long to wait between discovery broadcasts and before
//! reconnecting after a link closes.

use std::time::Duration;

/// Default delay between retries.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Lower bound applied to every delay.  A zero period would make the
/// re-broadcast timer spin.
pub const MIN_RETRY_DELAY: Duration = Duration::from_millis(1);

/// Supplies the retry delay.
///
/// Consulted once per discovery cycle for the re-broadcast interval and once
/// per closed link for the backoff before the next attempt.
#[cfg_attr(test, mockall::automock)]
pub trait RetryPolicy: Send + Sync {
    fn retry_delay(&self) -> Duration;
}

/// Always waits the same amount of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRetry {
    delay: Duration,
}

impl FixedRetry {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }
}

impl Default for FixedRetry {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_DELAY)
    }
}

impl RetryPolicy for FixedRetry {
    fn retry_delay(&self) -> Duration {
        self.delay
    }
}

/// Reads the policy's delay, clamped to [`MIN_RETRY_DELAY`].
pub(crate) fn effective_delay(policy: &dyn RetryPolicy) -> Duration {
    policy.retry_delay().max(MIN_RETRY_DELAY)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
