//! Capped exponential backoff.

use std::time::Duration;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default delay ceiling.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default number of consecutive retries before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Reconnection backoff policy.
///
/// Pure: holds no attempt state. The caller counts attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectionPolicy {
    /// Delay for attempt 0.
    pub base_delay: Duration,
    /// Upper bound on any delay.
    pub max_delay: Duration,
    /// Attempts allowed before the caller should stop.
    pub max_attempts: u32,
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectionPolicy {
    /// `min(base_delay * 2^attempt, max_delay)`.
    ///
    /// Saturates at `max_delay` for any attempt count, including ones whose
    /// exponent would overflow.
    pub fn delay(&self, attempt: u32) -> Duration {
        1u32.checked_shl(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Whether another attempt is allowed under this policy's ceiling.
    pub fn allows(&self, attempt: u32) -> bool {
        Self::should_retry(attempt, self.max_attempts)
    }

    /// Whether `attempt` (zero-based) is below `max_attempts`.
    pub fn should_retry(attempt: u32, max_attempts: u32) -> bool {
        attempt < max_attempts
    }
}
