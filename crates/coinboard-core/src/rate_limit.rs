//! Sliding-window send limiter with cooldown.
//!
//! Caps user sends at `max_in_window` per rolling `window`. Exceeding the cap
//! starts a cooldown during which every send is refused, whatever the window
//! holds.

use std::{collections::VecDeque, fmt, time::Duration};

use crate::env::Timestamp;

/// Default rolling window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(3);

/// Default number of sends allowed per window.
pub const DEFAULT_MAX_IN_WINDOW: usize = 5;

/// Default cooldown after the cap is exceeded.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5);

/// Rate limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Rolling window length.
    pub window: Duration,
    /// Sends accepted inside one window.
    pub max_in_window: usize,
    /// How long sends are refused once the cap is hit.
    pub cooldown: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            max_in_window: DEFAULT_MAX_IN_WINDOW,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

/// Why a send was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// Content was empty after trimming whitespace.
    Empty,
    /// This send would exceed the window cap; a cooldown has started.
    RateExceeded {
        /// Cooldown length, rounded up to whole seconds.
        cooldown_secs: u64,
    },
    /// A cooldown is still running.
    Cooldown {
        /// Time left, rounded up to whole seconds.
        remaining_secs: u64,
    },
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("message is empty"),
            Self::RateExceeded { cooldown_secs } => {
                write!(f, "sending too fast, wait {cooldown_secs}s")
            },
            Self::Cooldown { remaining_secs } => {
                write!(f, "cooling down, wait {remaining_secs}s")
            },
        }
    }
}

/// Sliding-window rate limiter.
///
/// Only accepted sends are recorded, so a refused send never extends the
/// window.
#[derive(Debug, Clone)]
pub struct RateLimiter<I> {
    config: RateLimitConfig,
    sent: VecDeque<I>,
    cooldown_until: Option<I>,
}

impl<I: Timestamp> RateLimiter<I> {
    /// Limiter with an empty window and no cooldown.
    pub fn new(config: RateLimitConfig) -> Self {
        Self { config, sent: VecDeque::with_capacity(config.max_in_window), cooldown_until: None }
    }

    /// Validate content, then apply the window and cooldown checks.
    ///
    /// Empty content is refused before anything else and records nothing.
    pub fn check_send(&mut self, content: &str, now: I) -> Result<(), Denial> {
        if content.trim().is_empty() {
            return Err(Denial::Empty);
        }
        self.check_and_record(now)
    }

    /// Accept and record one send at `now`, or refuse it.
    ///
    /// While a cooldown runs every call is refused with
    /// [`Denial::Cooldown`]. Otherwise timestamps older than the window are
    /// discarded; if the window is full a cooldown starts and the call is
    /// refused with [`Denial::RateExceeded`].
    pub fn check_and_record(&mut self, now: I) -> Result<(), Denial> {
        if let Some(remaining) = self.cooldown_remaining(now) {
            return Err(Denial::Cooldown { remaining_secs: ceil_secs(remaining) });
        }
        self.cooldown_until = None;

        self.prune(now);
        if self.sent.len() >= self.config.max_in_window {
            self.cooldown_until = Some(now + self.config.cooldown);
            tracing::debug!(
                window = ?self.config.window,
                cooldown = ?self.config.cooldown,
                "send rate exceeded, cooldown started"
            );
            return Err(Denial::RateExceeded { cooldown_secs: ceil_secs(self.config.cooldown) });
        }

        self.sent.push_back(now);
        Ok(())
    }

    /// Time left on the active cooldown, if any.
    pub fn cooldown_remaining(&self, now: I) -> Option<Duration> {
        self.cooldown_until.filter(|until| now < *until).map(|until| until - now)
    }

    /// Sends currently counted against the window (without pruning).
    pub fn in_window(&self) -> usize {
        self.sent.len()
    }

    fn prune(&mut self, now: I) {
        while let Some(&oldest) = self.sent.front() {
            if now - oldest < self.config.window {
                break;
            }
            self.sent.pop_front();
        }
    }
}

impl<I: Timestamp> Default for RateLimiter<I> {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}
