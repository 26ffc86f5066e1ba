//! Environment abstraction for deterministic testing.
//!
//! Decouples session logic from the system clock. Production uses
//! `std::time::Instant`; simulation uses a manually advanced virtual clock so
//! backoff, cooldown, and heartbeat timing can be tested without sleeping.

use std::{
    fmt::Debug,
    ops::{Add, Sub},
    time::Duration,
};

/// Monotonic point in time usable by the state machines.
///
/// Blanket-implemented for every type with the required arithmetic, so
/// `std::time::Instant` and simulated instants both qualify.
pub trait Timestamp:
    Copy + Ord + Debug + Send + Sync + Sub<Output = Duration> + Add<Duration, Output = Self>
{
}

impl<T> Timestamp for T where
    T: Copy + Ord + Debug + Send + Sync + Sub<Output = Duration> + Add<Duration, Output = T>
{
}

/// Abstract environment providing time and async sleeping.
///
/// # Invariants
///
/// - `now()` never goes backwards within one execution context.
pub trait Environment: Clone + Send + Sync + 'static {
    /// The instant type used by this environment.
    type Instant: Timestamp;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code sleeps; state machines take `now` as a parameter.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;
}
