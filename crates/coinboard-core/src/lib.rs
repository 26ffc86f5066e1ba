//! Coinboard session core
//!
//! Pure state machines behind the dashboard's single shared real-time
//! connection. Nothing here performs I/O: every method takes the current
//! time and returns actions for a driver to execute.
//!
//! # Components
//!
//! - [`ConnectionManager`]: connection lifecycle, subscription replay,
//!   heart-beats, and backoff
//! - [`SubscriptionRegistry`]: topic to handler mapping that survives drops
//! - [`ReconnectionPolicy`]: capped exponential backoff
//! - [`RateLimiter`]: sliding-window send limiter with cooldown
//! - [`StateBroadcaster`]: deduplicating connection state fan-out

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod broadcast;
pub mod connection;
pub mod env;
pub mod error;
pub mod rate_limit;
pub mod reconnect;
pub mod registry;

pub use broadcast::{
    ConnectionSnapshot, ConnectionState, ListenerId, StateBroadcaster, StateListener,
};
pub use connection::{ConnectionAction, ConnectionManager, HeartBeat, SessionConfig};
pub use env::{Environment, Timestamp};
pub use error::{ConnectError, PublishError, SessionError};
pub use rate_limit::{Denial, RateLimitConfig, RateLimiter};
pub use reconnect::ReconnectionPolicy;
pub use registry::{MessageHandler, SubscriptionRegistry};
