//! Deterministic simulation harness for the coinboard session runtime.
//!
//! Virtual-clock implementations of the Environment and Driver traits and a
//! scripted broker, so reconnects, timeouts, and pagination run the real
//! [`coinboard_client::Runtime`] reproducibly.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks properties that must hold after every
//! event: subscriptions mirror the registry, the broker agrees with the
//! client, failures stay within policy, and keep-alives never reach the chat
//! buffer. [`Simulation`] checks them automatically.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod scenario;
pub mod sim_driver;
pub mod sim_env;
pub mod sim_server;

pub use invariants::{
    ActiveMatchesRegistry, BrokerAgrees, FailuresWithinPolicy, Invariant, InvariantRegistry,
    InvariantResult, NoBufferedHeartbeats, SystemSnapshot, ViewportInBounds, Violation,
};
pub use scenario::{MAX_SETTLE_EVENTS, SimResult, Simulation};
pub use sim_driver::{ROW_HEIGHT, Request, SimDriver, SimDriverError};
pub use sim_env::{SimEnv, SimInstant};
pub use sim_server::SimServer;
