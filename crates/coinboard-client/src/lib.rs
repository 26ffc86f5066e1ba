//! Client runtime
//!
//! Composes the shared session ([`coinboard_core::ConnectionManager`]) and
//! the chat stream ([`coinboard_chat::ChatStreamController`]) into one event
//! loop over a pluggable [`Driver`].
//!
//! # Architecture
//!
//! Both state machines are Sans-IO. The [`Runtime`] feeds them driver
//! events, executes the actions they return through the driver, and
//! forwards dispatched messages and state snapshots. The same runtime runs
//! against the production driver and the simulation driver.
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::WsDriver`]: WebSocket + HTTP driver
//! - [`transport::Presenter`]: UI surface the driver renders into

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod driver;
mod error;
mod runtime;
mod system_env;

#[cfg(feature = "transport")]
pub mod transport;

pub use driver::{Driver, DriverEvent};
pub use error::RuntimeError;
pub use runtime::Runtime;
pub use system_env::SystemEnv;
