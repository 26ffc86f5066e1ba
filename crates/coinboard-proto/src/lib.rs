//! Coinboard wire protocol
//!
//! Text frames for the shared real-time channel and the JSON payloads the
//! dashboard exchanges over it and over its companion HTTP endpoints.
//!
//! # Components
//!
//! - [`Frame`]: STOMP-style text frame with command, headers, and body
//! - [`Message`]: envelope handed to topic subscribers
//! - [`payloads`]: chat, history, and credential JSON shapes

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
pub mod frame;
pub mod message;
pub mod payloads;

pub use errors::ProtocolError;
pub use frame::{Command, Frame, HEARTBEAT, MAX_BODY_SIZE};
pub use message::Message;
pub use payloads::{ChatMessage, ChatOutbound, Credential, HistoryRequest};
