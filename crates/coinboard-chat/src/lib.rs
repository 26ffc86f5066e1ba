//! Coinboard chat stream
//!
//! Sans-IO controller for one live chat session on the shared connection:
//! bidirectional pagination, live append, scroll anchoring, and send
//! throttling.
//!
//! # Components
//!
//! - [`ChatStreamController`]: the session state machine
//! - [`PaginationCursor`]: history position and in-flight guard
//! - [`scroll`]: pure viewport and anchor arithmetic

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod controller;
pub mod cursor;
pub mod scroll;

pub use controller::{ChatAction, ChatConfig, ChatNotice, ChatPhase, ChatStreamController};
pub use cursor::PaginationCursor;
pub use scroll::{Anchor, Viewport};
