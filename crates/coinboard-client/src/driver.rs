//! Driver trait for abstracting I/O operations.
//!
//! The [`Driver`] trait decouples the runtime from specific I/O
//! implementations. The production driver talks WebSocket and HTTP; the
//! simulation driver records requests and replays scripted events. The
//! generic [`crate::Runtime`] handles all orchestration in both.

use std::{collections::VecDeque, future::Future, time::Duration};

use coinboard_chat::{ChatNotice, Viewport};
use coinboard_core::{ConnectionSnapshot, Timestamp};
use coinboard_proto::{ChatMessage, Credential, HistoryRequest, Message};

/// Something that happened outside the state machines.
///
/// Completions of requests the runtime issued (credential, transport,
/// history) and user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// Credential fetch finished for the given attempt.
    CredentialFetched {
        /// Attempt passed to [`Driver::fetch_credential`]
        attempt: u64,
        /// Fetched credential or failure detail
        result: Result<Credential, String>,
    },
    /// Transport finished opening.
    TransportOpened,
    /// Raw text received on the transport.
    TextReceived(String),
    /// Transport closed.
    TransportClosed {
        /// Closed with a normal close code.
        clean: bool,
    },
    /// Transport failed.
    TransportError(String),
    /// History fetch finished.
    HistoryLoaded {
        /// Page that was requested.
        page: u32,
        /// Messages, oldest first, or the failure detail.
        result: Result<Vec<ChatMessage>, String>,
    },
    /// Message list scrolled or resized.
    Viewport(Viewport),
    /// Message list re-measured after a render.
    Layout(u32),
    /// User reached the top of the message list.
    ScrolledToTop,
    /// User submitted a chat message.
    Submit(String),
    /// User asked to reconnect.
    Reconnect,
    /// User asked to quit.
    Quit,
}

/// Abstracts I/O operations for the runtime.
///
/// Request methods (`fetch_credential`, `open_transport`, `fetch_history`)
/// return immediately; their outcome arrives later through
/// [`poll_event`](Driver::poll_event).
///
/// # Associated Types
///
/// - [`Error`](Driver::Error): Platform-specific error type
/// - [`Instant`](Driver::Instant): Time representation (real or virtual)
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Time instant type. Enables virtual time in simulation.
    type Instant: Timestamp;

    /// Wait up to `timeout` for the next event.
    ///
    /// Returns `None` if the timeout elapsed first. A `None` timeout means
    /// nothing is scheduled; the driver may wait indefinitely.
    fn poll_event(
        &mut self,
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<Option<DriverEvent>, Self::Error>> + Send;

    /// Current time instant.
    fn now(&self) -> Self::Instant;

    /// Start fetching a handshake credential; the completion must carry
    /// `attempt` back.
    fn fetch_credential(&mut self, attempt: u64) -> Result<(), Self::Error>;

    /// Start opening the transport, replacing any existing one.
    fn open_transport(&mut self, url: &str) -> Result<(), Self::Error>;

    /// Send text on the open transport.
    ///
    /// # Errors
    ///
    /// Returns an error if no transport is open.
    fn send_text(&mut self, text: String) -> Result<(), Self::Error>;

    /// Close the transport, if any. Its close is not reported back.
    fn close_transport(&mut self);

    /// Start fetching a history page.
    fn fetch_history(&mut self, request: HistoryRequest) -> Result<(), Self::Error>;

    /// Render the chat buffer.
    ///
    /// Returns the new content extent if layout is synchronous; otherwise
    /// the driver reports it later as [`DriverEvent::Layout`].
    fn render(&mut self, messages: &VecDeque<ChatMessage>) -> Result<Option<u32>, Self::Error>;

    /// Move the chat viewport.
    fn scroll_to(&mut self, offset: u32);

    /// Show a user-facing chat notice.
    fn notify(&mut self, notice: &ChatNotice);

    /// Connection state changed.
    fn connection_changed(&mut self, snapshot: &ConnectionSnapshot);

    /// Message arrived on a non-chat topic.
    fn topic_message(&mut self, message: &Message);

    /// Stop all I/O and clean up resources.
    fn stop(&mut self);
}
