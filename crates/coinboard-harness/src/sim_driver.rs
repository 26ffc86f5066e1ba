//! Simulation driver implementing the Driver trait.
//!
//! `SimDriver` stands in for the WebSocket driver. It records every request
//! the runtime makes and either answers from an attached [`SimServer`] or
//! leaves the answers to the test. Clones share state, so a test keeps a
//! handle while the runtime owns the driver.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use coinboard_chat::ChatNotice;
use coinboard_client::{Driver, DriverEvent};
use coinboard_core::{ConnectionSnapshot, Environment};
use coinboard_proto::{ChatMessage, Credential, Frame, HistoryRequest, Message};

use crate::{
    sim_env::{SimEnv, SimInstant},
    sim_server::SimServer,
};

/// Rendered height of one chat row.
pub const ROW_HEIGHT: u32 = 20;

/// Error type for simulation driver.
#[derive(Debug, Clone)]
pub struct SimDriverError(pub String);

impl std::fmt::Display for SimDriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimDriverError: {}", self.0)
    }
}

impl std::error::Error for SimDriverError {}

/// A request the runtime made through the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Credential fetch.
    FetchCredential,
    /// Transport open.
    OpenTransport(String),
    /// Transport close.
    CloseTransport,
    /// History fetch.
    FetchHistory(HistoryRequest),
}

struct SharedState {
    pending: VecDeque<DriverEvent>,
    server: Option<SimServer>,
    network_up: bool,
    credential: Result<Credential, String>,
    history_failure: Option<String>,
    transport_open: bool,
    requests: Vec<Request>,
    sent: Vec<String>,
    notices: Vec<ChatNotice>,
    snapshots: Vec<ConnectionSnapshot>,
    scrolls: Vec<u32>,
    topic_messages: Vec<Message>,
    renders: usize,
    stopped: bool,
}

impl SharedState {
    fn new(server: Option<SimServer>) -> Self {
        Self {
            pending: VecDeque::new(),
            server,
            network_up: true,
            credential: Ok(Credential::new("X-XSRF-TOKEN", "sim-token")),
            history_failure: None,
            transport_open: false,
            requests: Vec::new(),
            sent: Vec::new(),
            notices: Vec::new(),
            snapshots: Vec::new(),
            scrolls: Vec::new(),
            topic_messages: Vec::new(),
            renders: 0,
            stopped: false,
        }
    }

    fn deliver(&mut self, texts: Vec<String>) {
        if self.transport_open {
            self.pending.extend(texts.into_iter().map(DriverEvent::TextReceived));
        }
    }
}

/// Simulation driver for deterministic testing.
///
/// Implements [`Driver`] so the same [`coinboard_client::Runtime`] runs in
/// production and in simulation.
#[derive(Clone)]
pub struct SimDriver {
    env: SimEnv,
    state: Arc<Mutex<SharedState>>,
}

impl SimDriver {
    /// Driver with no broker. The test answers every request by injecting
    /// events.
    pub fn manual(env: SimEnv) -> Self {
        Self { env, state: Arc::new(Mutex::new(SharedState::new(None))) }
    }

    /// Driver wired to `server`. Requests are answered as soon as they are
    /// made.
    pub fn with_server(env: SimEnv, server: SimServer) -> Self {
        Self { env, state: Arc::new(Mutex::new(SharedState::new(Some(server)))) }
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The shared virtual clock.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Queue an event.
    pub fn inject(&self, event: DriverEvent) {
        self.lock().pending.push_back(event);
    }

    /// Queue a frame as received text.
    pub fn inject_frame(&self, frame: &Frame) {
        match frame.encode() {
            Ok(text) => self.inject(DriverEvent::TextReceived(text)),
            Err(e) => tracing::warn!(error = %e, "injected frame not encodable"),
        }
    }

    /// Pop the next queued event.
    pub fn take_event(&self) -> Option<DriverEvent> {
        self.lock().pending.pop_front()
    }

    /// Whether events are waiting.
    pub fn has_pending(&self) -> bool {
        !self.lock().pending.is_empty()
    }

    /// Run `f` against the attached broker.
    pub fn server<R>(&self, f: impl FnOnce(&mut SimServer) -> R) -> Option<R> {
        self.lock().server.as_mut().map(f)
    }

    /// Another participant posts to `topic`.
    pub fn push_chat(&self, topic: &str, sender: &str, content: &str) {
        let mut state = self.lock();
        let texts = state
            .server
            .as_mut()
            .map(|server| server.publish_chat(topic, sender, content))
            .unwrap_or_default();
        state.deliver(texts);
    }

    /// Broker pushes `body` to `topic`.
    pub fn push(&self, topic: &str, body: &str) {
        let mut state = self.lock();
        let texts =
            state.server.as_mut().map(|server| server.publish(topic, body)).unwrap_or_default();
        state.deliver(texts);
    }

    /// Kill the transport as a network fault would.
    pub fn drop_connection(&self) {
        let mut state = self.lock();
        if state.transport_open {
            state.transport_open = false;
            state.pending.push_back(DriverEvent::TransportClosed { clean: false });
        }
    }

    /// Make new transports fail to open (or succeed again).
    pub fn set_network(&self, up: bool) {
        self.lock().network_up = up;
    }

    /// Answer subsequent credential fetches with `result`.
    pub fn set_credential(&self, result: Result<Credential, String>) {
        self.lock().credential = result;
    }

    /// Fail the next history fetch.
    pub fn fail_next_history(&self, detail: &str) {
        self.lock().history_failure = Some(detail.to_string());
    }

    /// Whether a transport is open.
    pub fn is_transport_open(&self) -> bool {
        self.lock().transport_open
    }

    /// Requests made so far.
    pub fn requests(&self) -> Vec<Request> {
        self.lock().requests.clone()
    }

    /// Transport opens requested so far.
    pub fn open_count(&self) -> usize {
        self.lock().requests.iter().filter(|r| matches!(r, Request::OpenTransport(_))).count()
    }

    /// Raw text sent, heart-beats included.
    pub fn sent_texts(&self) -> Vec<String> {
        self.lock().sent.clone()
    }

    /// Frames sent, heart-beats excluded.
    pub fn sent_frames(&self) -> Vec<Frame> {
        self.lock().sent.iter().filter_map(|text| Frame::decode(text).ok().flatten()).collect()
    }

    /// Forget everything sent so far.
    pub fn clear_sent(&self) {
        self.lock().sent.clear();
    }

    /// Notices shown so far.
    pub fn notices(&self) -> Vec<ChatNotice> {
        self.lock().notices.clone()
    }

    /// Connection snapshots delivered so far.
    pub fn snapshots(&self) -> Vec<ConnectionSnapshot> {
        self.lock().snapshots.clone()
    }

    /// Scroll offsets applied so far.
    pub fn scrolls(&self) -> Vec<u32> {
        self.lock().scrolls.clone()
    }

    /// Messages delivered on non-chat topics.
    pub fn topic_messages(&self) -> Vec<Message> {
        self.lock().topic_messages.clone()
    }

    /// Number of renders.
    pub fn renders(&self) -> usize {
        self.lock().renders
    }

    /// Whether `stop` was called.
    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }
}

impl std::fmt::Debug for SimDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("SimDriver")
            .field("now", &self.env.instant())
            .field("pending", &state.pending.len())
            .field("transport_open", &state.transport_open)
            .finish_non_exhaustive()
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;
    type Instant = SimInstant;

    async fn poll_event(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<DriverEvent>, Self::Error> {
        let event = self.lock().pending.pop_front();
        if event.is_some() {
            return Ok(event);
        }

        // Nothing queued: jump straight to the deadline
        if let Some(timeout) = timeout {
            self.env.sleep(timeout).await;
        }
        Ok(None)
    }

    fn now(&self) -> Self::Instant {
        self.env.now()
    }

    fn fetch_credential(&mut self, attempt: u64) -> Result<(), Self::Error> {
        let mut state = self.lock();
        state.requests.push(Request::FetchCredential);
        if state.server.is_some() {
            let result = state.credential.clone();
            state.pending.push_back(DriverEvent::CredentialFetched { attempt, result });
        }
        Ok(())
    }

    fn open_transport(&mut self, url: &str) -> Result<(), Self::Error> {
        let mut state = self.lock();
        state.requests.push(Request::OpenTransport(url.to_string()));
        state.transport_open = false;

        let network_up = state.network_up;
        let Some(server) = state.server.as_mut() else {
            return Ok(());
        };
        server.reset_transport();

        if network_up {
            state.transport_open = true;
            state.pending.push_back(DriverEvent::TransportOpened);
        } else {
            state.pending.push_back(DriverEvent::TransportError("host unreachable".to_string()));
        }
        Ok(())
    }

    fn send_text(&mut self, text: String) -> Result<(), Self::Error> {
        let mut state = self.lock();
        if state.server.is_some() && !state.transport_open {
            return Err(SimDriverError("transport not open".to_string()));
        }

        let replies =
            state.server.as_mut().map(|server| server.receive(&text)).unwrap_or_default();
        state.sent.push(text);
        state.deliver(replies);
        Ok(())
    }

    fn close_transport(&mut self) {
        let mut state = self.lock();
        state.requests.push(Request::CloseTransport);
        state.transport_open = false;
    }

    fn fetch_history(&mut self, request: HistoryRequest) -> Result<(), Self::Error> {
        let mut state = self.lock();
        state.requests.push(Request::FetchHistory(request));

        let result = match state.history_failure.take() {
            Some(detail) => Err(detail),
            None => match &state.server {
                Some(server) => Ok(server.history_page(request)),
                None => return Ok(()),
            },
        };
        state.pending.push_back(DriverEvent::HistoryLoaded { page: request.page, result });
        Ok(())
    }

    fn render(&mut self, messages: &VecDeque<ChatMessage>) -> Result<Option<u32>, Self::Error> {
        self.lock().renders += 1;
        Ok(Some(messages.len() as u32 * ROW_HEIGHT))
    }

    fn scroll_to(&mut self, offset: u32) {
        self.lock().scrolls.push(offset);
    }

    fn notify(&mut self, notice: &ChatNotice) {
        self.lock().notices.push(notice.clone());
    }

    fn connection_changed(&mut self, snapshot: &ConnectionSnapshot) {
        self.lock().snapshots.push(snapshot.clone());
    }

    fn topic_message(&mut self, message: &Message) {
        self.lock().topic_messages.push(message.clone());
    }

    fn stop(&mut self) {
        let mut state = self.lock();
        state.stopped = true;
        state.transport_open = false;
    }
}
