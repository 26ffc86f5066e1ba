//! Generic runtime for session orchestration.
//!
//! The Runtime is the single event loop. It composes:
//! - [`ConnectionManager`]: the shared connection and its subscriptions
//! - [`ChatStreamController`]: the chat session on top of it
//! - [`Driver`]: platform-specific I/O
//!
//! Every event runs to completion, including the actions it produces and
//! any messages those actions dispatched, before the next event is polled.

use std::{collections::VecDeque, time::Duration};

use coinboard_chat::{ChatAction, ChatConfig, ChatNotice, ChatStreamController};
use coinboard_core::{ConnectionAction, ConnectionManager, ConnectionSnapshot, SessionConfig};
use coinboard_proto::{HEARTBEAT, Message};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::{Driver, DriverEvent, RuntimeError};

/// Generic runtime that orchestrates the session, the chat controller, and
/// a driver.
pub struct Runtime<D: Driver> {
    driver: D,
    session: ConnectionManager<D::Instant>,
    chat: ChatStreamController<D::Instant>,
    chat_tx: UnboundedSender<Message>,
    chat_rx: UnboundedReceiver<Message>,
    topic_tx: UnboundedSender<Message>,
    topic_rx: UnboundedReceiver<Message>,
    state_rx: UnboundedReceiver<ConnectionSnapshot>,
    running: bool,
    stopped: bool,
}

impl<D: Driver> Runtime<D> {
    /// Create a runtime. Nothing happens until [`start`](Self::start).
    pub fn new(driver: D, session: SessionConfig, chat: ChatConfig) -> Self {
        let mut session = ConnectionManager::new(session);
        let (state_tx, state_rx) = mpsc::unbounded_channel();
        session.add_listener(Box::new(state_tx));

        let (chat_tx, chat_rx) = mpsc::unbounded_channel();
        let (topic_tx, topic_rx) = mpsc::unbounded_channel();

        Self {
            driver,
            session,
            chat: ChatStreamController::new(chat),
            chat_tx,
            chat_rx,
            topic_tx,
            topic_rx,
            state_rx,
            running: false,
            stopped: false,
        }
    }

    /// The connection manager.
    pub fn session(&self) -> &ConnectionManager<D::Instant> {
        &self.session
    }

    /// The chat controller.
    pub fn chat(&self) -> &ChatStreamController<D::Instant> {
        &self.chat
    }

    /// The driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// The driver, mutably.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Connect and mount the chat session.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to start a request.
    pub fn start(&mut self) -> Result<(), RuntimeError<D::Error>> {
        if self.stopped {
            return Err(RuntimeError::Stopped);
        }
        if self.running {
            return Ok(());
        }
        self.running = true;

        let now = self.driver.now();
        tracing::info!(url = %self.session.config().url, "runtime starting");
        self.connect(now)?;
        let actions = self.chat.mount(now);
        self.execute_chat(actions)?;
        self.drain()
    }

    /// Subscribe to an extra topic; its messages go to
    /// [`Driver::topic_message`].
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to send.
    pub fn subscribe_topic(&mut self, topic: &str) -> Result<(), RuntimeError<D::Error>> {
        let actions = self.session.subscribe(topic, Box::new(self.topic_tx.clone()));
        self.execute_session(actions)
    }

    /// Unsubscribe from an extra topic.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to send.
    pub fn unsubscribe_topic(&mut self, topic: &str) -> Result<(), RuntimeError<D::Error>> {
        let actions = self.session.unsubscribe(topic);
        self.execute_session(actions)
    }

    /// Unmount the chat, disconnect, and stop the driver.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails while unsubscribing.
    pub fn stop(&mut self) -> Result<(), RuntimeError<D::Error>> {
        if self.stopped {
            return Ok(());
        }

        let actions = self.chat.unmount();
        self.execute_chat(actions)?;
        let actions = self.session.disconnect();
        self.execute_session(actions)?;
        self.drain()?;

        self.driver.stop();
        self.running = false;
        self.stopped = true;
        tracing::info!("runtime stopped");
        Ok(())
    }

    /// Run until the driver reports [`DriverEvent::Quit`].
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn run(&mut self) -> Result<(), RuntimeError<D::Error>> {
        self.start()?;
        while self.step().await? {}
        self.stop()
    }

    /// Process one cycle: wait for an event or the next deadline, handle
    /// it, then run timers.
    ///
    /// Returns `false` once the driver asked to quit.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn step(&mut self) -> Result<bool, RuntimeError<D::Error>> {
        if self.stopped {
            return Err(RuntimeError::Stopped);
        }

        let timeout = self.next_timeout();
        let event = self.driver.poll_event(timeout).await.map_err(RuntimeError::Driver)?;
        if let Some(event) = event {
            if !self.handle_event(event)? {
                return Ok(false);
            }
        }

        self.tick()?;
        Ok(true)
    }

    /// Handle one driver event to completion.
    ///
    /// Returns `false` for [`DriverEvent::Quit`].
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails while executing actions.
    pub fn handle_event(&mut self, event: DriverEvent) -> Result<bool, RuntimeError<D::Error>> {
        let now = self.driver.now();

        match event {
            DriverEvent::CredentialFetched { attempt, result } => {
                let actions = self.session.handle_credential(attempt, result, now);
                self.execute_session(actions)?;
            },
            DriverEvent::TransportOpened => {
                let actions = self.session.handle_transport_open(now);
                self.execute_session(actions)?;
            },
            DriverEvent::TextReceived(text) => {
                let actions = self.session.handle_incoming(&text, now);
                self.execute_session(actions)?;
            },
            DriverEvent::TransportClosed { clean } => {
                let actions = self.session.handle_transport_closed(clean, now);
                self.execute_session(actions)?;
            },
            DriverEvent::TransportError(detail) => {
                let actions = self.session.handle_transport_error(detail, now);
                self.execute_session(actions)?;
            },
            DriverEvent::HistoryLoaded { page, result } => {
                let actions = self.chat.handle_history(page, result);
                self.execute_chat(actions)?;
            },
            DriverEvent::Viewport(viewport) => self.chat.handle_viewport(viewport),
            DriverEvent::Layout(extent) => {
                let actions = self.chat.handle_layout(extent);
                self.execute_chat(actions)?;
            },
            DriverEvent::ScrolledToTop => {
                let actions = self.chat.scrolled_to_top();
                self.execute_chat(actions)?;
            },
            DriverEvent::Submit(content) => {
                let actions = self.chat.submit(&content, now, self.session.is_connected());
                self.execute_chat(actions)?;
            },
            DriverEvent::Reconnect => self.connect(now)?,
            DriverEvent::Quit => {
                tracing::info!("quit requested");
                return Ok(false);
            },
        }

        self.drain()?;
        Ok(true)
    }

    /// Run timers of both state machines.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails while executing actions.
    pub fn tick(&mut self) -> Result<(), RuntimeError<D::Error>> {
        let now = self.driver.now();
        let actions = self.session.tick(now);
        self.execute_session(actions)?;

        let actions = self.chat.tick(now, self.session.is_connected());
        self.execute_chat(actions)?;
        self.drain()
    }

    fn next_timeout(&self) -> Option<Duration> {
        let deadline = match (self.session.next_deadline(), self.chat.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }?;
        let now = self.driver.now();
        Some(if deadline > now { deadline - now } else { Duration::ZERO })
    }

    fn connect(&mut self, now: D::Instant) -> Result<(), RuntimeError<D::Error>> {
        match self.session.connect(now) {
            Ok(actions) => self.execute_session(actions),
            Err(e) => {
                tracing::debug!(error = %e, "connect refused");
                Ok(())
            },
        }
    }

    fn execute_session(
        &mut self,
        actions: Vec<ConnectionAction>,
    ) -> Result<(), RuntimeError<D::Error>> {
        for action in actions {
            match action {
                ConnectionAction::FetchCredential { attempt } => {
                    self.driver.fetch_credential(attempt).map_err(RuntimeError::Driver)?;
                },
                ConnectionAction::OpenTransport { url } => {
                    self.driver.open_transport(&url).map_err(RuntimeError::Driver)?;
                },
                ConnectionAction::SendFrame(frame) => match frame.encode() {
                    Ok(text) => self.send(text)?,
                    Err(e) => tracing::warn!(command = %frame.command, error = %e, "frame not sent"),
                },
                ConnectionAction::SendHeartbeat => {
                    self.send(HEARTBEAT.to_string())?;
                },
                ConnectionAction::CloseTransport => self.driver.close_transport(),
            }
        }
        Ok(())
    }

    fn send(&mut self, text: String) -> Result<(), RuntimeError<D::Error>> {
        if let Err(e) = self.driver.send_text(text) {
            let now = self.driver.now();
            // A send on a dead transport is a transport failure, not a
            // runtime failure
            let actions = self.session.handle_transport_error(e.to_string(), now);
            return self.execute_session(actions);
        }
        Ok(())
    }

    fn execute_chat(&mut self, actions: Vec<ChatAction>) -> Result<(), RuntimeError<D::Error>> {
        let mut pending = VecDeque::from(actions);

        while let Some(action) = pending.pop_front() {
            match action {
                ChatAction::Subscribe { topic } => {
                    let actions = self.session.subscribe(topic, Box::new(self.chat_tx.clone()));
                    self.execute_session(actions)?;
                },
                ChatAction::Unsubscribe { topic } => {
                    let actions = self.session.unsubscribe(&topic);
                    self.execute_session(actions)?;
                },
                ChatAction::FetchHistory(request) => {
                    self.driver.fetch_history(request).map_err(RuntimeError::Driver)?;
                },
                ChatAction::Publish { destination, body } => {
                    match self.session.publish(&destination, body, &[]) {
                        Ok(actions) => self.execute_session(actions)?,
                        Err(e) => {
                            tracing::warn!(error = %e, %destination, "chat publish failed");
                            self.driver.notify(&ChatNotice::SendFailed);
                        },
                    }
                },
                ChatAction::Reconnect => {
                    let now = self.driver.now();
                    self.connect(now)?;
                },
                ChatAction::ScrollTo(offset) => self.driver.scroll_to(offset),
                ChatAction::Notify(notice) => self.driver.notify(&notice),
                ChatAction::Render => {
                    let extent = self
                        .driver
                        .render(self.chat.messages())
                        .map_err(RuntimeError::Driver)?;
                    if let Some(extent) = extent {
                        pending.extend(self.chat.handle_layout(extent));
                    }
                },
            }
        }
        Ok(())
    }

    /// Deliver everything the session dispatched into the channels.
    fn drain(&mut self) -> Result<(), RuntimeError<D::Error>> {
        loop {
            while let Ok(snapshot) = self.state_rx.try_recv() {
                self.driver.connection_changed(&snapshot);
            }
            while let Ok(message) = self.topic_rx.try_recv() {
                self.driver.topic_message(&message);
            }
            // Chat actions can reach the session and queue more snapshots
            let Ok(message) = self.chat_rx.try_recv() else {
                return Ok(());
            };
            let actions = self.chat.handle_message(&message);
            self.execute_chat(actions)?;
        }
    }
}

impl<D: Driver> Drop for Runtime<D> {
    fn drop(&mut self) {
        if self.running && !self.stopped {
            self.driver.stop();
        }
    }
}

impl<D: Driver> std::fmt::Debug for Runtime<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("session", &self.session)
            .field("chat", &self.chat)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}
