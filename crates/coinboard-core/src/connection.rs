//! Shared session state machine.
//!
//! One [`ConnectionManager`] owns the single logical connection for the
//! whole process. Uses the action pattern: methods take time as input and
//! return actions for the driver to execute, so the manager does no I/O and
//! is tested with a virtual clock.
//!
//! # State Machine
//!
//! ```text
//!            connect            credential           transport open
//! ┌──────┐ ────────> ┌──────────────────────┐ ─────> ┌─────────┐ ─────> ┌─────────────┐
//! │ Idle │           │ AwaitingCredential   │        │ Opening │        │ Handshaking │
//! └──────┘           └──────────────────────┘        └─────────┘        └─────────────┘
//!    ^                        │ failure                   │ failure        │ CONNECTED   │ ERROR
//!    │ disconnect             v                           v                v             v
//!    │               ┌──────────────────┐   deadline  ┌───────────┐   ┌────────┐
//!    └────────────── │ ReconnectPending │ <────────── │ Connected │   │ Halted │
//!                    └──────────────────┘   failure   └───────────┘   └────────┘
//! ```
//!
//! Consecutive failures past the policy ceiling also end in `Halted`. Only an
//! explicit [`ConnectionManager::connect`] leaves it.

use std::{collections::BTreeMap, time::Duration};

use coinboard_proto::{Command, Credential, Frame, MAX_BODY_SIZE, Message, ProtocolError};

use crate::{
    broadcast::{ConnectionSnapshot, ConnectionState, ListenerId, StateBroadcaster, StateListener},
    env::Timestamp,
    error::{ConnectError, PublishError, SessionError},
    reconnect::ReconnectionPolicy,
    registry::{MessageHandler, SubscriptionRegistry},
};

/// Time allowed from the start of an attempt until CONNECTED arrives.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimum spacing between two connection attempts.
pub const DEFAULT_MIN_CONNECT_INTERVAL: Duration = Duration::from_secs(1);

/// Heart-beat interval offered in both directions.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Protocol version sent in `accept-version`.
pub const PROTOCOL_VERSION: &str = "1.2";

/// Actions returned by the connection manager.
///
/// The driver executes these in order:
/// - `FetchCredential`: request a handshake credential, report via
///   [`ConnectionManager::handle_credential`] with the same `attempt`
/// - `OpenTransport`: open the WebSocket, report via
///   [`ConnectionManager::handle_transport_open`]
/// - `SendFrame`: encode and send the frame
/// - `SendHeartbeat`: send a bare EOL
/// - `CloseTransport`: tear the transport down without reporting back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Fetch a credential for the handshake
    FetchCredential {
        /// Attempt the credential belongs to
        attempt: u64,
    },

    /// Open the transport to this URL
    OpenTransport {
        /// Endpoint to connect to
        url: String,
    },

    /// Send this frame to the server
    SendFrame(Frame),

    /// Send a heart-beat EOL
    SendHeartbeat,

    /// Close the transport
    CloseTransport,
}

/// Heart-beat intervals offered during the handshake.
///
/// Zero disables the direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartBeat {
    /// Smallest interval at which we can send.
    pub outgoing: Duration,
    /// Interval at which we would like to receive.
    pub incoming: Duration,
}

impl Default for HeartBeat {
    fn default() -> Self {
        Self { outgoing: DEFAULT_HEARTBEAT_INTERVAL, incoming: DEFAULT_HEARTBEAT_INTERVAL }
    }
}

impl HeartBeat {
    /// Value of the `heart-beat` header (`"<outgoing-ms>,<incoming-ms>"`).
    pub fn header_value(&self) -> String {
        format!("{},{}", self.outgoing.as_millis(), self.incoming.as_millis())
    }

    /// Negotiate against the server's `heart-beat` header.
    ///
    /// Returns `(outgoing, incoming)`. A direction is active only when both
    /// sides offer a non-zero value; the interval is the larger of the two.
    /// A missing or malformed header disables both directions.
    pub fn negotiate(&self, server: Option<&str>) -> (Option<Duration>, Option<Duration>) {
        let (server_out, server_in) = server.and_then(parse_heart_beat).unwrap_or_default();
        let pick = |ours: Duration, theirs: Duration| {
            (!ours.is_zero() && !theirs.is_zero()).then(|| ours.max(theirs))
        };
        (pick(self.outgoing, server_in), pick(self.incoming, server_out))
    }
}

fn parse_heart_beat(value: &str) -> Option<(Duration, Duration)> {
    let (out, inc) = value.split_once(',')?;
    let out = out.trim().parse().ok()?;
    let inc = inc.trim().parse().ok()?;
    Some((Duration::from_millis(out), Duration::from_millis(inc)))
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket endpoint.
    pub url: String,
    /// Value of the `host` header in CONNECT.
    pub host: String,
    /// Fetch a credential before every attempt.
    pub require_credential: bool,
    /// Heart-beat offer.
    pub heart_beat: HeartBeat,
    /// Limit on credential fetch, transport open, and handshake combined.
    pub connect_timeout: Duration,
    /// Calls to `connect` closer together than this are refused.
    pub min_connect_interval: Duration,
    /// Backoff between automatic attempts, and the failure ceiling.
    pub reconnect: ReconnectionPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080/ws".to_string(),
            host: "localhost".to_string(),
            require_credential: true,
            heart_beat: HeartBeat::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            min_connect_interval: DEFAULT_MIN_CONNECT_INTERVAL,
            reconnect: ReconnectionPolicy::default(),
        }
    }
}

/// Internal phase. Collapsed to [`ConnectionState`] for listeners.
#[derive(Debug, Clone)]
enum Phase<I> {
    Idle,
    AwaitingCredential {
        attempt: u64,
        since: I,
    },
    Opening {
        since: I,
        credential: Option<Credential>,
    },
    Handshaking {
        since: I,
    },
    Connected {
        outgoing: Option<Duration>,
        incoming: Option<Duration>,
        last_sent: I,
        last_received: I,
    },
    ReconnectPending {
        attempt: u32,
        deadline: I,
    },
    Halted,
}

impl<I> Phase<I> {
    fn public(&self) -> ConnectionState {
        match self {
            Self::Idle | Self::ReconnectPending { .. } | Self::Halted => {
                ConnectionState::Disconnected
            },
            Self::AwaitingCredential { .. } | Self::Opening { .. } | Self::Handshaking { .. } => {
                ConnectionState::Connecting
            },
            Self::Connected { .. } => ConnectionState::Connected,
        }
    }

    fn attempt_started(&self) -> Option<&I> {
        match self {
            Self::AwaitingCredential { since, .. }
            | Self::Opening { since, .. }
            | Self::Handshaking { since } => Some(since),
            _ => None,
        }
    }

    fn transport_open(&self) -> bool {
        matches!(self, Self::Opening { .. } | Self::Handshaking { .. } | Self::Connected { .. })
    }
}

/// Shared connection manager.
///
/// Owns the subscription registry and replays it onto every new transport,
/// so subscribers never re-subscribe after a drop. Generic over the instant
/// type to support virtual time in tests.
#[derive(Debug)]
pub struct ConnectionManager<I> {
    config: SessionConfig,
    phase: Phase<I>,
    registry: SubscriptionRegistry,
    /// Topic to subscription id on the current transport.
    active: BTreeMap<String, String>,
    next_subscription: u64,
    /// Consecutive failed attempts since the last CONNECTED.
    failures: u32,
    /// Sequence number of the latest attempt, echoed by credential results.
    attempt_seq: u64,
    last_attempt: Option<I>,
    last_error: Option<SessionError>,
    broadcaster: StateBroadcaster,
}

impl<I: Timestamp> ConnectionManager<I> {
    /// Idle manager with an empty registry.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            registry: SubscriptionRegistry::new(),
            active: BTreeMap::new(),
            next_subscription: 0,
            failures: 0,
            attempt_seq: 0,
            last_attempt: None,
            last_error: None,
            broadcaster: StateBroadcaster::new(),
        }
    }

    /// Current coarse state.
    pub fn state(&self) -> ConnectionState {
        self.phase.public()
    }

    /// True once the handshake completed on the current transport.
    pub fn is_connected(&self) -> bool {
        matches!(self.phase, Phase::Connected { .. })
    }

    /// True after a rejected handshake or after exhausting retries.
    pub fn is_halted(&self) -> bool {
        matches!(self.phase, Phase::Halted)
    }

    /// Latest snapshot delivered to listeners.
    pub fn snapshot(&self) -> &ConnectionSnapshot {
        self.broadcaster.current()
    }

    /// Consecutive failed attempts since the last successful handshake.
    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Topics registered by subscribers, sorted.
    pub fn registered_topics(&self) -> impl Iterator<Item = &str> + '_ {
        self.registry.topics()
    }

    /// Topics subscribed on the current transport, sorted.
    pub fn active_topics(&self) -> impl Iterator<Item = &str> + '_ {
        self.active.keys().map(String::as_str)
    }

    /// Earliest instant at which [`tick`](Self::tick) has work to do.
    pub fn next_deadline(&self) -> Option<I> {
        match &self.phase {
            Phase::ReconnectPending { deadline, .. } => Some(*deadline),
            Phase::AwaitingCredential { since, .. }
            | Phase::Opening { since, .. }
            | Phase::Handshaking { since } => Some(*since + self.config.connect_timeout),
            Phase::Connected { outgoing, incoming, last_sent, last_received } => {
                let send = outgoing.map(|interval| *last_sent + interval);
                let idle = incoming.map(|interval| *last_received + interval * 2);
                match (send, idle) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                }
            },
            Phase::Idle | Phase::Halted => None,
        }
    }

    /// Register a state listener. It receives the current snapshot
    /// immediately.
    pub fn add_listener(&mut self, listener: Box<dyn StateListener>) -> ListenerId {
        self.broadcaster.register(listener)
    }

    /// Remove a state listener.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.broadcaster.unregister(id)
    }

    /// Start a connection attempt.
    ///
    /// No-op if already connected or an attempt is in flight. Cancels a
    /// pending automatic retry. From `Halted` the failure count is reset, so
    /// this is the way back after a terminal error.
    ///
    /// # Errors
    ///
    /// - `ConnectError::Debounced` if called again within the minimum
    ///   inter-attempt interval
    pub fn connect(&mut self, now: I) -> Result<Vec<ConnectionAction>, ConnectError> {
        if self.phase.attempt_started().is_some() || self.is_connected() {
            tracing::debug!(state = %self.state(), "connect ignored, already active");
            return Ok(vec![]);
        }

        if let Some(last) = self.last_attempt {
            if now - last < self.config.min_connect_interval {
                return Err(ConnectError::Debounced {
                    min_interval: self.config.min_connect_interval,
                });
            }
        }

        if self.is_halted() {
            self.failures = 0;
        }

        Ok(self.begin_attempt(now))
    }

    /// Close the session on purpose.
    ///
    /// Cancels any pending retry and does not schedule another. The registry
    /// is kept, so a later `connect` restores every subscription.
    pub fn disconnect(&mut self) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();
        if self.is_connected() {
            actions.push(ConnectionAction::SendFrame(Frame::disconnect()));
        }
        if self.phase.transport_open() {
            actions.push(ConnectionAction::CloseTransport);
        }

        tracing::info!(state = %self.state(), "disconnecting");
        self.phase = Phase::Idle;
        self.active.clear();
        self.failures = 0;
        self.last_error = None;
        self.broadcast();
        actions
    }

    /// Register `handler` for `topic`.
    ///
    /// Replaces any previous handler. If connected and the topic is not yet
    /// active on this transport, subscribes now; otherwise the subscription
    /// is sent by the replay that follows the next handshake.
    pub fn subscribe(
        &mut self,
        topic: impl Into<String>,
        handler: Box<dyn MessageHandler>,
    ) -> Vec<ConnectionAction> {
        let topic = topic.into();
        if self.registry.upsert(topic.clone(), handler) {
            tracing::debug!(%topic, "subscription handler replaced");
        }

        if self.is_connected() && !self.active.contains_key(&topic) {
            return vec![self.activate(topic)];
        }
        vec![]
    }

    /// Remove the handler for `topic` and unsubscribe on the live transport.
    pub fn unsubscribe(&mut self, topic: &str) -> Vec<ConnectionAction> {
        self.registry.remove(topic);

        match self.active.remove(topic) {
            Some(id) if self.is_connected() => {
                vec![ConnectionAction::SendFrame(Frame::unsubscribe(&id))]
            },
            _ => vec![],
        }
    }

    /// Send `body` to `destination`.
    ///
    /// Publishes are not queued: with no open session the message is
    /// dropped and the caller told so.
    ///
    /// # Errors
    ///
    /// - `PublishError::NotConnected` if the handshake has not completed
    /// - `PublishError::Protocol` if the body exceeds the frame size limit
    pub fn publish(
        &mut self,
        destination: &str,
        body: impl Into<String>,
        headers: &[(&str, &str)],
    ) -> Result<Vec<ConnectionAction>, PublishError> {
        if !self.is_connected() {
            tracing::warn!(%destination, "publish dropped, not connected");
            return Err(PublishError::NotConnected { destination: destination.to_string() });
        }

        let body = body.into();
        if body.len() > MAX_BODY_SIZE {
            return Err(ProtocolError::BodyTooLarge { size: body.len(), max: MAX_BODY_SIZE }.into());
        }

        let frame = headers
            .iter()
            .fold(Frame::send(destination, body), |frame, (name, value)| {
                frame.with_header(*name, *value)
            });
        Ok(vec![ConnectionAction::SendFrame(frame)])
    }

    /// Result of a [`ConnectionAction::FetchCredential`].
    ///
    /// A failed fetch counts as a failed attempt and is retried with
    /// backoff. Results arriving outside an attempt, or for an attempt that
    /// already timed out or failed, are ignored.
    pub fn handle_credential(
        &mut self,
        attempt: u64,
        result: Result<Credential, String>,
        now: I,
    ) -> Vec<ConnectionAction> {
        let since = match self.phase {
            Phase::AwaitingCredential { attempt: current, since } if current == attempt => since,
            _ => {
                tracing::debug!(attempt, state = %self.state(), "stale credential result ignored");
                return vec![];
            },
        };

        match result {
            Ok(credential) => {
                self.phase = Phase::Opening { since, credential: Some(credential) };
                vec![ConnectionAction::OpenTransport { url: self.config.url.clone() }]
            },
            Err(detail) => self.fail(SessionError::CredentialUnavailable(detail), now),
        }
    }

    /// Transport finished opening; send CONNECT.
    pub fn handle_transport_open(&mut self, now: I) -> Vec<ConnectionAction> {
        if !matches!(self.phase, Phase::Opening { .. }) {
            tracing::warn!(state = %self.state(), "transport opened outside an attempt");
            return vec![ConnectionAction::CloseTransport];
        }
        let Phase::Opening { since, credential } = std::mem::replace(&mut self.phase, Phase::Idle)
        else {
            return vec![];
        };

        tracing::debug!(elapsed = ?(now - since), "transport open, sending CONNECT");
        self.phase = Phase::Handshaking { since };

        let mut connect = Frame::new(Command::Connect)
            .with_header("accept-version", PROTOCOL_VERSION)
            .with_header("host", self.config.host.clone())
            .with_header("heart-beat", self.config.heart_beat.header_value());
        if let Some(credential) = credential {
            connect = connect.with_header(credential.header_name, credential.token);
        }

        vec![ConnectionAction::SendFrame(connect)]
    }

    /// Raw text received from the transport.
    ///
    /// Any traffic, including heart-beats, counts as liveness. One text may
    /// carry several frames; each is handled in order. A frame that does not
    /// decode is logged and skipped up to its NUL terminator, so the frames
    /// after it still arrive.
    pub fn handle_incoming(&mut self, text: &str, now: I) -> Vec<ConnectionAction> {
        if let Phase::Connected { last_received, .. } = &mut self.phase {
            *last_received = now;
        }

        let mut actions = Vec::new();
        let mut rest = text;
        loop {
            match Frame::decode_next(rest) {
                Ok(Some((frame, next))) => {
                    actions.extend(self.handle_frame(frame, now));
                    rest = next;
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "undecodable frame dropped");
                    match rest.split_once('\0') {
                        Some((_, next)) => rest = next,
                        None => break,
                    }
                },
            }
        }
        actions
    }

    /// Process one decoded frame.
    pub fn handle_frame(&mut self, frame: Frame, now: I) -> Vec<ConnectionAction> {
        match (&self.phase, frame.command) {
            (Phase::Handshaking { since }, Command::Connected) => {
                let elapsed = now - *since;
                let (outgoing, incoming) =
                    self.config.heart_beat.negotiate(frame.header("heart-beat"));
                tracing::info!(
                    ?elapsed,
                    server = frame.header("server").unwrap_or("unknown"),
                    ?outgoing,
                    ?incoming,
                    "session connected"
                );

                self.phase =
                    Phase::Connected { outgoing, incoming, last_sent: now, last_received: now };
                self.failures = 0;
                self.last_error = None;
                let actions = self.replay();
                self.broadcast();
                actions
            },

            (Phase::Handshaking { .. }, Command::Error) => {
                let reason = error_reason(&frame);
                tracing::error!(%reason, "handshake rejected");

                self.phase = Phase::Halted;
                self.active.clear();
                self.last_error = Some(SessionError::HandshakeRejected(reason));
                self.broadcast();
                vec![ConnectionAction::CloseTransport]
            },

            (Phase::Connected { .. }, Command::Message) => {
                match Message::from_frame(frame) {
                    Ok(message) => {
                        if !self.registry.dispatch(&message) {
                            tracing::debug!(
                                destination = %message.destination,
                                "no subscriber, message dropped"
                            );
                        }
                    },
                    Err(e) => tracing::warn!(error = %e, "malformed MESSAGE dropped"),
                }
                vec![]
            },

            (Phase::Connected { .. }, Command::Receipt) => {
                tracing::debug!(receipt = frame.header("receipt-id"), "receipt");
                vec![]
            },

            (Phase::Connected { .. }, Command::Error) => {
                self.fail(SessionError::Protocol(error_reason(&frame)), now)
            },

            (_, command) => {
                tracing::warn!(%command, state = %self.state(), "unexpected frame dropped");
                vec![]
            },
        }
    }

    /// Transport closed.
    ///
    /// A clean close ends the session without retry. Anything else is a
    /// failure and schedules a reconnect. Closes after the session already
    /// ended (ours, or a late report) are ignored.
    pub fn handle_transport_closed(&mut self, clean: bool, now: I) -> Vec<ConnectionAction> {
        if !self.phase.transport_open() {
            tracing::debug!(state = %self.state(), "transport close ignored");
            return vec![];
        }

        if clean {
            tracing::info!("transport closed cleanly");
            self.phase = Phase::Idle;
            self.active.clear();
            self.broadcast();
            return vec![];
        }

        self.fail(SessionError::Transport("transport closed abnormally".to_string()), now)
    }

    /// Transport reported an error; treated as an abnormal close.
    pub fn handle_transport_error(&mut self, detail: String, now: I) -> Vec<ConnectionAction> {
        if !self.phase.transport_open() {
            tracing::debug!(%detail, state = %self.state(), "transport error ignored");
            return vec![];
        }
        self.fail(SessionError::Transport(detail), now)
    }

    /// Periodic maintenance: retry deadlines, connect timeout, heart-beats,
    /// and idle detection.
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        match self.phase {
            Phase::ReconnectPending { attempt, deadline } if now >= deadline => {
                tracing::info!(attempt, "reconnecting");
                self.begin_attempt(now)
            },

            Phase::AwaitingCredential { since, .. }
            | Phase::Opening { since, .. }
            | Phase::Handshaking { since }
                if now - since > self.config.connect_timeout =>
            {
                self.fail(SessionError::ConnectTimeout { elapsed: now - since }, now)
            },

            Phase::Connected { outgoing, incoming, last_sent, last_received } => {
                if let Some(interval) = incoming {
                    let silent = now - last_received;
                    if silent > interval * 2 {
                        return self.fail(SessionError::IdleTimeout { elapsed: silent }, now);
                    }
                }

                match outgoing {
                    Some(interval) if now - last_sent >= interval => {
                        if let Phase::Connected { last_sent, .. } = &mut self.phase {
                            *last_sent = now;
                        }
                        vec![ConnectionAction::SendHeartbeat]
                    },
                    _ => vec![],
                }
            },

            _ => vec![],
        }
    }

    fn begin_attempt(&mut self, now: I) -> Vec<ConnectionAction> {
        self.last_attempt = Some(now);
        self.active.clear();

        let action = if self.config.require_credential {
            self.attempt_seq += 1;
            let attempt = self.attempt_seq;
            self.phase = Phase::AwaitingCredential { attempt, since: now };
            ConnectionAction::FetchCredential { attempt }
        } else {
            self.phase = Phase::Opening { since: now, credential: None };
            ConnectionAction::OpenTransport { url: self.config.url.clone() }
        };

        self.broadcast();
        vec![action]
    }

    /// Record a failed attempt or a lost session and schedule what follows.
    fn fail(&mut self, error: SessionError, now: I) -> Vec<ConnectionAction> {
        let actions =
            if self.phase.transport_open() { vec![ConnectionAction::CloseTransport] } else { vec![] };

        self.active.clear();
        self.failures = self.failures.saturating_add(1);
        let attempt = self.failures - 1;
        let policy = self.config.reconnect;

        if policy.allows(attempt) {
            let delay = policy.delay(attempt);
            tracing::warn!(%error, attempt, ?delay, "connection lost, reconnect scheduled");
            self.phase = Phase::ReconnectPending { attempt, deadline: now + delay };
            self.last_error = Some(error);
        } else {
            tracing::error!(%error, failures = self.failures, "giving up on reconnect");
            self.phase = Phase::Halted;
            self.last_error = Some(SessionError::Terminal { failures: self.failures });
        }

        self.broadcast();
        actions
    }

    /// SUBSCRIBE every registered topic on the fresh transport.
    fn replay(&mut self) -> Vec<ConnectionAction> {
        let topics: Vec<String> = self.registry.topics().map(str::to_string).collect();
        if !topics.is_empty() {
            tracing::debug!(count = topics.len(), "replaying subscriptions");
        }
        topics.into_iter().map(|topic| self.activate(topic)).collect()
    }

    fn activate(&mut self, topic: String) -> ConnectionAction {
        let id = format!("sub-{}", self.next_subscription);
        self.next_subscription += 1;
        let frame = Frame::subscribe(&id, &topic);
        self.active.insert(topic, id);
        ConnectionAction::SendFrame(frame)
    }

    fn broadcast(&mut self) {
        let snapshot =
            ConnectionSnapshot { state: self.phase.public(), last_error: self.last_error.clone() };
        self.broadcaster.publish(snapshot);
    }
}

fn error_reason(frame: &Frame) -> String {
    frame
        .header("message")
        .map(str::to_string)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| frame.body.trim().to_string())
}
