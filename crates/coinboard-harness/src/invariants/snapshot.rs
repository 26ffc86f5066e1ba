//! Observable state snapshots for invariant checking.

use coinboard_chat::{ChatPhase, Viewport};
use coinboard_client::Runtime;
use coinboard_core::ConnectionState;
use coinboard_proto::ChatMessage;

use crate::sim_driver::SimDriver;

/// Observable state of the runtime and the broker at one instant.
#[derive(Debug, Clone)]
pub struct SystemSnapshot {
    /// Public connection state.
    pub state: ConnectionState,
    /// Topics with a handler, sorted.
    pub registered: Vec<String>,
    /// Topics subscribed on the current transport, sorted.
    pub active: Vec<String>,
    /// Consecutive failures.
    pub failures: u32,
    /// Failure ceiling of the reconnect policy.
    pub max_attempts: u32,
    /// Broker-side subscriptions, if a broker is attached.
    pub broker_subscriptions: Option<Vec<String>>,
    /// Chat phase.
    pub chat_phase: ChatPhase,
    /// Chat buffer.
    pub messages: Vec<ChatMessage>,
    /// Chat viewport.
    pub viewport: Viewport,
}

impl Default for SystemSnapshot {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            registered: Vec::new(),
            active: Vec::new(),
            failures: 0,
            max_attempts: 0,
            broker_subscriptions: None,
            chat_phase: ChatPhase::Idle,
            messages: Vec::new(),
            viewport: Viewport::default(),
        }
    }
}

impl SystemSnapshot {
    /// Capture the runtime and its simulated broker.
    pub fn capture(runtime: &Runtime<SimDriver>) -> Self {
        let session = runtime.session();
        let chat = runtime.chat();

        let mut active: Vec<String> = session.active_topics().map(str::to_string).collect();
        active.sort_unstable();

        Self {
            state: session.state(),
            registered: session.registered_topics().map(str::to_string).collect(),
            active,
            failures: session.consecutive_failures(),
            max_attempts: session.config().reconnect.max_attempts,
            broker_subscriptions: runtime.driver().server(|server| {
                server.subscribed_destinations().into_iter().map(str::to_string).collect()
            }),
            chat_phase: chat.phase(),
            messages: chat.messages().iter().cloned().collect(),
            viewport: chat.viewport(),
        }
    }
}
