//! Connection state fan-out.
//!
//! Listeners see the current snapshot as soon as they register and then
//! only real transitions; repeated publishes of the same snapshot are
//! swallowed.

use std::fmt;

use tokio::sync::mpsc::UnboundedSender;

use crate::error::SessionError;

/// Coarse connection state exposed to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No transport and no attempt in flight.
    #[default]
    Disconnected,
    /// Credential fetch, transport open, or handshake in progress.
    Connecting,
    /// Handshake complete; subscriptions are live.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}

/// What listeners receive: the state plus the most recent error.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionSnapshot {
    /// Current coarse state.
    pub state: ConnectionState,
    /// Error behind the last drop, cleared once connected again.
    pub last_error: Option<SessionError>,
}

/// Observer of connection state changes.
pub trait StateListener: Send {
    /// Called with the current snapshot on registration and on every change.
    ///
    /// Returns false once the listener is gone; it is then dropped.
    fn on_state(&mut self, snapshot: &ConnectionSnapshot) -> bool;
}

impl<F> StateListener for F
where
    F: FnMut(&ConnectionSnapshot) + Send,
{
    fn on_state(&mut self, snapshot: &ConnectionSnapshot) -> bool {
        self(snapshot);
        true
    }
}

impl StateListener for UnboundedSender<ConnectionSnapshot> {
    fn on_state(&mut self, snapshot: &ConnectionSnapshot) -> bool {
        self.send(snapshot.clone()).is_ok()
    }
}

/// Handle for removing a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Deduplicating fan-out of [`ConnectionSnapshot`]s.
#[derive(Default)]
pub struct StateBroadcaster {
    current: ConnectionSnapshot,
    listeners: Vec<(ListenerId, Box<dyn StateListener>)>,
    next_id: u64,
}

impl StateBroadcaster {
    /// Broadcaster starting at `Disconnected` with no error.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener and immediately deliver the current snapshot.
    ///
    /// A listener that is already gone is not kept.
    pub fn register(&mut self, mut listener: Box<dyn StateListener>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        if listener.on_state(&self.current) {
            self.listeners.push((id, listener));
        }
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unregister(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    /// Publish `snapshot`; listeners are notified only if it differs from
    /// the current one. Returns true if it did. Listeners that report
    /// themselves gone are pruned.
    pub fn publish(&mut self, snapshot: ConnectionSnapshot) -> bool {
        if snapshot == self.current {
            return false;
        }

        tracing::debug!(
            from = %self.current.state,
            to = %snapshot.state,
            error = ?snapshot.last_error,
            "connection state changed"
        );
        self.current = snapshot;
        let current = &self.current;
        self.listeners.retain_mut(|(id, listener)| {
            let alive = listener.on_state(current);
            if !alive {
                tracing::debug!(?id, "state listener closed, removed");
            }
            alive
        });
        true
    }

    /// Latest published snapshot.
    pub fn current(&self) -> &ConnectionSnapshot {
        &self.current
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl fmt::Debug for StateBroadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateBroadcaster")
            .field("current", &self.current)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
