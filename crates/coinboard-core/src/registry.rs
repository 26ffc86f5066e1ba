//! Topic to handler mapping.
//!
//! The registry is the source of truth for what the session should be
//! subscribed to. It survives transport loss; the connection manager replays
//! it onto every new transport.

use std::collections::BTreeMap;

use coinboard_proto::Message;
use tokio::sync::mpsc::UnboundedSender;

/// Receives messages delivered to one topic.
pub trait MessageHandler: Send {
    /// Handle one delivered message.
    fn handle(&mut self, message: &Message);
}

impl<F> MessageHandler for F
where
    F: FnMut(&Message) + Send,
{
    fn handle(&mut self, message: &Message) {
        self(message);
    }
}

/// Forwards messages into a channel drained by the owning component.
impl MessageHandler for UnboundedSender<Message> {
    fn handle(&mut self, message: &Message) {
        if self.send(message.clone()).is_err() {
            tracing::debug!(destination = %message.destination, "handler channel closed, message dropped");
        }
    }
}

/// Mapping from topic to its current handler.
///
/// At most one handler per topic; registering again replaces the previous
/// handler.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: BTreeMap<String, Box<dyn MessageHandler>>,
}

impl SubscriptionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic`. Returns true if a previous handler
    /// was replaced.
    pub fn upsert(&mut self, topic: impl Into<String>, handler: Box<dyn MessageHandler>) -> bool {
        self.entries.insert(topic.into(), handler).is_some()
    }

    /// Remove the handler for `topic`. Returns true if one was registered.
    pub fn remove(&mut self, topic: &str) -> bool {
        self.entries.remove(topic).is_some()
    }

    /// Whether `topic` has a handler.
    pub fn contains(&self, topic: &str) -> bool {
        self.entries.contains_key(topic)
    }

    /// Registered topics, in sorted order.
    pub fn topics(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    /// Number of registered topics.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no topics are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deliver `message` to the handler for its destination.
    ///
    /// Returns false (and does nothing) if no handler is registered.
    pub fn dispatch(&mut self, message: &Message) -> bool {
        match self.entries.get_mut(&message.destination) {
            Some(handler) => {
                handler.handle(message);
                true
            },
            None => false,
        }
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.topics()).finish()
    }
}
