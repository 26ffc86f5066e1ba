//! Scripted message broker.
//!
//! Speaks just enough of the broker side of the protocol to drive a client
//! through handshake, subscriptions, chat echo, and history paging. Pure:
//! it takes received text and returns the text to deliver back.

use std::collections::BTreeMap;

use coinboard_proto::{ChatMessage, ChatOutbound, Command, Frame, HistoryRequest};

/// Broker side of one simulated deployment.
///
/// Subscriptions belong to the current transport and are dropped by
/// [`reset_transport`](Self::reset_transport); routes and history survive.
#[derive(Debug, Default)]
pub struct SimServer {
    subscriptions: BTreeMap<String, String>,
    routes: BTreeMap<String, String>,
    history: Vec<ChatMessage>,
    heart_beat: Option<String>,
    reject_reason: Option<String>,
    received: Vec<Frame>,
    next_message_id: u64,
    next_sent_at: i64,
}

impl SimServer {
    /// Broker with no routes and no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Relay sends to `destination` onto `topic` as chat messages.
    #[must_use]
    pub fn with_route(mut self, destination: &str, topic: &str) -> Self {
        self.routes.insert(destination.to_string(), topic.to_string());
        self
    }

    /// Seed chat history, oldest first.
    #[must_use]
    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.next_sent_at = history.iter().map(|m| m.sent_at_millis + 1).max().unwrap_or(0);
        self.history = history;
        self
    }

    /// `heart-beat` header sent in CONNECTED.
    #[must_use]
    pub fn with_heart_beat(mut self, value: &str) -> Self {
        self.heart_beat = Some(value.to_string());
        self
    }

    /// Answer every CONNECT with ERROR.
    pub fn reject_handshakes(&mut self, reason: &str) {
        self.reject_reason = Some(reason.to_string());
    }

    /// Accept handshakes again.
    pub fn accept_handshakes(&mut self) {
        self.reject_reason = None;
    }

    /// A new transport replaced the old one.
    pub fn reset_transport(&mut self) {
        self.subscriptions.clear();
    }

    /// Destinations subscribed on the current transport, sorted.
    pub fn subscribed_destinations(&self) -> Vec<&str> {
        let mut destinations: Vec<&str> = self.subscriptions.values().map(String::as_str).collect();
        destinations.sort_unstable();
        destinations
    }

    /// Every frame received, in order.
    pub fn received(&self) -> &[Frame] {
        &self.received
    }

    /// Received frames with `command`.
    pub fn received_count(&self, command: Command) -> usize {
        self.received.iter().filter(|f| f.command == command).count()
    }

    /// Chat history, oldest first.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Process text from the client. Returns text to send back.
    pub fn receive(&mut self, text: &str) -> Vec<String> {
        let frame = match Frame::decode(text) {
            Ok(Some(frame)) => frame,
            Ok(None) => return vec![],
            Err(e) => {
                tracing::warn!(error = %e, "broker received garbage");
                return vec![];
            },
        };
        self.received.push(frame.clone());

        match frame.command {
            Command::Connect => self.handshake(),
            Command::Subscribe => {
                if let (Some(id), Some(destination)) = (frame.header("id"), frame.destination()) {
                    self.subscriptions.insert(id.to_string(), destination.to_string());
                }
                vec![]
            },
            Command::Unsubscribe => {
                if let Some(id) = frame.header("id") {
                    self.subscriptions.remove(id);
                }
                vec![]
            },
            Command::Send => {
                let Some(destination) = frame.destination() else {
                    return vec![];
                };
                match self.routes.get(destination).cloned() {
                    Some(topic) => self.relay_chat(&topic, &frame.body),
                    None => vec![],
                }
            },
            _ => vec![],
        }
    }

    /// Push `body` to every subscriber of `topic`.
    pub fn publish(&mut self, topic: &str, body: &str) -> Vec<String> {
        let ids: Vec<String> = self
            .subscriptions
            .iter()
            .filter(|(_, destination)| destination.as_str() == topic)
            .map(|(id, _)| id.clone())
            .collect();

        ids.into_iter()
            .filter_map(|id| {
                self.next_message_id += 1;
                Frame::new(Command::Message)
                    .with_header("destination", topic)
                    .with_header("subscription", id)
                    .with_header("message-id", self.next_message_id.to_string())
                    .with_body(body)
                    .encode()
                    .ok()
            })
            .collect()
    }

    /// Push a chat message from another participant to `topic`.
    pub fn publish_chat(&mut self, topic: &str, sender: &str, content: &str) -> Vec<String> {
        let message = ChatMessage {
            sender_id: sender.to_string(),
            sender_name: sender.to_string(),
            content: content.to_string(),
            sent_at_millis: self.stamp(),
            ..ChatMessage::default()
        };
        self.history.push(message.clone());
        match serde_json::to_string(&message) {
            Ok(body) => self.publish(topic, &body),
            Err(_) => vec![],
        }
    }

    /// History page, oldest first. Page 0 is the newest.
    pub fn history_page(&self, request: HistoryRequest) -> Vec<ChatMessage> {
        let size = request.size as usize;
        let skip = (request.page as usize).saturating_mul(size);
        let end = self.history.len().saturating_sub(skip);
        let start = end.saturating_sub(size);
        self.history[start..end].to_vec()
    }

    fn handshake(&mut self) -> Vec<String> {
        let frame = match &self.reject_reason {
            Some(reason) => Frame::new(Command::Error)
                .with_header("message", reason.clone())
                .with_body(reason.clone()),
            None => {
                let mut frame = Frame::new(Command::Connected)
                    .with_header("version", "1.2")
                    .with_header("server", "sim-broker");
                if let Some(heart_beat) = &self.heart_beat {
                    frame = frame.with_header("heart-beat", heart_beat.clone());
                }
                frame
            },
        };
        frame.encode().into_iter().collect()
    }

    fn relay_chat(&mut self, topic: &str, body: &str) -> Vec<String> {
        let Ok(outbound) = serde_json::from_str::<ChatOutbound>(body) else {
            return self.publish(topic, body);
        };

        let message = ChatMessage {
            sender_id: "self".to_string(),
            sender_name: "self".to_string(),
            content: outbound.content,
            sent_at_millis: self.stamp(),
            authenticated: outbound.authenticated,
            is_heartbeat: outbound.ping,
        };
        if !message.is_heartbeat {
            self.history.push(message.clone());
        }
        match serde_json::to_string(&message) {
            Ok(body) => self.publish(topic, &body),
            Err(_) => vec![],
        }
    }

    fn stamp(&mut self) -> i64 {
        let stamp = self.next_sent_at;
        self.next_sent_at += 1;
        stamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(n: usize) -> Vec<ChatMessage> {
        (0..n)
            .map(|i| ChatMessage {
                content: format!("m{i}"),
                sent_at_millis: i as i64,
                ..ChatMessage::default()
            })
            .collect()
    }

    #[test]
    fn pages_walk_backwards_from_newest() {
        let server = SimServer::new().with_history(history(5));

        let page0 = server.history_page(HistoryRequest { page: 0, size: 2 });
        let page2 = server.history_page(HistoryRequest { page: 2, size: 2 });
        let page3 = server.history_page(HistoryRequest { page: 3, size: 2 });

        assert_eq!(page0.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(), ["m3", "m4"]);
        assert_eq!(page2.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(), ["m0"]);
        assert!(page3.is_empty());
    }

    #[test]
    fn connect_is_answered() {
        let mut server = SimServer::new().with_heart_beat("0,5000");
        let connect = Frame::new(Command::Connect).with_header("accept-version", "1.2");

        let replies = server.receive(&connect.encode().unwrap());
        let reply = Frame::decode(&replies[0]).unwrap().unwrap();

        assert_eq!(reply.command, Command::Connected);
        assert_eq!(reply.header("heart-beat"), Some("0,5000"));
    }

    #[test]
    fn rejected_connect_gets_error() {
        let mut server = SimServer::new();
        server.reject_handshakes("bad token");

        let replies = server.receive(&Frame::new(Command::Connect).encode().unwrap());
        let reply = Frame::decode(&replies[0]).unwrap().unwrap();

        assert_eq!(reply.command, Command::Error);
        assert_eq!(reply.header("message"), Some("bad token"));
    }

    #[test]
    fn routed_send_reaches_subscribers() {
        let mut server = SimServer::new().with_route("/app/chat.send", "/topic/chat");
        server.receive(&Frame::subscribe("sub-0", "/topic/chat").encode().unwrap());

        let body = ChatOutbound::message("global", "hi", false).to_json().unwrap();
        let replies = server.receive(&Frame::send("/app/chat.send", body).encode().unwrap());

        assert_eq!(replies.len(), 1);
        let reply = Frame::decode(&replies[0]).unwrap().unwrap();
        assert_eq!(reply.destination(), Some("/topic/chat"));
        assert_eq!(ChatMessage::from_json(&reply.body).unwrap().content, "hi");
        assert_eq!(server.history().len(), 1);
    }

    #[test]
    fn reset_drops_subscriptions() {
        let mut server = SimServer::new();
        server.receive(&Frame::subscribe("sub-0", "/topic/prices").encode().unwrap());
        assert_eq!(server.subscribed_destinations(), ["/topic/prices"]);

        server.reset_transport();
        assert!(server.subscribed_destinations().is_empty());
        assert!(server.publish("/topic/prices", "{}").is_empty());
    }
}
