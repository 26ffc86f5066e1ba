//! Delivered message envelope.

use std::collections::BTreeMap;

use crate::{
    errors::{ProtocolError, Result},
    frame::{Command, Frame},
};

/// Message delivered to a topic subscriber.
///
/// Transient: built from a MESSAGE frame, handed to exactly one handler, and
/// dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Topic the message was published to.
    pub destination: String,
    /// UTF-8 body (usually JSON).
    pub body: String,
    /// Remaining frame headers; first occurrence wins.
    pub headers: BTreeMap<String, String>,
}

impl Message {
    /// Message with no extra headers.
    pub fn new(destination: impl Into<String>, body: impl Into<String>) -> Self {
        Self { destination: destination.into(), body: body.into(), headers: BTreeMap::new() }
    }

    /// Build from a MESSAGE frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnexpectedCommand` if the frame is not MESSAGE
    /// - `ProtocolError::MissingHeader` if `destination` is absent
    pub fn from_frame(frame: Frame) -> Result<Self> {
        if frame.command != Command::Message {
            return Err(ProtocolError::UnexpectedCommand {
                expected: Command::Message.as_str(),
                actual: frame.command.as_str(),
            });
        }

        let mut headers = BTreeMap::new();
        for (name, value) in frame.headers {
            headers.entry(name).or_insert(value);
        }

        let destination = headers
            .remove("destination")
            .ok_or(ProtocolError::MissingHeader { command: "MESSAGE", header: "destination" })?;

        Ok(Self { destination, body: frame.body, headers })
    }

    /// Header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_message_frame() {
        let frame = Frame::new(Command::Message)
            .with_header("destination", "/topic/ticker")
            .with_header("subscription", "sub-3")
            .with_header("subscription", "sub-9")
            .with_body("{}");

        let message = Message::from_frame(frame).unwrap();
        assert_eq!(message.destination, "/topic/ticker");
        assert_eq!(message.header("subscription"), Some("sub-3"));
        assert_eq!(message.header("destination"), None);
        assert_eq!(message.body, "{}");
    }

    #[test]
    fn reject_non_message_frames() {
        let result = Message::from_frame(Frame::send("/app/chat", "{}"));
        assert!(matches!(result, Err(ProtocolError::UnexpectedCommand { .. })));
    }

    #[test]
    fn reject_missing_destination() {
        let result = Message::from_frame(Frame::new(Command::Message));
        assert!(matches!(result, Err(ProtocolError::MissingHeader { .. })));
    }
}
