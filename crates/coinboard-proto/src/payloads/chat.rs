//! Chat channel payloads.
//!
//! Outbound sends and heartbeats share one shape, distinguished by `ping`.
//! Inbound messages mirror [`ChatMessage`]; entries with `ping: true` are
//! keep-alives and never reach the message buffer.

use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::Result;

/// Chat message as delivered by the push channel or the history endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Stable sender identifier. Numeric ids are accepted and stringified.
    #[serde(default, deserialize_with = "string_or_number")]
    pub sender_id: String,
    /// Display name of the sender.
    #[serde(default)]
    pub sender_name: String,
    /// Message text.
    #[serde(default)]
    pub content: String,
    /// Send time in milliseconds since the Unix epoch.
    #[serde(default, rename = "sentAt")]
    pub sent_at_millis: i64,
    /// Whether the sender was logged in.
    #[serde(default)]
    pub authenticated: bool,
    /// Keep-alive marker.
    #[serde(default, rename = "ping")]
    pub is_heartbeat: bool,
}

impl ChatMessage {
    /// Parse an inbound JSON body.
    pub fn from_json(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }
}

/// Outbound chat payload (send or heartbeat).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatOutbound {
    /// `true` for heartbeats.
    pub ping: bool,
    /// Chat room identifier.
    pub chat_id: String,
    /// Message text; empty for heartbeats.
    pub content: String,
    /// Whether the sender is logged in.
    pub authenticated: bool,
}

impl ChatOutbound {
    /// A user message.
    pub fn message(chat_id: &str, content: &str, authenticated: bool) -> Self {
        Self {
            ping: false,
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            authenticated,
        }
    }

    /// A keep-alive.
    pub fn heartbeat(chat_id: &str, authenticated: bool) -> Self {
        Self { ping: true, chat_id: chat_id.to_string(), content: String::new(), authenticated }
    }

    /// Serialize to a JSON body.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
        Null(()),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Number(number) => number.to_string(),
        Id::Null(()) => String::new(),
    })
}
