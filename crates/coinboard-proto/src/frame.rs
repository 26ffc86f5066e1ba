//! STOMP-style text frame.
//!
//! A `Frame` is one unit on the duplex transport:
//!
//! ```text
//! COMMAND EOL
//! *( header-name ":" header-value EOL )
//! EOL
//! body NUL
//! ```
//!
//! EOL is `\n` or `\r\n`. A frame made only of EOLs is a heart-beat and
//! decodes to `None`.
//!
//! Header names and values are escaped (`\\`, `\n`, `\r`, `\c`) on every
//! command except CONNECT and CONNECTED, which are sent before the peers
//! have agreed on a protocol version.

use std::fmt;

use crate::errors::{ProtocolError, Result};

/// Largest body accepted on encode or decode (1 MiB).
pub const MAX_BODY_SIZE: usize = 1 << 20;

/// A heart-beat on the wire: a single EOL.
pub const HEARTBEAT: &str = "\n";

/// Header carrying the body length in bytes.
const CONTENT_LENGTH: &str = "content-length";

/// Frame command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Client handshake.
    Connect,
    /// Alternative client handshake command.
    Stomp,
    /// Server handshake reply.
    Connected,
    /// Client publishes a body to a destination.
    Send,
    /// Client subscribes to a destination.
    Subscribe,
    /// Client cancels a subscription.
    Unsubscribe,
    /// Client announces a clean shutdown.
    Disconnect,
    /// Server delivers a body for a subscription.
    Message,
    /// Server acknowledges a frame that asked for a receipt.
    Receipt,
    /// Server reports an error; the server closes afterwards.
    Error,
}

impl Command {
    /// Every command, in wire-name order.
    pub const ALL: [Self; 10] = [
        Self::Connect,
        Self::Stomp,
        Self::Connected,
        Self::Send,
        Self::Subscribe,
        Self::Unsubscribe,
        Self::Disconnect,
        Self::Message,
        Self::Receipt,
        Self::Error,
    ];

    /// Wire name of the command.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// Parse a wire name. `None` for unknown commands.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.as_str() == name)
    }

    /// Whether header octets are escaped for this command.
    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One protocol frame.
///
/// # Invariants
///
/// - `headers` never contains `content-length`; the length is derived from
///   `body` on encode and consumed on decode.
/// - Repeated header names are kept in order; lookups return the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame command.
    pub command: Command,
    /// Headers in wire order.
    pub headers: Vec<(String, String)>,
    /// UTF-8 body (usually JSON).
    pub body: String,
}

impl Frame {
    /// Frame with no headers and an empty body.
    pub fn new(command: Command) -> Self {
        Self { command, headers: Vec::new(), body: String::new() }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of the named header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    /// `destination` header, if present.
    pub fn destination(&self) -> Option<&str> {
        self.header("destination")
    }

    /// SUBSCRIBE frame for `destination` under subscription `id`.
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    /// UNSUBSCRIBE frame for subscription `id`.
    pub fn unsubscribe(id: &str) -> Self {
        Self::new(Command::Unsubscribe).with_header("id", id)
    }

    /// SEND frame carrying a JSON body.
    pub fn send(destination: &str, body: impl Into<String>) -> Self {
        Self::new(Command::Send)
            .with_header("destination", destination)
            .with_header("content-type", "application/json")
            .with_body(body)
    }

    /// DISCONNECT frame.
    pub fn disconnect() -> Self {
        Self::new(Command::Disconnect)
    }

    /// Render the frame as wire text.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::BodyTooLarge` if the body exceeds [`MAX_BODY_SIZE`]
    pub fn encode(&self) -> Result<String> {
        if self.body.len() > MAX_BODY_SIZE {
            return Err(ProtocolError::BodyTooLarge { size: self.body.len(), max: MAX_BODY_SIZE });
        }

        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');

        for (name, value) in &self.headers {
            if name == CONTENT_LENGTH {
                continue;
            }
            if escape {
                push_escaped(&mut out, name);
                out.push(':');
                push_escaped(&mut out, value);
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }

        if !self.body.is_empty() {
            out.push_str(CONTENT_LENGTH);
            out.push(':');
            out.push_str(&self.body.len().to_string());
            out.push('\n');
        }

        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');

        Ok(out)
    }

    /// Parse wire text holding exactly one frame. Returns `None` for a
    /// heart-beat.
    ///
    /// Leading EOLs (heart-beats that preceded the frame) are skipped and
    /// EOLs after the NUL terminator are ignored.
    ///
    /// # Errors
    ///
    /// Any structural violation: unknown command, malformed header, bad
    /// escape, bad or oversized `content-length`, missing NUL, or trailing
    /// non-EOL data.
    pub fn decode(text: &str) -> Result<Option<Self>> {
        match Self::decode_next(text)? {
            None => Ok(None),
            Some((frame, after)) if after.chars().all(|c| c == '\n' || c == '\r') => {
                Ok(Some(frame))
            },
            Some(_) => Err(ProtocolError::TrailingData),
        }
    }

    /// Parse the first frame of `text` and return it with the unparsed
    /// remainder. Returns `None` once only heart-beats are left.
    ///
    /// A broker may batch several frames into one transport message; call
    /// this in a loop until it yields `None`.
    ///
    /// # Errors
    ///
    /// Same structural violations as [`Frame::decode`], except trailing data.
    pub fn decode_next(text: &str) -> Result<Option<(Self, &str)>> {
        let rest = text.trim_start_matches(['\r', '\n']);
        if rest.is_empty() {
            return Ok(None);
        }

        let (command_line, mut rest) =
            split_line(rest).ok_or(ProtocolError::FrameTruncated { context: "command" })?;
        let command = Command::parse(command_line)
            .ok_or_else(|| ProtocolError::UnknownCommand(command_line.to_string()))?;

        let escape = command.escapes_headers();
        let mut headers = Vec::new();
        let mut content_length = None;

        loop {
            let (line, next) =
                split_line(rest).ok_or(ProtocolError::FrameTruncated { context: "headers" })?;
            rest = next;

            if line.is_empty() {
                break;
            }

            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ProtocolError::MalformedHeader(line.to_string()))?;
            let (name, value) = if escape {
                (unescape(name)?, unescape(value)?)
            } else {
                (name.to_string(), value.to_string())
            };

            if name == CONTENT_LENGTH {
                if content_length.is_none() {
                    let len = value
                        .trim()
                        .parse::<usize>()
                        .map_err(|_| ProtocolError::InvalidContentLength(value.clone()))?;
                    content_length = Some(len);
                }
                continue;
            }

            headers.push((name, value));
        }

        let (body, after) = match content_length {
            Some(len) => {
                if len > MAX_BODY_SIZE {
                    return Err(ProtocolError::BodyTooLarge { size: len, max: MAX_BODY_SIZE });
                }
                if len > rest.len() {
                    return Err(ProtocolError::FrameTruncated { context: "body" });
                }
                if !rest.is_char_boundary(len) {
                    return Err(ProtocolError::InvalidContentLength(len.to_string()));
                }
                let (body, after) = rest.split_at(len);
                let after = after.strip_prefix('\0').ok_or(ProtocolError::MissingTerminator)?;
                (body, after)
            },
            None => {
                let (body, after) =
                    rest.split_once('\0').ok_or(ProtocolError::MissingTerminator)?;
                if body.len() > MAX_BODY_SIZE {
                    return Err(ProtocolError::BodyTooLarge {
                        size: body.len(),
                        max: MAX_BODY_SIZE,
                    });
                }
                (body, after)
            },
        };

        Ok(Some((Self { command, headers, body: body.to_string() }, after)))
    }
}

/// Split off one line, dropping the EOL (and a preceding `\r`).
fn split_line(text: &str) -> Option<(&str, &str)> {
    let (line, rest) = text.split_once('\n')?;
    Some((line.strip_suffix('\r').unwrap_or(line), rest))
}

fn push_escaped(out: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some(other) => return Err(ProtocolError::InvalidEscape(other)),
            None => return Err(ProtocolError::MalformedHeader(raw.to_string())),
        }
    }

    Ok(out)
}
