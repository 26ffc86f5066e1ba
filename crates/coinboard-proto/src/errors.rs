//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding frames and payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame text ended before the header block was terminated.
    #[error("frame truncated: {context}")]
    FrameTruncated {
        /// Which part of the frame was being read.
        context: &'static str,
    },

    /// Command line is not a known command.
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    /// Header line has no `:` separator.
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    /// Header contains an escape sequence outside the defined set.
    #[error("invalid escape sequence \\{0} in header")]
    InvalidEscape(char),

    /// `content-length` header is not a valid length.
    #[error("invalid content-length: {0:?}")]
    InvalidContentLength(String),

    /// Body is not terminated by a NUL octet.
    #[error("frame body is missing its NUL terminator")]
    MissingTerminator,

    /// Non-EOL data follows the NUL terminator.
    #[error("unexpected data after frame terminator")]
    TrailingData,

    /// Body exceeds the maximum accepted size.
    #[error("body too large: {size} bytes (max {max})")]
    BodyTooLarge {
        /// Actual body size in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },

    /// A header required for this command is absent.
    #[error("{command} frame is missing required header {header:?}")]
    MissingHeader {
        /// Command of the frame.
        command: &'static str,
        /// Name of the missing header.
        header: &'static str,
    },

    /// Frame has a different command than the caller expected.
    #[error("unexpected command: expected {expected}, got {actual}")]
    UnexpectedCommand {
        /// Command the caller expected.
        expected: &'static str,
        /// Command that was received.
        actual: &'static str,
    },

    /// JSON payload failed to serialize or deserialize.
    #[error("json error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
