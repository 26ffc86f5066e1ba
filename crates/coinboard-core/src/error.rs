//! Error types for the session layer.
//!
//! [`SessionError`] is what connection-state listeners see; its class tells
//! the UI whether the layer is retrying on its own or the user has to
//! refresh. [`ConnectError`] and [`PublishError`] are returned directly to
//! the caller of the corresponding operation.

use std::time::Duration;

use coinboard_proto::ProtocolError;
use thiserror::Error;

/// Why the session is (or was) not connected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Transport failed to open, closed abnormally, or reported an error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Server refused the handshake (bad or expired credential).
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    /// Credential endpoint could not be reached or returned garbage.
    #[error("credential unavailable: {0}")]
    CredentialUnavailable(String),

    /// Connection attempt did not complete in time.
    #[error("connect attempt timed out after {elapsed:?}")]
    ConnectTimeout {
        /// How long the attempt ran.
        elapsed: Duration,
    },

    /// No inbound traffic within the negotiated heart-beat window.
    #[error("no inbound traffic for {elapsed:?}")]
    IdleTimeout {
        /// How long the transport was silent.
        elapsed: Duration,
    },

    /// Server reported an error on an established session.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Consecutive failures exceeded the retry ceiling.
    #[error("gave up after {failures} consecutive failures")]
    Terminal {
        /// Consecutive failures observed.
        failures: u32,
    },
}

impl SessionError {
    /// Returns true if the layer retries this error on its own.
    ///
    /// Rejected handshakes are never transient: retrying with the same stale
    /// credential would fail identically.
    pub fn is_transient(&self) -> bool {
        !self.requires_refresh()
    }

    /// Returns true if only user action (a page refresh or an explicit
    /// reconnect) can recover.
    pub fn requires_refresh(&self) -> bool {
        matches!(self, Self::HandshakeRejected(_) | Self::Terminal { .. })
    }
}

/// Convert protocol errors into session errors.
impl From<ProtocolError> for SessionError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Errors returned by `ConnectionManager::connect`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// Called again before the minimum inter-attempt interval elapsed.
    #[error("connect attempted again within {min_interval:?}")]
    Debounced {
        /// Configured minimum interval between attempts.
        min_interval: Duration,
    },
}

/// Errors returned by `ConnectionManager::publish`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// No open session; the publish was dropped.
    #[error("not connected, dropped publish to {destination}")]
    NotConnected {
        /// Destination of the dropped publish.
        destination: String,
    },

    /// Frame could not be built.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_are_transient() {
        assert!(SessionError::Transport("reset".to_string()).is_transient());
        assert!(SessionError::CredentialUnavailable("503".to_string()).is_transient());
        assert!(SessionError::ConnectTimeout { elapsed: Duration::from_secs(11) }.is_transient());
        assert!(SessionError::IdleTimeout { elapsed: Duration::from_secs(21) }.is_transient());
        assert!(SessionError::Protocol("broker restarting".to_string()).is_transient());
    }

    #[test]
    fn rejected_and_exhausted_require_refresh() {
        assert!(SessionError::HandshakeRejected("bad token".to_string()).requires_refresh());
        assert!(SessionError::Terminal { failures: 11 }.requires_refresh());
        assert!(!SessionError::Terminal { failures: 11 }.is_transient());
    }
}
