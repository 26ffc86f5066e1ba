//! Standard invariant checks.

use coinboard_chat::ChatPhase;
use coinboard_core::ConnectionState;

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// Subscriptions on the transport mirror the registry.
///
/// Connected: every registered topic is active and nothing else is. Any
/// other state: nothing is active.
pub struct ActiveMatchesRegistry;

impl Invariant for ActiveMatchesRegistry {
    fn name(&self) -> &'static str {
        "ActiveMatchesRegistry"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let expected: &[String] =
            if state.state == ConnectionState::Connected { &state.registered } else { &[] };

        if state.active != expected {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "{}: active {:?}, registered {:?}",
                    state.state, state.active, state.registered
                ),
            });
        }
        Ok(())
    }
}

/// While connected, the broker holds exactly the client's subscriptions.
pub struct BrokerAgrees;

impl Invariant for BrokerAgrees {
    fn name(&self) -> &'static str {
        "BrokerAgrees"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let Some(broker) = &state.broker_subscriptions else {
            return Ok(());
        };
        if state.state != ConnectionState::Connected {
            return Ok(());
        }

        if broker != &state.active {
            return Err(Violation {
                invariant: self.name(),
                message: format!("broker {broker:?}, client {:?}", state.active),
            });
        }
        Ok(())
    }
}

/// The failure counter never passes the policy ceiling: the first failure
/// plus one per allowed retry.
pub struct FailuresWithinPolicy;

impl Invariant for FailuresWithinPolicy {
    fn name(&self) -> &'static str {
        "FailuresWithinPolicy"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let ceiling = state.max_attempts.saturating_add(1);
        if state.failures > ceiling {
            return Err(Violation {
                invariant: self.name(),
                message: format!("{} failures, ceiling {ceiling}", state.failures),
            });
        }
        Ok(())
    }
}

/// Keep-alives never reach the chat buffer.
pub struct NoBufferedHeartbeats;

impl Invariant for NoBufferedHeartbeats {
    fn name(&self) -> &'static str {
        "NoBufferedHeartbeats"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        if let Some(index) = state.messages.iter().position(|m| m.is_heartbeat) {
            return Err(Violation {
                invariant: self.name(),
                message: format!("heartbeat at index {index} of {}", state.messages.len()),
            });
        }
        Ok(())
    }
}

/// A mounted chat never scrolls past the end of its content.
pub struct ViewportInBounds;

impl Invariant for ViewportInBounds {
    fn name(&self) -> &'static str {
        "ViewportInBounds"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        if state.chat_phase == ChatPhase::Idle {
            return Ok(());
        }
        let viewport = state.viewport;
        if viewport.offset > viewport.max_offset() {
            return Err(Violation {
                invariant: self.name(),
                message: format!("offset {} past max {}", viewport.offset, viewport.max_offset()),
            });
        }
        Ok(())
    }
}
