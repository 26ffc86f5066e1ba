//! Fuzz target for the connection state machine
//!
//! Drives `ConnectionManager` with arbitrary event sequences on a virtual
//! clock.
//!
//! # Invariants
//!
//! - Never panics
//! - Consecutive failures never pass the policy ceiling plus one
//! - While connected, exactly the registered topics are active
//! - Outside `Connected`, nothing is active

#![no_main]

use std::time::{Duration, Instant};

use arbitrary::Arbitrary;
use coinboard_core::{ConnectionAction, ConnectionManager, ConnectionState, SessionConfig};
use coinboard_proto::{Command, Credential, Frame, Message};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Event {
    Connect,
    Disconnect,
    Subscribe(u8),
    Unsubscribe(u8),
    /// Result for the latest requested attempt, or a stale earlier one
    Credential { ok: bool, stale: bool },
    TransportOpen,
    Connected(Option<(u16, u16)>),
    ServerError,
    Message(u8),
    Closed(bool),
    TransportError,
    Incoming(String),
    Advance(u16),
}

fn topic(n: u8) -> String {
    format!("/topic/{}", n % 8)
}

fuzz_target!(|events: Vec<Event>| {
    let start = Instant::now();
    let mut now = start;
    let mut manager = ConnectionManager::new(SessionConfig::default());
    let mut attempt = 0;

    for event in events {
        let actions = match event {
            Event::Connect => manager.connect(now).unwrap_or_default(),
            Event::Disconnect => manager.disconnect(),
            Event::Subscribe(n) => manager.subscribe(topic(n), Box::new(|_: &Message| {})),
            Event::Unsubscribe(n) => manager.unsubscribe(&topic(n)),
            Event::Credential { ok, stale } => {
                let result = if ok {
                    Ok(Credential::new("X-XSRF-TOKEN", "t"))
                } else {
                    Err("down".to_string())
                };
                let tag = if stale { attempt.saturating_sub(1) } else { attempt };
                manager.handle_credential(tag, result, now)
            },
            Event::TransportOpen => manager.handle_transport_open(now),
            Event::Connected(heart_beat) => {
                let mut frame = Frame::new(Command::Connected).with_header("version", "1.2");
                if let Some((out, inc)) = heart_beat {
                    frame = frame.with_header("heart-beat", format!("{out},{inc}"));
                }
                manager.handle_frame(frame, now)
            },
            Event::ServerError => {
                manager.handle_frame(Frame::new(Command::Error).with_header("message", "x"), now)
            },
            Event::Message(n) => manager.handle_frame(
                Frame::new(Command::Message).with_header("destination", topic(n)).with_body("{}"),
                now,
            ),
            Event::Closed(clean) => manager.handle_transport_closed(clean, now),
            Event::TransportError => manager.handle_transport_error("reset".to_string(), now),
            Event::Incoming(text) => manager.handle_incoming(&text, now),
            Event::Advance(ms) => {
                now += Duration::from_millis(u64::from(ms));
                manager.tick(now)
            },
        };
        for action in &actions {
            if let ConnectionAction::FetchCredential { attempt: requested } = action {
                attempt = *requested;
            }
        }

        let policy = manager.config().reconnect;
        assert!(manager.consecutive_failures() <= policy.max_attempts + 1);

        let mut active: Vec<&str> = manager.active_topics().collect();
        active.sort_unstable();
        if manager.state() == ConnectionState::Connected {
            let registered: Vec<&str> = manager.registered_topics().collect();
            assert_eq!(active, registered);
        } else {
            assert!(active.is_empty());
        }
    }
});
