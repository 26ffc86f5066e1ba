//! End-to-end session scenarios.
//!
//! The real runtime runs against the scripted broker on a virtual clock.
//! Every scenario also passes the standard invariants after each event.

use std::time::Duration;

use coinboard_chat::{ChatConfig, ChatNotice, ChatPhase, Viewport};
use coinboard_client::DriverEvent;
use coinboard_core::{
    ConnectionState, Denial, ReconnectionPolicy, SessionConfig, SessionError,
};
use coinboard_harness::{Request, SimDriver, SimEnv, SimServer, Simulation};
use coinboard_proto::{ChatMessage, Command, Credential, Frame, HistoryRequest, MAX_BODY_SIZE};

const CHAT_TOPIC: &str = "/topic/chat";
const CHAT_SEND: &str = "/app/chat.send";
const PRICES: &str = "/topic/prices";

fn history(n: usize) -> Vec<ChatMessage> {
    (0..n)
        .map(|i| ChatMessage {
            sender_id: "seed".to_string(),
            content: format!("m{i}"),
            sent_at_millis: i as i64,
            ..ChatMessage::default()
        })
        .collect()
}

fn server(messages: usize) -> SimServer {
    SimServer::new().with_route(CHAT_SEND, CHAT_TOPIC).with_history(history(messages))
}

fn policy(base_delay: Duration, max_attempts: u32) -> SessionConfig {
    SessionConfig {
        reconnect: ReconnectionPolicy {
            base_delay,
            max_delay: Duration::from_secs(30),
            max_attempts,
        },
        ..SessionConfig::default()
    }
}

fn started(server: SimServer, session: SessionConfig) -> Simulation {
    let mut sim = Simulation::new(server, session, ChatConfig::default());
    sim.start().unwrap();
    sim
}

fn states(sim: &Simulation) -> Vec<ConnectionState> {
    sim.driver().snapshots().iter().map(|s| s.state).collect()
}

fn sends_to(sim: &Simulation, destination: &str) -> usize {
    sim.driver()
        .sent_frames()
        .iter()
        .filter(|f| f.command == Command::Send && f.destination() == Some(destination))
        .count()
}

fn contents(sim: &Simulation) -> Vec<String> {
    sim.runtime().chat().messages().iter().map(|m| m.content.clone()).collect()
}

#[test]
fn startup_connects_subscribes_and_loads_newest_page() {
    let sim = started(server(45), SessionConfig::default());

    assert_eq!(sim.runtime().session().state(), ConnectionState::Connected);
    assert_eq!(
        states(&sim),
        [ConnectionState::Disconnected, ConnectionState::Connecting, ConnectionState::Connected]
    );

    let requests = sim.driver().requests();
    assert!(requests.contains(&Request::FetchCredential));
    assert!(requests.contains(&Request::OpenTransport("ws://localhost:8080/ws".to_string())));
    assert!(requests.contains(&Request::FetchHistory(HistoryRequest { page: 0, size: 30 })));

    let connect = sim.driver().server(|s| s.received()[0].clone()).unwrap();
    assert_eq!(connect.command, Command::Connect);
    assert_eq!(connect.header("X-XSRF-TOKEN"), Some("sim-token"));
    assert_eq!(connect.header("accept-version"), Some("1.2"));

    assert_eq!(sim.driver().server(|s| s.subscribed_destinations().len()), Some(1));
    assert_eq!(sim.runtime().chat().phase(), ChatPhase::Live);
    assert_eq!(contents(&sim).first().map(String::as_str), Some("m15"));
    assert_eq!(contents(&sim).last().map(String::as_str), Some("m44"));
    assert_eq!(sim.driver().scrolls().last(), Some(&600));
}

#[test]
fn abnormal_close_reconnects_with_backoff_and_replays() {
    let mut sim = started(server(5), SessionConfig::default());
    sim.runtime_mut().subscribe_topic(PRICES).unwrap();
    sim.settle().unwrap();
    assert_eq!(sim.driver().server(|s| s.subscribed_destinations().len()), Some(2));

    sim.driver().drop_connection();
    sim.settle().unwrap();
    assert_eq!(sim.runtime().session().state(), ConnectionState::Disconnected);
    assert_eq!(sim.driver().open_count(), 1);

    sim.advance(Duration::from_millis(999)).unwrap();
    assert_eq!(sim.driver().open_count(), 1);

    sim.advance(Duration::from_millis(1)).unwrap();
    assert_eq!(sim.driver().open_count(), 2);
    assert_eq!(sim.runtime().session().state(), ConnectionState::Connected);

    let subscribes = sim
        .driver()
        .sent_frames()
        .iter()
        .filter(|f| f.command == Command::Subscribe)
        .count();
    assert_eq!(subscribes, 4);
    assert_eq!(
        sim.driver().server(|s| {
            s.subscribed_destinations().into_iter().map(str::to_string).collect::<Vec<_>>()
        }),
        Some(vec![CHAT_TOPIC.to_string(), PRICES.to_string()])
    );
    assert_eq!(sim.runtime().session().registered_topics().count(), 2);

    let after_drop = &states(&sim)[3..];
    assert_eq!(
        after_drop,
        [ConnectionState::Disconnected, ConnectionState::Connecting, ConnectionState::Connected]
    );
}

#[test]
fn backoff_doubles_then_halts_at_the_ceiling() {
    let driver = SimDriver::with_server(SimEnv::new(), server(0));
    driver.set_network(false);
    let mut sim = Simulation::with_driver(
        driver,
        policy(Duration::from_secs(1), 3),
        ChatConfig::default(),
    );
    sim.start().unwrap();
    assert_eq!(sim.driver().open_count(), 1);

    // Retries at 1s, 3s, 7s
    sim.advance(Duration::from_millis(999)).unwrap();
    assert_eq!(sim.driver().open_count(), 1);
    sim.advance(Duration::from_millis(1)).unwrap();
    assert_eq!(sim.driver().open_count(), 2);

    sim.advance(Duration::from_millis(1999)).unwrap();
    assert_eq!(sim.driver().open_count(), 2);
    sim.advance(Duration::from_millis(1)).unwrap();
    assert_eq!(sim.driver().open_count(), 3);

    sim.advance(Duration::from_secs(4)).unwrap();
    assert_eq!(sim.driver().open_count(), 4);

    assert!(sim.runtime().session().is_halted());
    assert_eq!(
        sim.runtime().session().snapshot().last_error,
        Some(SessionError::Terminal { failures: 4 })
    );

    sim.advance(Duration::from_secs(60)).unwrap();
    assert_eq!(sim.driver().open_count(), 4);

    // Explicit reconnect is the way back
    sim.driver().set_network(true);
    sim.send(DriverEvent::Reconnect).unwrap();
    assert_eq!(sim.runtime().session().state(), ConnectionState::Connected);
    assert_eq!(sim.runtime().session().consecutive_failures(), 0);
}

#[test]
fn rejected_handshake_halts_without_retry() {
    let mut broker = server(0);
    broker.reject_handshakes("invalid token");
    let mut sim = started(broker, SessionConfig::default());

    assert!(sim.runtime().session().is_halted());
    let error = sim.runtime().session().snapshot().last_error.clone().unwrap();
    assert_eq!(error, SessionError::HandshakeRejected("invalid token".to_string()));
    assert!(error.requires_refresh());

    sim.advance(Duration::from_secs(60)).unwrap();
    assert_eq!(sim.driver().open_count(), 1);

    sim.driver().server(SimServer::accept_handshakes);
    sim.send(DriverEvent::Reconnect).unwrap();
    assert_eq!(sim.runtime().session().state(), ConnectionState::Connected);
}

#[test]
fn clean_close_stays_disconnected() {
    let mut sim = started(server(0), SessionConfig::default());

    sim.send(DriverEvent::TransportClosed { clean: true }).unwrap();
    assert_eq!(sim.runtime().session().state(), ConnectionState::Disconnected);
    assert_eq!(sim.runtime().session().snapshot().last_error, None);

    sim.advance(Duration::from_secs(60)).unwrap();
    assert_eq!(sim.driver().open_count(), 1);
}

#[test]
fn credential_failure_is_retried() {
    let driver = SimDriver::with_server(SimEnv::new(), server(0));
    driver.set_credential(Err("csrf endpoint down".to_string()));
    let mut sim = Simulation::with_driver(driver, SessionConfig::default(), ChatConfig::default());
    sim.start().unwrap();

    assert_eq!(
        sim.runtime().session().snapshot().last_error,
        Some(SessionError::CredentialUnavailable("csrf endpoint down".to_string()))
    );
    assert_eq!(sim.driver().open_count(), 0);

    sim.driver().set_credential(Ok(Credential::new("X-XSRF-TOKEN", "fresh")));
    sim.advance(Duration::from_secs(1)).unwrap();
    assert_eq!(sim.runtime().session().state(), ConnectionState::Connected);
}

#[test]
fn stalled_attempt_times_out() {
    let driver = SimDriver::manual(SimEnv::new());
    let mut sim = Simulation::with_driver(driver, SessionConfig::default(), ChatConfig::default());
    sim.start().unwrap();
    assert_eq!(sim.runtime().session().state(), ConnectionState::Connecting);

    sim.advance(Duration::from_secs(10)).unwrap();
    assert_eq!(sim.runtime().session().state(), ConnectionState::Connecting);

    sim.advance(Duration::from_millis(1)).unwrap();
    assert!(matches!(
        sim.runtime().session().snapshot().last_error,
        Some(SessionError::ConnectTimeout { .. })
    ));
}

#[test]
fn silent_server_trips_the_idle_timeout() {
    let broker = server(0).with_heart_beat("10000,10000");
    let mut sim = started(broker, SessionConfig::default());

    sim.advance_by_steps(Duration::from_secs(20), Duration::from_secs(1)).unwrap();
    assert_eq!(sim.driver().open_count(), 1);
    assert!(sim.driver().sent_texts().iter().any(|t| t == "\n"));

    sim.advance_by_steps(Duration::from_secs(2), Duration::from_secs(1)).unwrap();
    let idled = sim
        .driver()
        .snapshots()
        .iter()
        .any(|s| matches!(s.last_error, Some(SessionError::IdleTimeout { .. })));
    assert!(idled);
    assert_eq!(sim.driver().open_count(), 2);
    assert_eq!(sim.runtime().session().state(), ConnectionState::Connected);
}

#[test]
fn own_message_is_published_and_echoed() {
    let mut sim = started(server(30), SessionConfig::default());

    sim.send(DriverEvent::Submit("  hello  ".to_string())).unwrap();

    assert_eq!(sends_to(&sim, CHAT_SEND), 1);
    assert_eq!(contents(&sim).last().map(String::as_str), Some("hello"));
    assert_eq!(sim.driver().scrolls().last(), Some(&620));
    assert!(sim.driver().notices().is_empty());
}

#[test]
fn oversized_message_is_refused_with_a_notice() {
    let mut sim = started(server(0), SessionConfig::default());

    sim.send(DriverEvent::Submit("x".repeat(MAX_BODY_SIZE + 10))).unwrap();

    assert!(matches!(
        sim.driver().notices().as_slice(),
        [ChatNotice::TooLarge { max: MAX_BODY_SIZE, .. }]
    ));
    assert_eq!(sends_to(&sim, CHAT_SEND), 0);
    assert_eq!(sim.runtime().session().state(), ConnectionState::Connected);

    sim.send(DriverEvent::Submit("short".to_string())).unwrap();
    assert_eq!(sends_to(&sim, CHAT_SEND), 1);
    assert_eq!(contents(&sim), ["short"]);
}

#[test]
fn batched_broker_frames_all_arrive() {
    let mut sim = started(server(0), SessionConfig::default());
    let frame = |content: &str| {
        let body = ChatMessage { content: content.to_string(), ..ChatMessage::default() };
        Frame::new(Command::Message)
            .with_header("destination", CHAT_TOPIC)
            .with_header("subscription", "sub-0")
            .with_body(serde_json::to_string(&body).unwrap())
            .encode()
            .unwrap()
    };

    sim.send(DriverEvent::TextReceived(format!("{}{}", frame("one"), frame("two")))).unwrap();

    assert_eq!(contents(&sim), ["one", "two"]);
}

#[test]
fn send_while_disconnected_reconnects_and_retries_once() {
    let mut sim = started(server(0), policy(Duration::from_secs(5), 10));
    sim.driver().drop_connection();
    sim.settle().unwrap();
    sim.advance(Duration::from_secs(1)).unwrap();
    assert_eq!(sim.runtime().session().state(), ConnectionState::Disconnected);

    sim.send(DriverEvent::Submit("hello".to_string())).unwrap();
    assert_eq!(sim.runtime().session().state(), ConnectionState::Connected);
    assert!(sim.runtime().chat().has_pending_send());
    assert_eq!(sends_to(&sim, CHAT_SEND), 0);

    sim.advance(Duration::from_millis(1500)).unwrap();
    assert_eq!(sends_to(&sim, CHAT_SEND), 1);
    assert_eq!(contents(&sim), ["hello"]);
    assert!(sim.driver().notices().is_empty());
}

#[test]
fn send_retry_fails_when_reconnect_fails() {
    let mut sim = started(server(0), policy(Duration::from_secs(5), 10));
    sim.driver().set_network(false);
    sim.driver().drop_connection();
    sim.settle().unwrap();
    sim.advance(Duration::from_secs(1)).unwrap();

    sim.send(DriverEvent::Submit("one".to_string())).unwrap();
    sim.send(DriverEvent::Submit("two".to_string())).unwrap();
    assert_eq!(sim.driver().notices(), [ChatNotice::SendFailed]);

    sim.advance(Duration::from_millis(1500)).unwrap();
    assert_eq!(sim.driver().notices(), [ChatNotice::SendFailed, ChatNotice::SendFailed]);
    assert_eq!(sends_to(&sim, CHAT_SEND), 0);
}

#[test]
fn rapid_sends_are_throttled() {
    let mut sim = started(server(0), SessionConfig::default());

    for i in 0..5 {
        sim.send(DriverEvent::Submit(format!("msg {i}"))).unwrap();
    }
    assert_eq!(sends_to(&sim, CHAT_SEND), 5);

    sim.send(DriverEvent::Submit("sixth".to_string())).unwrap();
    sim.send(DriverEvent::Submit("seventh".to_string())).unwrap();
    assert_eq!(
        sim.driver().notices(),
        [
            ChatNotice::Denied(Denial::RateExceeded { cooldown_secs: 5 }),
            ChatNotice::Denied(Denial::Cooldown { remaining_secs: 5 }),
        ]
    );
    assert_eq!(sends_to(&sim, CHAT_SEND), 5);

    sim.advance(Duration::from_secs(6)).unwrap();
    sim.send(DriverEvent::Submit("later".to_string())).unwrap();
    assert_eq!(sends_to(&sim, CHAT_SEND), 6);

    sim.send(DriverEvent::Submit("   ".to_string())).unwrap();
    assert_eq!(sim.driver().notices().last(), Some(&ChatNotice::Denied(Denial::Empty)));
}

#[test]
fn older_pages_load_at_the_top_and_keep_the_view_steady() {
    let mut sim = started(server(45), SessionConfig::default());

    sim.send(DriverEvent::Viewport(Viewport {
        offset: 0,
        content_extent: 600,
        viewport_extent: 200,
    }))
    .unwrap();
    sim.send(DriverEvent::ScrolledToTop).unwrap();

    assert_eq!(contents(&sim).len(), 45);
    assert_eq!(contents(&sim).first().map(String::as_str), Some("m0"));
    // 15 rows of 20px landed above the view
    assert_eq!(sim.driver().scrolls().last(), Some(&300));
    assert!(!sim.runtime().chat().cursor().has_more());

    sim.send(DriverEvent::ScrolledToTop).unwrap();
    let fetches = sim
        .driver()
        .requests()
        .iter()
        .filter(|r| matches!(r, Request::FetchHistory(_)))
        .count();
    assert_eq!(fetches, 2);
}

#[test]
fn failed_history_can_be_retried_from_the_top() {
    let driver = SimDriver::with_server(SimEnv::new(), server(10));
    driver.fail_next_history("503 service unavailable");
    let mut sim = Simulation::with_driver(driver, SessionConfig::default(), ChatConfig::default());
    sim.start().unwrap();

    assert_eq!(
        sim.driver().notices(),
        [ChatNotice::HistoryFailed("503 service unavailable".to_string())]
    );
    assert_eq!(sim.runtime().chat().phase(), ChatPhase::Live);
    assert!(contents(&sim).is_empty());

    sim.send(DriverEvent::ScrolledToTop).unwrap();
    assert_eq!(contents(&sim).len(), 10);
}

#[test]
fn live_messages_follow_the_bottom() {
    let mut sim = started(server(30), SessionConfig::default());

    sim.driver().push_chat(CHAT_TOPIC, "alice", "gm");
    sim.settle().unwrap();

    assert_eq!(contents(&sim).last().map(String::as_str), Some("gm"));
    assert_eq!(sim.driver().scrolls().last(), Some(&620));
}

#[test]
fn chat_keepalives_are_sent_and_never_shown() {
    let mut sim = started(server(3), SessionConfig::default());

    sim.advance_by_steps(Duration::from_secs(31), Duration::from_secs(1)).unwrap();

    let pings = sim
        .driver()
        .sent_frames()
        .iter()
        .filter(|f| f.command == Command::Send && f.body.contains("\"ping\":true"))
        .count();
    assert_eq!(pings, 1);
    assert_eq!(contents(&sim).len(), 3);
}

#[test]
fn extra_topics_reach_the_driver() {
    let mut sim = started(server(0), SessionConfig::default());
    sim.runtime_mut().subscribe_topic(PRICES).unwrap();

    sim.driver().push(PRICES, r#"{"symbol":"BTC","price":64000}"#);
    sim.settle().unwrap();

    let delivered = sim.driver().topic_messages();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].destination, PRICES);

    sim.runtime_mut().unsubscribe_topic(PRICES).unwrap();
    sim.driver().push(PRICES, "{}");
    sim.settle().unwrap();
    assert_eq!(sim.driver().topic_messages().len(), 1);
}

#[test]
fn stop_unsubscribes_and_disconnects() {
    let mut sim = started(server(0), SessionConfig::default());

    sim.runtime_mut().stop().unwrap();

    let commands: Vec<Command> = sim.driver().sent_frames().iter().map(|f| f.command).collect();
    assert_eq!(&commands[commands.len() - 2..], [Command::Unsubscribe, Command::Disconnect]);
    assert_eq!(sim.driver().requests().last(), Some(&Request::CloseTransport));
    assert_eq!(states(&sim).last(), Some(&ConnectionState::Disconnected));
    assert!(sim.driver().is_stopped());
}
