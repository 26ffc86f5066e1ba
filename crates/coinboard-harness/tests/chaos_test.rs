//! Seeded fault injection.
//!
//! Random drops, network flaps, chat traffic, and clock jumps. Invariants
//! are checked after every event; once the network heals the session must
//! recover with every subscription restored.

use std::time::Duration;

use coinboard_chat::ChatConfig;
use coinboard_client::DriverEvent;
use coinboard_core::{ConnectionState, SessionConfig};
use coinboard_harness::{SimServer, Simulation};
use coinboard_proto::ChatMessage;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const CHAT_TOPIC: &str = "/topic/chat";
const PRICES: &str = "/topic/prices";

fn broker() -> SimServer {
    let history = (0..50)
        .map(|i| ChatMessage { content: format!("seed {i}"), sent_at_millis: i, ..ChatMessage::default() })
        .collect();
    SimServer::new().with_route("/app/chat.send", CHAT_TOPIC).with_history(history)
}

fn run_seed(seed: u64) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut sim = Simulation::new(broker(), SessionConfig::default(), ChatConfig::default());
    sim.start().unwrap();
    sim.runtime_mut().subscribe_topic(PRICES).unwrap();
    sim.settle().unwrap();

    for _ in 0..300 {
        match rng.gen_range(0..100) {
            0..=7 => sim.driver().drop_connection(),
            8..=12 => sim.driver().set_network(false),
            13..=20 => sim.driver().set_network(true),
            21..=40 => {
                let text = format!("chaos {}", rng.gen_range(0..1000));
                sim.driver().push_chat(CHAT_TOPIC, "peer", &text);
            },
            41..=50 => sim.driver().push(PRICES, r#"{"price":1}"#),
            51..=60 => sim.driver().inject(DriverEvent::Submit("hi".to_string())),
            61..=65 => sim.driver().inject(DriverEvent::ScrolledToTop),
            66..=68 => sim.driver().inject(DriverEvent::Reconnect),
            _ => {
                let jump = Duration::from_millis(rng.gen_range(0..3_000));
                sim.advance(jump).unwrap();
            },
        }
        sim.settle().unwrap();
    }

    // Heal and give the backoff time to run out
    sim.driver().set_network(true);
    sim.advance(Duration::from_secs(2)).unwrap();
    if sim.runtime().session().state() == ConnectionState::Disconnected {
        sim.send(DriverEvent::Reconnect).unwrap();
    }
    sim.advance_by_steps(Duration::from_secs(90), Duration::from_millis(500)).unwrap();

    assert_eq!(
        sim.runtime().session().state(),
        ConnectionState::Connected,
        "seed {seed} did not recover"
    );
    let broker_topics = sim
        .driver()
        .server(|s| s.subscribed_destinations().into_iter().map(str::to_string).collect::<Vec<_>>())
        .unwrap();
    assert_eq!(broker_topics, [CHAT_TOPIC, PRICES], "seed {seed}");
}

#[test]
fn sessions_survive_random_faults() {
    for seed in 0..16 {
        run_seed(seed);
    }
}

#[test]
fn same_seed_same_outcome() {
    let trace = |seed| {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut sim = Simulation::new(broker(), SessionConfig::default(), ChatConfig::default());
        sim.start().unwrap();
        for _ in 0..100 {
            if rng.gen_bool(0.2) {
                sim.driver().drop_connection();
            }
            sim.advance(Duration::from_millis(rng.gen_range(0..2_000))).unwrap();
        }
        sim.driver().requests()
    };

    assert_eq!(trace(7), trace(7));
}
