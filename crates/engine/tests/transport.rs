use std::collections::BTreeSet;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use holo::net::{DeviceEvent, DeviceLink, TrackUpdate, protocol};
use holo::{ConnectionState, DeviceResponder, EngineConfig, Position, TrackId};

#[test]
fn large_batch_is_split_and_fully_delivered() {
    let config = EngineConfig {
        max_datagram_size: 512,
        ..Default::default()
    };
    let mut responder = DeviceResponder::bind("127.0.0.1:0").unwrap();
    let mut link = DeviceLink::new(&config);
    link.connect(responder.local_addr(), Instant::now()).unwrap();

    let start = Instant::now();
    while link.state() != ConnectionState::Connected && start.elapsed() < Duration::from_secs(1) {
        responder.poll().unwrap();
        link.poll(Instant::now());
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(link.state(), ConnectionState::Connected);

    let messages = (1..=300u32)
        .map(|id| {
            protocol::position_message(TrackId(id), &Position::cartesian(id as f64, 0.0, 0.0))
        })
        .collect();
    let datagrams = protocol::pack_bundles(
        messages,
        protocol::timetag(SystemTime::now()),
        config.max_datagram_size,
    )
    .unwrap()
    .datagrams;
    assert!(datagrams.len() > 1);
    assert!(datagrams.iter().all(|d| d.len() <= 512));
    link.send_batch(datagrams);

    let mut received = BTreeSet::new();
    let start = Instant::now();
    while received.len() < 300 && start.elapsed() < Duration::from_secs(1) {
        for event in responder.poll().unwrap() {
            if let DeviceEvent::Update {
                update: TrackUpdate::Position { track, values, .. },
                ..
            } = event
            {
                assert_eq!(values[0], track as f32);
                received.insert(track);
            }
        }
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(received, (1..=300).collect::<BTreeSet<u32>>());
    assert_eq!(link.metrics().dropped_batches, 0);
}

#[test]
fn unanswered_heartbeats_trigger_recovery() {
    let config = EngineConfig {
        heartbeat_interval: Duration::from_millis(10),
        ..Default::default()
    };
    let mut responder = DeviceResponder::bind("127.0.0.1:0").unwrap();
    let mut link = DeviceLink::new(&config);
    link.connect(responder.local_addr(), Instant::now()).unwrap();

    let start = Instant::now();
    while link.state() != ConnectionState::Connected && start.elapsed() < Duration::from_secs(1) {
        responder.poll().unwrap();
        link.poll(Instant::now());
        thread::sleep(Duration::from_millis(1));
    }
    assert!(link.take_established());

    responder.set_answer_heartbeats(false);
    let start = Instant::now();
    while link.state() == ConnectionState::Connected && start.elapsed() < Duration::from_secs(1) {
        responder.poll().unwrap();
        link.poll(Instant::now());
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(link.state(), ConnectionState::Recovering);

    // The device still accepts handshakes, so the link comes back.
    let start = Instant::now();
    while link.state() != ConnectionState::Connected && start.elapsed() < Duration::from_secs(2) {
        responder.poll().unwrap();
        link.poll(Instant::now());
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(link.state(), ConnectionState::Connected);
    assert!(link.take_established());
}
