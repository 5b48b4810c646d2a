use std::thread;
use std::time::{Duration, Instant};

use holo::error::TransportErrorKind;
use holo::motion::{CircularMotion, LinearMotion};
use holo::net::{DeviceEvent, TrackUpdate};
use holo::{
    Animation, ConnectionState, DeviceResponder, Engine, EngineConfig, EngineEvent, EngineHandle,
    MotionModel, Position, TrackId, TrackParameter,
};

fn fast_config() -> EngineConfig {
    EngineConfig {
        tick_rate: 100,
        heartbeat_interval: Duration::from_millis(20),
        handshake_timeout: Duration::from_millis(100),
        backoff_initial: Duration::from_millis(20),
        backoff_max: Duration::from_millis(100),
        ..Default::default()
    }
}

/// Polls the responder until `wanted` matches or `timeout_ms` passes,
/// returning everything seen on the way.
fn pump(
    responder: &mut DeviceResponder,
    timeout_ms: u64,
    wanted: impl Fn(&DeviceEvent) -> bool,
) -> (bool, Vec<DeviceEvent>) {
    let start = Instant::now();
    let mut seen = Vec::new();
    while start.elapsed() < Duration::from_millis(timeout_ms) {
        let events = responder.poll().unwrap();
        let found = events.iter().any(&wanted);
        seen.extend(events);
        if found {
            return (true, seen);
        }
        thread::sleep(Duration::from_millis(1));
    }
    (false, seen)
}

fn connect(engine: &EngineHandle, responder: &mut DeviceResponder) {
    engine
        .connect("127.0.0.1", responder.local_addr().port())
        .unwrap();
    let (accepted, _) = pump(responder, 1000, |e| {
        matches!(e, DeviceEvent::Handshake { accepted: true, .. })
    });
    assert!(accepted, "device never saw a handshake");

    let start = Instant::now();
    while !engine.health().is_connected() && start.elapsed() < Duration::from_secs(1) {
        responder.poll().unwrap();
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(engine.health().link.state, ConnectionState::Connected);
}

#[test]
fn animated_track_streams_to_device() {
    let mut responder = DeviceResponder::bind("127.0.0.1:0").unwrap();
    let engine = Engine::start(fast_config()).unwrap();

    engine
        .add_track(TrackId(7), "orbit", Position::default())
        .unwrap();
    let orbit = CircularMotion::new(glam::DVec3::ZERO, 2.0, 0.5);
    engine
        .attach_animation(TrackId(7), Animation::new(MotionModel::Circular(orbit)).unwrap())
        .unwrap();

    connect(&engine, &mut responder);

    let (found, seen) = pump(&mut responder, 1000, |e| {
        matches!(
            e,
            DeviceEvent::Update {
                update: TrackUpdate::Position { track: 7, .. },
                ..
            }
        )
    });
    assert!(found);

    for event in seen {
        if let DeviceEvent::Update {
            update: TrackUpdate::Position { values, polar, .. },
            ..
        } = event
        {
            assert!(!polar);
            let radius = (values[0].powi(2) + values[1].powi(2)).sqrt();
            assert!((radius - 2.0).abs() < 1e-3, "radius {radius}");
        }
    }
}

#[test]
fn static_track_is_resent_after_connecting() {
    let mut responder = DeviceResponder::bind("127.0.0.1:0").unwrap();
    let engine = Engine::start(fast_config()).unwrap();

    // Added and emitted before any device exists.
    engine
        .add_track(TrackId(1), "still", Position::polar(45.0, 10.0, 3.0))
        .unwrap();
    thread::sleep(Duration::from_millis(50));

    connect(&engine, &mut responder);
    let (found, seen) = pump(&mut responder, 1000, |e| {
        matches!(e, DeviceEvent::Update { update: TrackUpdate::Position { track: 1, .. }, .. })
    });
    assert!(found);
    let polar = seen.iter().any(|e| {
        matches!(
            e,
            DeviceEvent::Update {
                update: TrackUpdate::Position { track: 1, polar: true, .. },
                ..
            }
        )
    });
    assert!(polar);
}

#[test]
fn track_parameters_reach_the_device() {
    let mut responder = DeviceResponder::bind("127.0.0.1:0").unwrap();
    let engine = Engine::start(fast_config()).unwrap();
    engine
        .add_track(TrackId(2), "voice", Position::default())
        .unwrap();
    connect(&engine, &mut responder);

    engine
        .set_track_parameter(TrackId(2), TrackParameter::Gain(-6.0))
        .unwrap();
    let (found, _) = pump(&mut responder, 1000, |e| match e {
        DeviceEvent::Update {
            update: TrackUpdate::Parameter { track: 2, name, .. },
            ..
        } => name == "gain/value",
        _ => false,
    });
    assert!(found);
}

#[test]
fn parameters_set_before_connecting_are_delivered() {
    let mut responder = DeviceResponder::bind("127.0.0.1:0").unwrap();
    let engine = Engine::start(fast_config()).unwrap();
    engine
        .add_track(TrackId(4), "early", Position::default())
        .unwrap();
    engine
        .set_track_parameter(TrackId(4), TrackParameter::Gain(-6.0))
        .unwrap();
    engine
        .set_track_parameter(TrackId(4), TrackParameter::Mute(true))
        .unwrap();
    thread::sleep(Duration::from_millis(50));

    engine
        .connect("127.0.0.1", responder.local_addr().port())
        .unwrap();
    let (found, seen) = pump(&mut responder, 2000, |e| match e {
        DeviceEvent::Update {
            update: TrackUpdate::Parameter { track: 4, name, .. },
            ..
        } => name == "mute",
        _ => false,
    });
    assert!(found, "mute never reached the device");

    let gain = seen.iter().find_map(|e| match e {
        DeviceEvent::Update {
            update: TrackUpdate::Parameter { track: 4, name, args },
            ..
        } if name == "gain/value" => Some(args.clone()),
        _ => None,
    });
    assert_eq!(gain, Some(vec![rosc::OscType::Float(-6.0)]));
}

#[test]
fn heartbeats_measure_latency() {
    let mut responder = DeviceResponder::bind("127.0.0.1:0").unwrap();
    let engine = Engine::start(fast_config()).unwrap();
    connect(&engine, &mut responder);

    let start = Instant::now();
    while engine.health().link.latency.is_none() && start.elapsed() < Duration::from_secs(2) {
        responder.poll().unwrap();
        thread::sleep(Duration::from_millis(1));
    }
    let health = engine.health();
    assert!(health.link.latency.is_some());
    assert!(health.link.last_exchange.is_some());
    assert_eq!(health.link.retry_count, 0);
}

#[test]
fn rejected_handshake_is_reported() {
    let mut responder = DeviceResponder::bind("127.0.0.1:0").unwrap();
    responder.set_reject_reason(Some("busy".into()));
    let mut engine = Engine::start(fast_config()).unwrap();
    let events = engine.events().unwrap();

    engine
        .connect("127.0.0.1", responder.local_addr().port())
        .unwrap();
    let (seen, _) = pump(&mut responder, 1000, |e| {
        matches!(e, DeviceEvent::Handshake { accepted: false, .. })
    });
    assert!(seen);

    let start = Instant::now();
    let mut rejected = false;
    while !rejected && start.elapsed() < Duration::from_secs(1) {
        rejected = events.try_iter().any(|e| {
            matches!(
                e,
                EngineEvent::ConnectionFailed {
                    kind: TransportErrorKind::HandshakeRejected,
                    ..
                }
            )
        });
        thread::sleep(Duration::from_millis(2));
    }
    assert!(rejected);
    assert_ne!(engine.health().link.state, ConnectionState::Connected);
}

#[test]
fn device_status_becomes_an_event() {
    let mut responder = DeviceResponder::bind("127.0.0.1:0").unwrap();
    let mut engine = Engine::start(fast_config()).unwrap();
    let events = engine.events().unwrap();
    connect(&engine, &mut responder);

    responder.send_error("speaker 3 offline").unwrap();

    let start = Instant::now();
    let mut reported = false;
    while !reported && start.elapsed() < Duration::from_secs(1) {
        responder.poll().unwrap();
        reported = events.try_iter().any(|e| match e {
            EngineEvent::DeviceStatus { error, message } => error && message == "speaker 3 offline",
            _ => false,
        });
        thread::sleep(Duration::from_millis(2));
    }
    assert!(reported);
}

#[test]
fn nothing_is_sent_after_stop() {
    let mut responder = DeviceResponder::bind("127.0.0.1:0").unwrap();
    let mut engine = Engine::start(fast_config()).unwrap();
    engine
        .add_track(TrackId(1), "sweep", Position::default())
        .unwrap();
    let sweep = LinearMotion::new(
        Position::cartesian(-5.0, 0.0, 0.0),
        Position::cartesian(5.0, 0.0, 0.0),
        10.0,
    );
    engine
        .attach_animation(TrackId(1), Animation::new(MotionModel::Linear(sweep)).unwrap())
        .unwrap();
    connect(&engine, &mut responder);

    engine.stop();
    assert!(!engine.is_running());
    // Drain whatever was already in flight.
    thread::sleep(Duration::from_millis(20));
    responder.poll().unwrap();

    thread::sleep(Duration::from_millis(100));
    let late = responder.poll().unwrap();
    assert!(late.is_empty(), "received after stop: {late:?}");
}
