mod config;
mod scene;

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::Receiver;

use holo::net::{DeviceEvent, TrackUpdate, protocol};
use holo::{DeviceResponder, Engine, EngineEvent, EngineHandle};

use config::RunArgs;
use scene::Scene;

#[derive(Parser)]
#[command(name = "holo-driver")]
#[command(about = "Headless host for the holo position engine")]
struct Cli {
    #[command(subcommand)]
    command: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Stream a demo scene to a device.
    Run(RunArgs),
    /// Act as a device: accept a controller and log what it sends.
    Device(DeviceArgs),
}

#[derive(Args)]
struct DeviceArgs {
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: String,

    #[arg(short, long, default_value_t = protocol::DEFAULT_DEVICE_PORT)]
    port: u16,

    #[arg(long, help = "Reject every handshake with this reason")]
    reject: Option<String>,

    #[arg(long, help = "Log every position update instead of a per-second summary")]
    verbose: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Mode::Run(args) => run(args),
        Mode::Device(args) => device(args),
    }
}

fn run(args: RunArgs) -> Result<()> {
    let scene = args.scene;
    let duration = Duration::from_secs_f64(args.duration.max(0.0));
    let (host, port) = (args.host.clone(), args.port);

    let mut engine = Engine::start(args.into_config()).context("starting engine")?;
    let events = engine
        .events()
        .context("event stream already taken")?;

    scene.build(&engine).context("building scene")?;
    log::info!("scene {} loaded with {} tracks", scene.as_str(), scene.track_count());

    engine
        .connect(&host, port)
        .with_context(|| format!("connecting to {host}:{port}"))?;

    let started = Instant::now();
    let mut last_report = Instant::now();
    while started.elapsed() < duration && engine.is_running() {
        log_events(&events);
        if last_report.elapsed() >= Duration::from_secs(1) {
            report(&engine);
            last_report = Instant::now();
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    engine.stop();
    log_events(&events);
    report(&engine);
    Ok(())
}

fn log_events(events: &Receiver<EngineEvent>) {
    for event in events.try_iter() {
        match event {
            EngineEvent::ConnectionStateChanged { from, to } => {
                log::info!("link {} -> {}", from.as_str(), to.as_str());
            }
            EngineEvent::ConnectionFailed {
                kind,
                message,
                retry_in,
            } => {
                log::warn!("connection failed ({kind:?}): {message}, retrying in {retry_in:?}");
            }
            EngineEvent::TickOverrun {
                tick,
                duration,
                overruns,
            } => {
                log::warn!("tick {tick} overran ({duration:?}, {overruns} total)");
            }
            EngineEvent::TrackDegraded { track, reason } => {
                log::warn!("track {} degraded: {reason}", track.0);
            }
            EngineEvent::GroupDegraded { group } => {
                log::warn!("group {} degraded", group.0);
            }
            EngineEvent::GroupRecovered { group } => {
                log::info!("group {} recovered", group.0);
            }
            EngineEvent::DeviceStatus { error, message } => {
                if error {
                    log::error!("device: {message}");
                } else {
                    log::info!("device: {message}");
                }
            }
            EngineEvent::BatchDropped { reason } => {
                log::debug!("batch dropped: {}", reason.as_str());
            }
            EngineEvent::Health(snapshot) => {
                log::debug!("{snapshot:?}");
            }
            EngineEvent::Fatal { message } => {
                log::error!("engine stopped: {message}");
            }
        }
    }
}

fn report(engine: &EngineHandle) {
    let health = engine.health();
    let latency = health
        .link
        .latency
        .map_or_else(|| "-".to_string(), |l| format!("{:.2}ms", l.as_secs_f64() * 1000.0));
    log::info!(
        "{} | tick {} | batch {} in {} datagrams | latency {} | errors {:.1}% | overruns {}",
        health.link.state.as_str(),
        health.scheduler.tick,
        health.scheduler.batch_size,
        health.scheduler.datagrams,
        latency,
        health.link.error_rate * 100.0,
        health.scheduler.overruns,
    );
    if health.is_degraded() {
        log::warn!(
            "degraded tracks {:?}, groups {:?}",
            health.scheduler.degraded_tracks,
            health.scheduler.degraded_groups
        );
    }
}

fn device(args: DeviceArgs) -> Result<()> {
    let bind_addr = format!("{}:{}", args.bind, args.port);
    let mut responder =
        DeviceResponder::bind(&bind_addr).with_context(|| format!("binding {bind_addr}"))?;
    responder.set_reject_reason(args.reject);
    log::info!("device listening on {}", responder.local_addr());

    let verbose = args.verbose;
    let mut updates = 0u64;
    let mut window = Instant::now();

    responder.run(|event| {
        match event {
            DeviceEvent::Handshake { peer, accepted } => {
                log::info!("handshake from {peer}: {}", if accepted { "accepted" } else { "rejected" });
            }
            DeviceEvent::Subscribed { peer, port } => {
                log::info!("{peer} subscribed for replies on port {port}");
            }
            DeviceEvent::Heartbeat { peer } => log::trace!("ping from {peer}"),
            DeviceEvent::Datagram { peer, size } => log::trace!("{size} bytes from {peer}"),
            DeviceEvent::Update { update, .. } => {
                updates += 1;
                if verbose {
                    match update {
                        TrackUpdate::Position {
                            track,
                            polar,
                            values,
                        } => log::info!(
                            "track {track} {} {:.3} {:.3} {:.3}",
                            if polar { "aed" } else { "xyz" },
                            values[0],
                            values[1],
                            values[2]
                        ),
                        TrackUpdate::Parameter { track, name, args } => {
                            log::info!("track {track} {name} {args:?}");
                        }
                    }
                }
            }
        }

        if !verbose && window.elapsed() >= Duration::from_secs(1) {
            log::info!("{updates} updates in the last second");
            updates = 0;
            window = Instant::now();
        }
    })?;

    Ok(())
}
