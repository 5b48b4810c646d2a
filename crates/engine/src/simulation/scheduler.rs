use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Instant, SystemTime};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};

use crate::config::EngineConfig;
use crate::coord::Position;
use crate::error::{EngineError, Result, TransportError, ValidationError};
use crate::event::{DropReason, EngineEvent, EventSink};
use crate::formation::{FormationTemplate, GroupId, Member, MemberOffset, Relationship};
use crate::health::{HealthSnapshot, SchedulerHealth};
use crate::motion::{Animation, CoordinateMode, ParamValue};
use crate::net::{ConnectionState, DeviceLink, protocol};
use crate::registry::{Command, Registry, TrackId, TrackParameter};

use super::frame::{Frame, TrackPosition, compute_frame};
use super::tick::TickClock;

enum Control {
    Command(Command, Sender<Result<(), ValidationError>>),
    Connect(SocketAddr, Sender<Result<(), TransportError>>),
    Disconnect(Sender<()>),
}

#[derive(Debug, Default)]
struct Shared {
    health: Mutex<HealthSnapshot>,
    positions: Mutex<Vec<TrackPosition>>,
}

pub struct Engine;

impl Engine {
    /// Spawns the scheduler thread and returns the handle that controls it.
    pub fn start(config: EngineConfig) -> Result<EngineHandle> {
        let (events, event_rx) = EventSink::new(config.event_capacity);
        let (control_tx, control_rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let shared = Arc::new(Shared::default());

        let scheduler = Scheduler {
            registry: Registry::new(),
            link: DeviceLink::new(&config),
            clock: TickClock::new(config.tick_rate, Instant::now()),
            events,
            control: control_rx,
            running: Arc::clone(&running),
            shared: Arc::clone(&shared),
            next_health: None,
            config,
        };

        let thread = thread::Builder::new()
            .name("holo-tick".into())
            .spawn(move || scheduler.run())
            .map_err(EngineError::Spawn)?;

        Ok(EngineHandle {
            control: control_tx,
            running,
            shared,
            events: Some(event_rx),
            thread: Some(thread),
        })
    }
}

/// Host-side handle to a running engine.
///
/// Every mutation blocks until the scheduler has applied it at the next tick
/// boundary and returns its outcome. Dropping the handle stops the engine.
pub struct EngineHandle {
    control: Sender<Control>,
    running: Arc<AtomicBool>,
    shared: Arc<Shared>,
    events: Option<Receiver<EngineEvent>>,
    thread: Option<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Queues `command` and waits for the tick that applies it.
    pub fn apply(&self, command: Command) -> Result<()> {
        let (reply, outcome) = bounded(1);
        self.send(Control::Command(command, reply))?;
        outcome.recv().map_err(|_| EngineError::SchedulerStopped)??;
        Ok(())
    }

    pub fn add_track(&self, id: TrackId, name: impl Into<String>, position: Position) -> Result<()> {
        self.apply(Command::AddTrack {
            id,
            name: name.into(),
            position,
        })
    }

    pub fn remove_track(&self, id: TrackId) -> Result<()> {
        self.apply(Command::RemoveTrack(id))
    }

    pub fn set_track_position(&self, id: TrackId, position: Position) -> Result<()> {
        self.apply(Command::SetTrackPosition(id, position))
    }

    pub fn set_track_active(&self, id: TrackId, active: bool) -> Result<()> {
        self.apply(Command::SetTrackActive(id, active))
    }

    pub fn attach_animation(&self, id: TrackId, animation: Animation) -> Result<()> {
        self.apply(Command::AttachAnimation(id, animation))
    }

    pub fn detach_animation(&self, id: TrackId) -> Result<()> {
        self.apply(Command::DetachAnimation(id))
    }

    pub fn set_animation_parameter(
        &self,
        id: TrackId,
        name: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Result<()> {
        self.apply(Command::SetAnimationParameter {
            track: id,
            name: name.into(),
            value: value.into(),
        })
    }

    pub fn set_track_parameter(&self, id: TrackId, parameter: TrackParameter) -> Result<()> {
        self.apply(Command::SetTrackParameter(id, parameter))
    }

    pub fn add_group(
        &self,
        id: GroupId,
        name: impl Into<String>,
        relationship: Relationship,
    ) -> Result<()> {
        self.apply(Command::AddGroup {
            id,
            name: name.into(),
            relationship,
        })
    }

    pub fn remove_group(&self, id: GroupId) -> Result<()> {
        self.apply(Command::RemoveGroup(id))
    }

    pub fn add_group_member(&self, id: GroupId, member: Member) -> Result<()> {
        self.apply(Command::AddGroupMember(id, member))
    }

    pub fn remove_group_member(&self, id: GroupId, member: Member) -> Result<()> {
        self.apply(Command::RemoveGroupMember(id, member))
    }

    pub fn set_relationship(&self, id: GroupId, relationship: Relationship) -> Result<()> {
        self.apply(Command::SetRelationship(id, relationship))
    }

    pub fn set_formation(&self, id: GroupId, formation: Option<FormationTemplate>) -> Result<()> {
        self.apply(Command::SetFormation(id, formation))
    }

    pub fn set_member_offset(&self, id: GroupId, member: Member, offset: MemberOffset) -> Result<()> {
        self.apply(Command::SetMemberOffset(id, member, offset))
    }

    pub fn set_group_animation(&self, id: GroupId, animation: Option<Animation>) -> Result<()> {
        self.apply(Command::SetGroupAnimation(id, animation))
    }

    pub fn set_group_animation_parameter(
        &self,
        id: GroupId,
        name: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Result<()> {
        self.apply(Command::SetGroupAnimationParameter {
            group: id,
            name: name.into(),
            value: value.into(),
        })
    }

    pub fn set_group_mode(&self, id: GroupId, mode: CoordinateMode) -> Result<()> {
        self.apply(Command::SetGroupMode(id, mode))
    }

    /// Resolves `host` and starts the handshake. Completion is reported on
    /// the event stream and in [`EngineHandle::health`].
    pub fn connect(&self, host: &str, port: u16) -> Result<()> {
        let remote = (host, port)
            .to_socket_addrs()
            .map_err(TransportError::Io)?
            .next()
            .ok_or_else(|| {
                TransportError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{host} did not resolve to any address"),
                ))
            })?;

        let (reply, outcome) = bounded(1);
        self.send(Control::Connect(remote, reply))?;
        outcome.recv().map_err(|_| EngineError::SchedulerStopped)??;
        Ok(())
    }

    pub fn disconnect(&self) -> Result<()> {
        let (reply, outcome) = bounded(1);
        self.send(Control::Disconnect(reply))?;
        outcome.recv().map_err(|_| EngineError::SchedulerStopped)
    }

    pub fn health(&self) -> HealthSnapshot {
        self.shared
            .health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Last emitted position of every active track, in id order.
    pub fn positions(&self) -> Vec<TrackPosition> {
        self.shared
            .positions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Takes the event stream. Only the first call returns it.
    pub fn events(&mut self) -> Option<Receiver<EngineEvent>> {
        self.events.take()
    }

    /// Stops the scheduler and waits for it. No datagram is sent after this
    /// returns; queued batches are discarded.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("scheduler thread panicked");
            }
        }
    }

    fn send(&self, control: Control) -> Result<()> {
        if !self.is_running() {
            return Err(EngineError::SchedulerStopped);
        }
        self.control
            .send(control)
            .map_err(|_| EngineError::SchedulerStopped)
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Scheduler {
    config: EngineConfig,
    registry: Registry,
    link: DeviceLink,
    clock: TickClock,
    events: EventSink,
    control: Receiver<Control>,
    running: Arc<AtomicBool>,
    shared: Arc<Shared>,
    next_health: Option<Instant>,
}

impl Scheduler {
    fn run(mut self) {
        log::info!("scheduler started at {} Hz", self.config.tick_rate.max(1));

        while self.running.load(Ordering::SeqCst) {
            let now = Instant::now();
            if self.clock.is_due(now) {
                self.tick(now);
            } else {
                thread::sleep(self.clock.until_next(now));
            }
        }

        self.link.disconnect();
        self.events.extend(self.link.drain_events());
        self.store_health(self.health(0, 0, &Frame::default()));
        log::info!(
            "scheduler stopped after {} ticks ({} overruns)",
            self.clock.tick(),
            self.clock.overruns()
        );
    }

    fn tick(&mut self, started: Instant) {
        let now = self.clock.seconds(started);
        let applied = self.apply_controls(started, now);

        self.link.poll(started);
        if self.link.take_established() {
            self.registry.mark_all_dirty();
            self.registry.queue_all_parameters();
        }

        let mut frame = match compute_frame(&mut self.registry, now) {
            Ok(frame) => frame,
            Err(err) => {
                self.fail(err);
                return;
            }
        };

        let datagrams = self.transmit(&frame);
        self.events.extend(std::mem::take(&mut frame.events));
        self.events.extend(self.link.drain_events());

        let finished = Instant::now();
        if self.clock.complete(started, finished) {
            log::warn!(
                "tick {} took {:?}, period is {:?}",
                self.clock.tick(),
                self.clock.last_duration(),
                self.clock.period()
            );
            self.events.emit(EngineEvent::TickOverrun {
                tick: self.clock.tick(),
                duration: self.clock.last_duration(),
                overruns: self.clock.overruns(),
            });
        }

        if applied > 0 || !frame.positions.is_empty() {
            self.store_positions();
        }
        let snapshot = self.health(frame.positions.len(), datagrams, &frame);
        self.push_health(&snapshot, finished);
        self.store_health(snapshot);
    }

    /// Applies every queued control message. Returns how many were applied.
    fn apply_controls(&mut self, at: Instant, now: f64) -> usize {
        let mut applied = 0;
        while let Ok(control) = self.control.try_recv() {
            applied += 1;
            match control {
                Control::Command(command, reply) => {
                    let name = command.name();
                    let result = self.registry.apply(command, now);
                    if let Err(err) = &result {
                        log::debug!("{name} rejected: {err}");
                    }
                    let _ = reply.send(result);
                }
                Control::Connect(remote, reply) => {
                    let _ = reply.send(self.link.connect(remote, at));
                }
                Control::Disconnect(reply) => {
                    self.link.disconnect();
                    let _ = reply.send(());
                }
            }
        }
        applied
    }

    /// Serializes the frame and hands it to the link. Returns the number of
    /// datagrams produced.
    ///
    /// Parameters stay queued until a session exists; positions produced
    /// while disconnected still reach the link, which counts them as errors.
    fn transmit(&mut self, frame: &Frame) -> usize {
        let parameters = match self.link.state() {
            ConnectionState::Connected | ConnectionState::Recovering => {
                self.registry.take_parameters()
            }
            ConnectionState::Disconnected | ConnectionState::Connecting => Vec::new(),
        };
        if frame.positions.is_empty() && parameters.is_empty() {
            return 0;
        }

        let mut messages = Vec::with_capacity(parameters.len() + frame.positions.len());
        messages.extend(
            parameters
                .iter()
                .map(|(track, parameter)| protocol::parameter_message(*track, parameter)),
        );
        messages.extend(
            frame
                .positions
                .iter()
                .map(|p| protocol::position_message(p.track, &p.position)),
        );

        let timetag = protocol::timetag(SystemTime::now());
        match protocol::pack_bundles(messages, timetag, self.config.max_datagram_size) {
            Ok(batch) => {
                for err in &batch.rejected {
                    log::warn!("skipping message: {err}");
                    self.events.emit(EngineEvent::BatchDropped {
                        reason: DropReason::MessageTooLarge,
                    });
                }
                let count = batch.datagrams.len();
                self.link.send_batch(batch.datagrams);
                count
            }
            Err(err) => {
                log::warn!("dropping batch of {} tracks: {err}", frame.positions.len());
                self.events.emit(EngineEvent::BatchDropped {
                    reason: DropReason::SendFailed,
                });
                0
            }
        }
    }

    fn fail(&mut self, err: EngineError) {
        log::error!("scheduler stopping: {err}");
        self.events.emit(EngineEvent::Fatal {
            message: err.to_string(),
        });
        self.running.store(false, Ordering::SeqCst);
    }

    fn health(&self, batch_size: usize, datagrams: usize, frame: &Frame) -> HealthSnapshot {
        HealthSnapshot {
            link: self.link.health(),
            scheduler: SchedulerHealth {
                tick: self.clock.tick(),
                batch_size,
                datagrams,
                tick_duration: self.clock.last_duration(),
                overruns: self.clock.overruns(),
                degraded_tracks: frame.degraded_tracks.clone(),
                degraded_groups: frame.degraded_groups.clone(),
            },
        }
    }

    fn push_health(&mut self, snapshot: &HealthSnapshot, now: Instant) {
        let Some(interval) = self.config.health_interval else {
            return;
        };
        if self.next_health.is_none_or(|due| now >= due) {
            self.events.emit(EngineEvent::Health(snapshot.clone()));
            self.next_health = Some(now + interval);
        }
    }

    fn store_health(&self, snapshot: HealthSnapshot) {
        *self
            .shared
            .health
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    fn store_positions(&self) {
        let positions = self
            .registry
            .tracks()
            .filter(|t| t.is_active())
            .map(|t| TrackPosition {
                track: t.id,
                position: t.output,
            })
            .collect();
        *self
            .shared
            .positions
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = positions;
    }
}
