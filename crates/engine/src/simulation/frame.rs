use std::collections::{HashMap, HashSet};

use glam::DVec3;

use crate::coord::Position;
use crate::error::EngineError;
use crate::event::EngineEvent;
use crate::formation::{self, FormationOutput, GroupId, Member};
use crate::motion::CoordinateMode;
use crate::registry::{Registry, TrackFlags, TrackId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPosition {
    pub track: TrackId,
    pub position: Position,
}

/// Everything one tick produced, ready to be serialized.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Changed tracks in id order.
    pub positions: Vec<TrackPosition>,
    pub events: Vec<EngineEvent>,
    pub degraded_tracks: Vec<TrackId>,
    pub degraded_groups: Vec<GroupId>,
}

/// Evaluates every animation, solves every group and records the resulting
/// output on each track.
///
/// A track is emitted when it is active and either animated, grouped or
/// dirty. Evaluations that are not finite hold the last good output.
pub fn compute_frame(registry: &mut Registry, now: f64) -> Result<Frame, EngineError> {
    let mut frame = Frame::default();
    frame
        .positions
        .try_reserve(registry.track_count())
        .map_err(|_| EngineError::BatchAllocation(registry.track_count()))?;

    let (naturals, failed) = natural_positions(registry, now);
    let targets = solve_groups(registry, &naturals, now, &mut frame);

    let modes: HashMap<GroupId, CoordinateMode> =
        registry.groups().map(|g| (g.id, g.mode)).collect();

    for track in registry.tracks_mut() {
        let natural = naturals.get(&track.id).copied().unwrap_or(track.output);
        let target = match targets.get(&track.id) {
            Some(&target) => Position::Cartesian(target),
            None => natural,
        };

        let degraded = failed.contains(&track.id) || !target.is_finite();
        if degraded && !track.flags.contains(TrackFlags::DEGRADED) {
            let reason = if failed.contains(&track.id) {
                "animation produced a non-finite position"
            } else {
                "group solution produced a non-finite position"
            };
            log::warn!("track {} degraded: {reason}", track.id.0);
            frame.events.push(EngineEvent::TrackDegraded {
                track: track.id,
                reason: reason.to_string(),
            });
        } else if !degraded && track.flags.contains(TrackFlags::DEGRADED) {
            log::info!("track {} recovered", track.id.0);
        }
        track.flags.set(TrackFlags::DEGRADED, degraded);
        if degraded {
            frame.degraded_tracks.push(track.id);
        }

        let grouped = targets.contains_key(&track.id);
        let changed =
            track.is_animated() || grouped || track.flags.contains(TrackFlags::DIRTY);
        if !track.is_active() || !changed {
            continue;
        }

        if !degraded {
            let mode = track.output_mode(track.group().and_then(|g| modes.get(&g).copied()));
            track.output = mode.apply(target).normalize();
        }
        track.flags.remove(TrackFlags::DIRTY);
        frame.positions.push(TrackPosition {
            track: track.id,
            position: track.output,
        });
    }

    Ok(frame)
}

/// Where each track would be on its own this tick. Tracks whose animation
/// fails fall back to their last output and are reported in the second set.
fn natural_positions(
    registry: &Registry,
    now: f64,
) -> (HashMap<TrackId, Position>, HashSet<TrackId>) {
    let mut naturals = HashMap::with_capacity(registry.track_count());
    let mut failed = HashSet::new();

    for track in registry.tracks() {
        let candidate = match track.animation() {
            Some(animation) => animation.evaluate_at(now),
            None => track.position,
        };
        if candidate.is_finite() {
            naturals.insert(track.id, candidate);
        } else {
            failed.insert(track.id);
            naturals.insert(track.id, track.output);
        }
    }

    (naturals, failed)
}

/// Solves groups bottom-up, then places nested groups top-down. Returns the
/// final target of every grouped track.
fn solve_groups(
    registry: &mut Registry,
    naturals: &HashMap<TrackId, Position>,
    now: f64,
    frame: &mut Frame,
) -> HashMap<TrackId, DVec3> {
    let order = registry.solve_order();
    let mut outputs: HashMap<GroupId, FormationOutput> = HashMap::with_capacity(order.len());

    for &id in &order {
        let Some(group) = registry.group(id) else {
            continue;
        };
        let output = formation::solve(
            group,
            |member| match member {
                Member::Track(track) => naturals.get(&track).map(Position::to_vec3),
                Member::Group(child) => outputs.get(&child).map(|o| o.center),
            },
            now,
        );
        let was_degraded = group.is_degraded();

        if output.degraded && !was_degraded {
            log::warn!("group {} lost its leader, holding last reference", id.0);
            frame.events.push(EngineEvent::GroupDegraded { group: id });
        } else if !output.degraded && was_degraded {
            log::info!("group {} recovered", id.0);
            frame.events.push(EngineEvent::GroupRecovered { group: id });
        }
        if output.degraded {
            frame.degraded_groups.push(id);
        }

        if let Some(group) = registry.group_mut(id) {
            group.record_solution(output.center, output.reference, output.degraded);
        }
        outputs.insert(id, output);
    }

    let mut shifts: HashMap<GroupId, DVec3> = HashMap::new();
    let mut targets = HashMap::new();
    for id in order.iter().rev() {
        let Some(output) = outputs.get(id) else {
            continue;
        };
        let shift = shifts.get(id).copied().unwrap_or(DVec3::ZERO);
        for &(member, position) in &output.positions {
            let placed = position + shift;
            match member {
                Member::Track(track) => {
                    targets.insert(track, placed);
                }
                Member::Group(child) => {
                    let center = outputs.get(&child).map_or(placed, |o| o.center);
                    shifts.insert(child, placed - center);
                }
            }
        }
    }

    targets
}
