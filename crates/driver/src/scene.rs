use clap::ValueEnum;
use glam::DVec3;

use holo::error::Result;
use holo::motion::{CircularMotion, Direction, Easing, LinearMotion, Playback, RandomMotion};
use holo::{
    Animation, CoordinateMode, EngineHandle, FormationTemplate, GroupId, Member, MotionModel,
    Position, Relationship, TrackId, TrackParameter,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scene {
    /// Four sources orbiting the listener at different heights.
    Orbit,
    /// A row of sources sweeping back and forth.
    Line,
    /// A ring of followers around a wandering leader, plus a nested pair.
    Formation,
}

impl Scene {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scene::Orbit => "orbit",
            Scene::Line => "line",
            Scene::Formation => "formation",
        }
    }

    pub fn track_count(&self) -> u32 {
        match self {
            Scene::Orbit => 4,
            Scene::Line => 8,
            Scene::Formation => 7,
        }
    }

    pub fn build(&self, engine: &EngineHandle) -> Result<()> {
        match self {
            Scene::Orbit => orbit(engine),
            Scene::Line => line(engine),
            Scene::Formation => formation(engine),
        }
    }
}

fn orbit(engine: &EngineHandle) -> Result<()> {
    for i in 0..4u32 {
        let id = TrackId::new(i + 1)?;
        engine.add_track(id, format!("orbit-{}", i + 1), Position::default())?;

        let mut motion = CircularMotion::new(DVec3::new(0.0, 0.0, i as f64 * 0.5), 3.0, 0.1);
        motion.phase = i as f64 * 90.0;
        motion.tilt = i as f64 * 10.0;
        if i % 2 == 1 {
            motion.direction = Direction::CounterClockwise;
        }
        let animation =
            Animation::new(MotionModel::Circular(motion))?.with_mode(CoordinateMode::Polar);
        engine.attach_animation(id, animation)?;
    }
    Ok(())
}

fn line(engine: &EngineHandle) -> Result<()> {
    for i in 0..8u32 {
        let id = TrackId::new(i + 1)?;
        let y = i as f64 - 3.5;
        engine.add_track(id, format!("line-{}", i + 1), Position::cartesian(-5.0, y, 1.2))?;

        let mut sweep = LinearMotion::new(
            Position::cartesian(-5.0, y, 1.2),
            Position::cartesian(5.0, y, 1.2),
            4.0 + i as f64 * 0.25,
        );
        sweep.playback = Playback::PingPong;
        sweep.easing = Easing::SineInOut;
        engine.attach_animation(id, Animation::new(MotionModel::Linear(sweep))?)?;
        engine.set_track_parameter(id, TrackParameter::Gain(-3.0 * i as f64))?;
    }
    Ok(())
}

fn formation(engine: &EngineHandle) -> Result<()> {
    let leader = TrackId::new(1)?;
    engine.add_track(leader, "leader", Position::default())?;
    let wander = RandomMotion::new(DVec3::new(0.0, 0.0, 1.5), DVec3::new(4.0, 4.0, 0.5), 2.0, 7);
    engine.attach_animation(leader, Animation::new(MotionModel::RandomBounded(wander))?)?;

    let ring = GroupId(1);
    engine.add_group(ring, "ring", Relationship::LeaderFollower { leader })?;
    for i in 2..=5u32 {
        let id = TrackId::new(i)?;
        engine.add_track(id, format!("follower-{i}"), Position::default())?;
        engine.add_group_member(ring, Member::Track(id))?;
        engine.set_track_parameter(id, TrackParameter::Color([0.2, 0.6, 1.0, 1.0]))?;
    }
    engine.set_formation(
        ring,
        Some(FormationTemplate::Ring {
            radius: 1.5,
            rotation: 0.0,
        }),
    )?;

    // A pair kept in a line that rides along with the ring.
    let pair = GroupId(2);
    engine.add_group(pair, "pair", Relationship::Isobarycentric)?;
    for i in 6..=7u32 {
        let id = TrackId::new(i)?;
        engine.add_track(id, format!("pair-{i}"), Position::cartesian(0.0, 3.0, 1.0))?;
        engine.add_group_member(pair, Member::Track(id))?;
    }
    engine.set_formation(
        pair,
        Some(FormationTemplate::Line {
            spacing: 0.8,
            rotation: 90.0,
        }),
    )?;
    engine.add_group_member(ring, Member::Group(pair))?;
    engine.set_group_mode(ring, CoordinateMode::Polar)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use holo::{Engine, EngineConfig};

    #[test]
    fn every_scene_builds() {
        for scene in Scene::value_variants() {
            let engine = Engine::start(EngineConfig::default()).unwrap();
            scene.build(&engine).unwrap();
            let health = engine.health();
            assert!(health.scheduler.degraded_groups.is_empty(), "{}", scene.as_str());
        }
    }
}
