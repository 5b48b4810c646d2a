use std::f64::consts::TAU;

use glam::{DQuat, DVec3};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::coord::Position;
use crate::error::ValidationError;

use super::easing::Easing;

const WAYPOINT_SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Playback {
    #[default]
    Once,
    Loop,
    PingPong,
}

impl Playback {
    /// Fraction of the cycle reached after `elapsed` seconds, in [0, 1].
    pub fn progress(self, elapsed: f64, duration: f64) -> f64 {
        let cycles = elapsed.max(0.0) / duration;
        match self {
            Self::Once => cycles.clamp(0.0, 1.0),
            Self::Loop => cycles.rem_euclid(1.0),
            Self::PingPong => {
                let phase = cycles.rem_euclid(2.0);
                if phase <= 1.0 { phase } else { 2.0 - phase }
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Once => "once",
            Self::Loop => "loop",
            Self::PingPong => "ping_pong",
        }
    }

    pub fn parse(name: &str, value: &str) -> Result<Self, ValidationError> {
        match value {
            "once" => Ok(Self::Once),
            "loop" => Ok(Self::Loop),
            "ping_pong" => Ok(Self::PingPong),
            _ => Err(ValidationError::InvalidChoice {
                name: name.to_string(),
                value: value.to_string(),
            }),
        }
    }
}

/// Rotation sense of orbital models, viewed from the listener's frame.
///
/// `Clockwise` advances from +X towards +Y.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Clockwise,
    CounterClockwise,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Self::Clockwise => 1.0,
            Self::CounterClockwise => -1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clockwise => "clockwise",
            Self::CounterClockwise => "counter_clockwise",
        }
    }

    pub fn parse(name: &str, value: &str) -> Result<Self, ValidationError> {
        match value {
            "clockwise" | "cw" => Ok(Self::Clockwise),
            "counter_clockwise" | "ccw" => Ok(Self::CounterClockwise),
            _ => Err(ValidationError::InvalidChoice {
                name: name.to_string(),
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearMotion {
    pub start: Position,
    pub end: Position,
    /// Seconds.
    pub duration: f64,
    pub playback: Playback,
    pub easing: Easing,
}

impl LinearMotion {
    pub fn new(start: Position, end: Position, duration: f64) -> Self {
        Self {
            start,
            end,
            duration,
            playback: Playback::Once,
            easing: Easing::Linear,
        }
    }

    fn evaluate(&self, elapsed: f64) -> Position {
        let progress = self
            .easing
            .apply(self.playback.progress(elapsed, self.duration));
        self.start.interpolate(&self.end, progress)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        finite_position("start", &self.start)?;
        finite_position("end", &self.end)?;
        positive("duration", self.duration)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircularMotion {
    pub center: DVec3,
    pub radius: f64,
    /// Revolutions per second.
    pub speed: f64,
    /// Inclination of the orbital plane, in degrees.
    pub tilt: f64,
    pub direction: Direction,
    /// Revolutions per second of the tilt axis around the vertical.
    pub precession: f64,
    /// Start angle in degrees.
    pub phase: f64,
}

impl CircularMotion {
    pub fn new(center: DVec3, radius: f64, speed: f64) -> Self {
        Self {
            center,
            radius,
            speed,
            tilt: 0.0,
            direction: Direction::Clockwise,
            precession: 0.0,
            phase: 0.0,
        }
    }

    fn evaluate(&self, elapsed: f64) -> Position {
        let angle =
            turns_to_radians(self.direction.sign() * self.speed * elapsed + self.phase / 360.0);
        let (sin, cos) = angle.sin_cos();
        let local = DVec3::new(self.radius * cos, self.radius * sin, 0.0);

        let node = turns_to_radians(self.precession * elapsed);
        let (node_sin, node_cos) = node.sin_cos();
        let tilt_axis = DVec3::new(node_cos, node_sin, 0.0);
        let orientation = DQuat::from_axis_angle(tilt_axis, self.tilt.to_radians());

        Position::Cartesian(self.center + orientation * local)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        finite_vec("center", self.center)?;
        non_negative("radius", self.radius)?;
        non_negative("speed", self.speed)?;
        finite("tilt", self.tilt)?;
        finite("precession", self.precession)?;
        finite("phase", self.phase)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EllipticalMotion {
    pub center: DVec3,
    pub semi_major: f64,
    pub semi_minor: f64,
    /// Revolutions per second.
    pub speed: f64,
    /// In-plane rotation of the major axis, in degrees.
    pub rotation: f64,
    /// Inclination of the orbital plane around X, in degrees.
    pub tilt: f64,
    pub direction: Direction,
    /// Start angle in degrees.
    pub phase: f64,
}

impl EllipticalMotion {
    pub fn new(center: DVec3, semi_major: f64, semi_minor: f64, speed: f64) -> Self {
        Self {
            center,
            semi_major,
            semi_minor,
            speed,
            rotation: 0.0,
            tilt: 0.0,
            direction: Direction::Clockwise,
            phase: 0.0,
        }
    }

    fn evaluate(&self, elapsed: f64) -> Position {
        let angle =
            turns_to_radians(self.direction.sign() * self.speed * elapsed + self.phase / 360.0);
        let (sin, cos) = angle.sin_cos();
        let local = DVec3::new(self.semi_major * cos, self.semi_minor * sin, 0.0);

        let orientation = DQuat::from_rotation_x(self.tilt.to_radians())
            * DQuat::from_rotation_z(self.rotation.to_radians());

        Position::Cartesian(self.center + orientation * local)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        finite_vec("center", self.center)?;
        non_negative("semi_major", self.semi_major)?;
        non_negative("semi_minor", self.semi_minor)?;
        non_negative("speed", self.speed)?;
        finite("rotation", self.rotation)?;
        finite("tilt", self.tilt)?;
        finite("phase", self.phase)
    }
}

/// Wanders between seeded waypoints inside `center +/- extent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomMotion {
    pub center: DVec3,
    pub extent: DVec3,
    /// Seconds spent travelling between consecutive waypoints.
    pub interval: f64,
    pub seed: u64,
}

impl RandomMotion {
    pub fn new(center: DVec3, extent: DVec3, interval: f64, seed: u64) -> Self {
        Self {
            center,
            extent,
            interval,
            seed,
        }
    }

    pub fn waypoint(&self, index: u64) -> DVec3 {
        let mut rng = Pcg32::seed_from_u64(self.seed ^ index.wrapping_mul(WAYPOINT_SEED_STRIDE));
        let unit = DVec3::new(
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        );
        self.center + unit * self.extent
    }

    fn evaluate(&self, elapsed: f64) -> Position {
        let scaled = elapsed.max(0.0) / self.interval;
        let index = scaled.floor();
        let t = scaled - index;
        let blend = t * t * (3.0 - 2.0 * t);

        let index = index as u64;
        let from = self.waypoint(index);
        let to = self.waypoint(index.wrapping_add(1));
        Position::Cartesian(from.lerp(to, blend))
    }

    fn validate(&self) -> Result<(), ValidationError> {
        finite_vec("center", self.center)?;
        non_negative("extent.x", self.extent.x)?;
        non_negative("extent.y", self.extent.y)?;
        non_negative("extent.z", self.extent.z)?;
        positive("interval", self.interval)
    }
}

/// Piecewise-linear path with equal time per segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathMotion {
    pub points: Vec<Position>,
    pub duration: f64,
    pub playback: Playback,
    pub easing: Easing,
}

impl PathMotion {
    pub fn new(points: Vec<Position>, duration: f64) -> Self {
        Self {
            points,
            duration,
            playback: Playback::Once,
            easing: Easing::Linear,
        }
    }

    fn evaluate(&self, elapsed: f64) -> Position {
        let segments = self.points.len().saturating_sub(1);
        if segments == 0 {
            return self.points.first().copied().unwrap_or_default();
        }

        let progress = self
            .easing
            .apply(self.playback.progress(elapsed, self.duration));
        let scaled = progress * segments as f64;
        let index = (scaled.floor() as usize).min(segments - 1);
        let local = scaled - index as f64;

        self.points[index].interpolate(&self.points[index + 1], local)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.points.len() < 2 {
            return Err(ValidationError::PathTooShort(self.points.len()));
        }
        for point in &self.points {
            finite_position("points", point)?;
        }
        positive("duration", self.duration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MotionKind {
    Linear,
    Circular,
    Elliptical,
    RandomBounded,
    CustomPath,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MotionModel {
    Linear(LinearMotion),
    Circular(CircularMotion),
    Elliptical(EllipticalMotion),
    RandomBounded(RandomMotion),
    CustomPath(PathMotion),
}

impl MotionModel {
    /// A valid model of `kind` with neutral parameters.
    pub fn with_defaults(kind: MotionKind) -> Self {
        match kind {
            MotionKind::Linear => Self::Linear(LinearMotion::new(
                Position::default(),
                Position::default(),
                1.0,
            )),
            MotionKind::Circular => Self::Circular(CircularMotion::new(DVec3::ZERO, 1.0, 0.1)),
            MotionKind::Elliptical => {
                Self::Elliptical(EllipticalMotion::new(DVec3::ZERO, 2.0, 1.0, 0.1))
            }
            MotionKind::RandomBounded => {
                Self::RandomBounded(RandomMotion::new(DVec3::ZERO, DVec3::ONE, 1.0, 0))
            }
            MotionKind::CustomPath => Self::CustomPath(PathMotion::new(
                vec![Position::default(), Position::default()],
                1.0,
            )),
        }
    }

    pub fn kind(&self) -> MotionKind {
        match self {
            Self::Linear(_) => MotionKind::Linear,
            Self::Circular(_) => MotionKind::Circular,
            Self::Elliptical(_) => MotionKind::Elliptical,
            Self::RandomBounded(_) => MotionKind::RandomBounded,
            Self::CustomPath(_) => MotionKind::CustomPath,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Linear(m) => m.validate(),
            Self::Circular(m) => m.validate(),
            Self::Elliptical(m) => m.validate(),
            Self::RandomBounded(m) => m.validate(),
            Self::CustomPath(m) => m.validate(),
        }
    }

    /// Position after `elapsed` seconds. Constant time, no hidden state.
    pub fn evaluate(&self, elapsed: f64) -> Position {
        let elapsed = if elapsed.is_finite() { elapsed.max(0.0) } else { 0.0 };
        match self {
            Self::Linear(m) => m.evaluate(elapsed),
            Self::Circular(m) => m.evaluate(elapsed),
            Self::Elliptical(m) => m.evaluate(elapsed),
            Self::RandomBounded(m) => m.evaluate(elapsed),
            Self::CustomPath(m) => m.evaluate(elapsed),
        }
    }

    /// Seconds after which the motion repeats, if it does.
    pub fn period(&self) -> Option<f64> {
        match self {
            Self::Circular(CircularMotion { speed, .. })
            | Self::Elliptical(EllipticalMotion { speed, .. }) => {
                (*speed > 0.0).then(|| 1.0 / speed)
            }
            Self::Linear(LinearMotion {
                duration, playback, ..
            })
            | Self::CustomPath(PathMotion {
                duration, playback, ..
            }) => match playback {
                Playback::Once => None,
                Playback::Loop => Some(*duration),
                Playback::PingPong => Some(2.0 * duration),
            },
            Self::RandomBounded(_) => None,
        }
    }
}

fn turns_to_radians(turns: f64) -> f64 {
    turns.rem_euclid(1.0) * TAU
}

pub(crate) fn finite(name: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::NotFinite { name })
    }
}

pub(crate) fn non_negative(name: &'static str, value: f64) -> Result<(), ValidationError> {
    finite(name, value)?;
    if value < 0.0 {
        return Err(ValidationError::OutOfRange {
            name,
            expected: ">= 0",
            value,
        });
    }
    Ok(())
}

pub(crate) fn positive(name: &'static str, value: f64) -> Result<(), ValidationError> {
    finite(name, value)?;
    if value <= 0.0 {
        return Err(ValidationError::OutOfRange {
            name,
            expected: "> 0",
            value,
        });
    }
    Ok(())
}

pub(crate) fn finite_vec(name: &'static str, value: DVec3) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::NotFinite { name })
    }
}

pub(crate) fn finite_position(name: &'static str, value: &Position) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::NotFinite { name })
    }
}
