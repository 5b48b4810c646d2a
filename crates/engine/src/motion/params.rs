use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::coord::Position;
use crate::error::ValidationError;

use super::easing::Easing;
use super::model::{Direction, MotionModel, Playback, finite_position};

/// Value of a named motion parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Number(f64),
    Choice(String),
    Point(Position),
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Choice(value.to_string())
    }
}

impl From<Position> for ParamValue {
    fn from(value: Position) -> Self {
        Self::Point(value)
    }
}

impl From<DVec3> for ParamValue {
    fn from(value: DVec3) -> Self {
        Self::Point(Position::Cartesian(value))
    }
}

impl ParamValue {
    pub fn as_number(&self, name: &str) -> Result<f64, ValidationError> {
        match self {
            Self::Number(n) => Ok(*n),
            _ => Err(wrong_type(name, "numeric")),
        }
    }

    pub fn as_choice(&self, name: &str) -> Result<&str, ValidationError> {
        match self {
            Self::Choice(s) => Ok(s),
            _ => Err(wrong_type(name, "choice")),
        }
    }

    pub fn as_point(&self, name: &str) -> Result<Position, ValidationError> {
        match self {
            Self::Point(p) => Ok(*p),
            _ => Err(wrong_type(name, "point")),
        }
    }

    fn as_vec3(&self, name: &'static str) -> Result<DVec3, ValidationError> {
        let point = self.as_point(name)?;
        finite_position(name, &point)?;
        Ok(point.to_vec3())
    }
}

fn wrong_type(name: &str, expected: &'static str) -> ValidationError {
    ValidationError::WrongType {
        name: name.to_string(),
        expected,
    }
}

fn unknown(name: &str) -> ValidationError {
    ValidationError::UnknownParameter(name.to_string())
}

impl MotionModel {
    /// Writes a single named parameter without validating the whole model.
    /// Callers go through [`super::Animation::set_parameter`], which
    /// validates before committing.
    pub(crate) fn set_parameter(
        &mut self,
        name: &str,
        value: ParamValue,
    ) -> Result<(), ValidationError> {
        match self {
            Self::Linear(m) => match name {
                "start" => m.start = value.as_point(name)?,
                "end" => m.end = value.as_point(name)?,
                "duration" => m.duration = value.as_number(name)?,
                "playback" => m.playback = Playback::parse(name, value.as_choice(name)?)?,
                "easing" => m.easing = Easing::parse(name, value.as_choice(name)?)?,
                _ => return Err(unknown(name)),
            },
            Self::Circular(m) => match name {
                "center" => m.center = value.as_vec3("center")?,
                "radius" => m.radius = value.as_number(name)?,
                "speed" => m.speed = value.as_number(name)?,
                "tilt" => m.tilt = value.as_number(name)?,
                "direction" => m.direction = Direction::parse(name, value.as_choice(name)?)?,
                "precession" => m.precession = value.as_number(name)?,
                "phase" => m.phase = value.as_number(name)?,
                _ => return Err(unknown(name)),
            },
            Self::Elliptical(m) => match name {
                "center" => m.center = value.as_vec3("center")?,
                "semi_major" => m.semi_major = value.as_number(name)?,
                "semi_minor" => m.semi_minor = value.as_number(name)?,
                "speed" => m.speed = value.as_number(name)?,
                "rotation" => m.rotation = value.as_number(name)?,
                "tilt" => m.tilt = value.as_number(name)?,
                "direction" => m.direction = Direction::parse(name, value.as_choice(name)?)?,
                "phase" => m.phase = value.as_number(name)?,
                _ => return Err(unknown(name)),
            },
            Self::RandomBounded(m) => match name {
                "center" => m.center = value.as_vec3("center")?,
                "extent" => m.extent = value.as_vec3("extent")?,
                "interval" => m.interval = value.as_number(name)?,
                "seed" => m.seed = parse_seed("seed", value.as_number(name)?)?,
                _ => return Err(unknown(name)),
            },
            Self::CustomPath(m) => match name {
                "duration" => m.duration = value.as_number(name)?,
                "playback" => m.playback = Playback::parse(name, value.as_choice(name)?)?,
                "easing" => m.easing = Easing::parse(name, value.as_choice(name)?)?,
                _ => return Err(unknown(name)),
            },
        }
        Ok(())
    }

    pub fn parameter(&self, name: &str) -> Option<ParamValue> {
        let value = match self {
            Self::Linear(m) => match name {
                "start" => m.start.into(),
                "end" => m.end.into(),
                "duration" => m.duration.into(),
                "playback" => m.playback.as_str().into(),
                "easing" => m.easing.as_str().into(),
                _ => return None,
            },
            Self::Circular(m) => match name {
                "center" => m.center.into(),
                "radius" => m.radius.into(),
                "speed" => m.speed.into(),
                "tilt" => m.tilt.into(),
                "direction" => m.direction.as_str().into(),
                "precession" => m.precession.into(),
                "phase" => m.phase.into(),
                _ => return None,
            },
            Self::Elliptical(m) => match name {
                "center" => m.center.into(),
                "semi_major" => m.semi_major.into(),
                "semi_minor" => m.semi_minor.into(),
                "speed" => m.speed.into(),
                "rotation" => m.rotation.into(),
                "tilt" => m.tilt.into(),
                "direction" => m.direction.as_str().into(),
                "phase" => m.phase.into(),
                _ => return None,
            },
            Self::RandomBounded(m) => match name {
                "center" => m.center.into(),
                "extent" => m.extent.into(),
                "interval" => m.interval.into(),
                "seed" => (m.seed as f64).into(),
                _ => return None,
            },
            Self::CustomPath(m) => match name {
                "duration" => m.duration.into(),
                "playback" => m.playback.as_str().into(),
                "easing" => m.easing.as_str().into(),
                _ => return None,
            },
        };
        Some(value)
    }
}

fn parse_seed(name: &'static str, value: f64) -> Result<u64, ValidationError> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
        return Err(ValidationError::OutOfRange {
            name,
            expected: "a non-negative integer below 2^32",
            value,
        });
    }
    Ok(value as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::{MotionKind, RandomMotion};

    #[test]
    fn set_and_read_back() {
        let mut model = MotionModel::with_defaults(MotionKind::Circular);

        model.set_parameter("radius", 5.0.into()).unwrap();
        model.set_parameter("direction", "ccw".into()).unwrap();
        model
            .set_parameter("center", DVec3::new(1.0, 2.0, 3.0).into())
            .unwrap();

        assert_eq!(model.parameter("radius"), Some(ParamValue::Number(5.0)));
        assert_eq!(
            model.parameter("direction"),
            Some(ParamValue::Choice("counter_clockwise".to_string()))
        );
        assert_eq!(
            model.parameter("center"),
            Some(ParamValue::Point(Position::cartesian(1.0, 2.0, 3.0)))
        );
        assert_eq!(model.parameter("duration"), None);
    }

    #[test]
    fn wrong_type_and_unknown_names() {
        let mut model = MotionModel::with_defaults(MotionKind::Linear);

        assert!(matches!(
            model.set_parameter("duration", "fast".into()),
            Err(ValidationError::WrongType { .. })
        ));
        assert!(matches!(
            model.set_parameter("radius", 1.0.into()),
            Err(ValidationError::UnknownParameter(_))
        ));
        assert!(matches!(
            model.set_parameter("playback", "bounce".into()),
            Err(ValidationError::InvalidChoice { .. })
        ));
    }

    #[test]
    fn seed_must_be_integral() {
        let mut model = MotionModel::RandomBounded(RandomMotion::new(
            DVec3::ZERO,
            DVec3::ONE,
            1.0,
            0,
        ));

        assert!(model.set_parameter("seed", 1.5.into()).is_err());
        assert!(model.set_parameter("seed", (-1.0).into()).is_err());
        model.set_parameter("seed", 99.0.into()).unwrap();
        assert_eq!(model.parameter("seed"), Some(ParamValue::Number(99.0)));
    }

    #[test]
    fn non_finite_center_is_rejected() {
        let mut model = MotionModel::with_defaults(MotionKind::Circular);
        model
            .set_parameter("center", DVec3::new(1.0, 2.0, 3.0).into())
            .unwrap();

        let err = model
            .set_parameter("center", Position::cartesian(f64::NAN, 0.0, 0.0).into())
            .unwrap_err();
        assert_eq!(err, ValidationError::NotFinite { name: "center" });
        assert_eq!(
            model.parameter("center"),
            Some(ParamValue::Point(Position::cartesian(1.0, 2.0, 3.0)))
        );

        let mut random = MotionModel::with_defaults(MotionKind::RandomBounded);
        assert!(matches!(
            random.set_parameter("extent", Position::cartesian(1.0, f64::INFINITY, 1.0).into()),
            Err(ValidationError::NotFinite { name: "extent" })
        ));
    }
}
