use serde::{Deserialize, Serialize};

use crate::coord::Position;
use crate::error::ValidationError;

use super::model::MotionModel;
use super::params::ParamValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoordinateMode {
    #[default]
    Cartesian,
    Polar,
}

impl CoordinateMode {
    pub fn apply(self, position: Position) -> Position {
        match self {
            Self::Cartesian => position.to_cartesian(),
            Self::Polar => position.to_polar(),
        }
    }
}

/// Where elapsed time is measured from, on the engine clock.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum TimeOrigin {
    /// Resolved to the tick at which the animation is attached.
    #[default]
    Now,
    /// Engine-clock seconds.
    At(f64),
}

/// A validated motion model bound to a start time and an output
/// coordinate system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Animation {
    model: MotionModel,
    origin: TimeOrigin,
    mode: CoordinateMode,
}

impl Animation {
    pub fn new(model: MotionModel) -> Result<Self, ValidationError> {
        model.validate()?;
        Ok(Self {
            model,
            origin: TimeOrigin::Now,
            mode: CoordinateMode::Cartesian,
        })
    }

    pub fn with_mode(mut self, mode: CoordinateMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_origin(mut self, origin: TimeOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn model(&self) -> &MotionModel {
        &self.model
    }

    pub fn mode(&self) -> CoordinateMode {
        self.mode
    }

    pub fn origin(&self) -> TimeOrigin {
        self.origin
    }

    /// Validates and applies a named parameter. A rejected value leaves the
    /// animation untouched.
    pub fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<(), ValidationError> {
        if name == "mode" {
            self.mode = match value.as_choice(name)? {
                "cartesian" => CoordinateMode::Cartesian,
                "polar" => CoordinateMode::Polar,
                other => {
                    return Err(ValidationError::InvalidChoice {
                        name: name.to_string(),
                        value: other.to_string(),
                    });
                }
            };
            return Ok(());
        }

        let mut model = self.model.clone();
        model.set_parameter(name, value)?;
        model.validate()?;
        self.model = model;
        Ok(())
    }

    pub(crate) fn resolve_origin(&mut self, now: f64) {
        if self.origin == TimeOrigin::Now {
            self.origin = TimeOrigin::At(now);
        }
    }

    pub fn elapsed_at(&self, now: f64) -> f64 {
        match self.origin {
            TimeOrigin::Now => 0.0,
            TimeOrigin::At(start) => (now - start).max(0.0),
        }
    }

    /// Position after `elapsed` seconds in the output mode. A non-finite
    /// result is returned unconverted so the caller can reject it.
    pub fn evaluate(&self, elapsed: f64) -> Position {
        let position = self.model.evaluate(elapsed);
        if position.is_finite() {
            self.mode.apply(position)
        } else {
            position
        }
    }

    pub fn evaluate_at(&self, now: f64) -> Position {
        self.evaluate(self.elapsed_at(now))
    }
}
