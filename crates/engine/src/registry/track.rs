use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::coord::Position;
use crate::error::ValidationError;
use crate::formation::GroupId;
use crate::motion::{Animation, CoordinateMode};

/// Stable track identifier, also used in wire addresses. 0 is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u32);

impl TrackId {
    pub fn new(id: u32) -> Result<Self, ValidationError> {
        if id == 0 {
            return Err(ValidationError::ReservedTrackId);
        }
        Ok(Self(id))
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TrackFlags: u8 {
        const ACTIVE = 1 << 0;
        /// Position changed outside of an animation and must be sent once.
        const DIRTY = 1 << 1;
        /// Last evaluation was rejected; the last good position is held.
        const DEGRADED = 1 << 2;
    }
}

impl Default for TrackFlags {
    fn default() -> Self {
        Self::ACTIVE | Self::DIRTY
    }
}

pub const GAIN_MIN_DB: f64 = -60.0;
pub const GAIN_MAX_DB: f64 = 12.0;

/// Non-positional per-track parameter forwarded to the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TrackParameter {
    Gain(f64),
    Mute(bool),
    /// RGBA, each channel in [0, 1].
    Color([f64; 4]),
}

impl TrackParameter {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match *self {
            Self::Gain(db) => {
                if !db.is_finite() || !(GAIN_MIN_DB..=GAIN_MAX_DB).contains(&db) {
                    return Err(ValidationError::OutOfRange {
                        name: "gain",
                        expected: "within [-60, 12] dB",
                        value: db,
                    });
                }
            }
            Self::Mute(_) => {}
            Self::Color(rgba) => {
                if let Some(&bad) = rgba
                    .iter()
                    .find(|c| !c.is_finite() || !(0.0..=1.0).contains(*c))
                {
                    return Err(ValidationError::OutOfRange {
                        name: "color",
                        expected: "within [0, 1]",
                        value: bad,
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    /// Position set by the host; the natural position when not animated.
    pub position: Position,
    /// Last position emitted in a batch, held when evaluation degrades.
    pub output: Position,
    pub flags: TrackFlags,
    pub gain_db: f64,
    pub mute: bool,
    pub color: [f64; 4],
    pub(crate) animation: Option<Animation>,
    pub(crate) group: Option<GroupId>,
}

impl Track {
    pub fn new(id: TrackId, name: impl Into<String>, position: Position) -> Self {
        Self {
            id,
            name: name.into(),
            position,
            output: position,
            flags: TrackFlags::default(),
            gain_db: 0.0,
            mute: false,
            color: [1.0, 1.0, 1.0, 1.0],
            animation: None,
            group: None,
        }
    }

    pub fn animation(&self) -> Option<&Animation> {
        self.animation.as_ref()
    }

    pub fn group(&self) -> Option<GroupId> {
        self.group
    }

    pub fn is_active(&self) -> bool {
        self.flags.contains(TrackFlags::ACTIVE)
    }

    pub fn is_animated(&self) -> bool {
        self.animation.is_some()
    }

    /// Variant this track is reported in.
    pub fn output_mode(&self, group_mode: Option<CoordinateMode>) -> CoordinateMode {
        match (&self.animation, group_mode) {
            (Some(animation), _) => animation.mode(),
            (None, Some(mode)) => mode,
            (None, None) if self.position.is_polar() => CoordinateMode::Polar,
            (None, None) => CoordinateMode::Cartesian,
        }
    }

    pub(crate) fn apply_parameter(&mut self, parameter: TrackParameter) {
        match parameter {
            TrackParameter::Gain(db) => self.gain_db = db,
            TrackParameter::Mute(mute) => self.mute = mute,
            TrackParameter::Color(rgba) => self.color = rgba,
        }
    }
}
