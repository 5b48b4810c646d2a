mod animation;
mod easing;
mod model;
mod params;

pub use animation::{Animation, CoordinateMode, TimeOrigin};
pub use easing::Easing;
pub use model::{
    CircularMotion, Direction, EllipticalMotion, LinearMotion, MotionKind, MotionModel,
    PathMotion, Playback, RandomMotion,
};
pub use params::ParamValue;

pub(crate) use model::{finite, finite_position, finite_vec, non_negative};
