pub mod config;
pub mod coord;
pub mod error;
pub mod event;
pub mod formation;
pub mod health;
pub mod motion;
pub mod net;
pub mod registry;
pub mod simulation;

pub use config::EngineConfig;
pub use coord::{Polar, Position};
pub use error::{EngineError, TransportError, ValidationError};
pub use event::{DropReason, EngineEvent};
pub use formation::{FormationTemplate, GroupId, Member, MemberOffset, Relationship};
pub use health::HealthSnapshot;
pub use motion::{Animation, CoordinateMode, MotionModel, ParamValue, TimeOrigin};
pub use net::{ConnectionState, DeviceResponder};
pub use registry::{Command, TrackId, TrackParameter};
pub use simulation::{Engine, EngineHandle, TrackPosition};
