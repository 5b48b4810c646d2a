mod backoff;
mod link;
pub mod protocol;
mod responder;
mod stats;

pub use backoff::Backoff;
pub use link::{ConnectionState, DeviceLink};
pub use protocol::{ControlMessage, TrackUpdate};
pub use responder::{DeviceEvent, DeviceResponder};
pub use stats::LinkMetrics;
