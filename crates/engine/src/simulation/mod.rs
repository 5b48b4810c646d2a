mod frame;
mod scheduler;
mod tick;

pub use frame::{Frame, TrackPosition, compute_frame};
pub use scheduler::{Engine, EngineHandle};
pub use tick::TickClock;
