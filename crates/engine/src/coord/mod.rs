mod position;

pub use position::{CARTESIAN_LIMIT, MAX_DISTANCE, Polar, Position, wrap_degrees};
