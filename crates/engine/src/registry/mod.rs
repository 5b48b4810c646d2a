mod command;
mod store;
mod track;

pub use command::Command;
pub use store::Registry;
pub use track::{GAIN_MAX_DB, GAIN_MIN_DB, Track, TrackFlags, TrackId, TrackParameter};
