use std::io;
use std::time::Duration;

use crate::formation::GroupId;
use crate::registry::TrackId;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("parameter `{name}` must be {expected}, got {value}")]
    OutOfRange {
        name: &'static str,
        expected: &'static str,
        value: f64,
    },
    #[error("parameter `{name}` must be finite")]
    NotFinite { name: &'static str },
    #[error("unknown parameter `{0}` for this motion model")]
    UnknownParameter(String),
    #[error("parameter `{name}` expects a {expected} value")]
    WrongType {
        name: String,
        expected: &'static str,
    },
    #[error("invalid choice `{value}` for parameter `{name}`")]
    InvalidChoice { name: String, value: String },
    #[error("custom path needs at least 2 points, got {0}")]
    PathTooShort(usize),
    #[error("track id 0 is reserved")]
    ReservedTrackId,
    #[error("track {0:?} already exists")]
    DuplicateTrack(TrackId),
    #[error("track {0:?} does not exist")]
    UnknownTrack(TrackId),
    #[error("group {0:?} already exists")]
    DuplicateGroup(GroupId),
    #[error("group {0:?} does not exist")]
    UnknownGroup(GroupId),
    #[error("track {track:?} already belongs to group {group:?}")]
    TrackAlreadyGrouped { track: TrackId, group: GroupId },
    #[error("group {child:?} is already nested in group {parent:?}")]
    GroupAlreadyNested { child: GroupId, parent: GroupId },
    #[error("nesting group {child:?} inside {parent:?} would create a cycle")]
    GroupCycle { parent: GroupId, child: GroupId },
    #[error("leader {0:?} is not a member of the group")]
    LeaderNotMember(TrackId),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no handshake reply within {timeout:?} (attempt {attempt})")]
    ConnectionTimeout { attempt: u32, timeout: Duration },
    #[error("handshake rejected by device: {0}")]
    HandshakeRejected(String),
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    #[error("message of {size} bytes exceeds datagram ceiling of {limit} bytes")]
    MessageTooLarge { size: usize, limit: usize },
    #[error("encoding failed: {0}")]
    Encode(String),
    #[error("malformed datagram: {0}")]
    Decode(String),
    #[error("not connected")]
    NotConnected,
}

impl TransportError {
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            Self::ConnectionTimeout { .. } => TransportErrorKind::ConnectionTimeout,
            Self::HandshakeRejected(_) => TransportErrorKind::HandshakeRejected,
            Self::Io(_) | Self::NotConnected => TransportErrorKind::Transport,
            Self::MessageTooLarge { .. } => TransportErrorKind::MessageTooLarge,
            Self::Encode(_) | Self::Decode(_) => TransportErrorKind::Encode,
        }
    }
}

/// Cloneable summary of a [`TransportError`] for the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    ConnectionTimeout,
    HandshakeRejected,
    Transport,
    MessageTooLarge,
    Encode,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("scheduler is not running")]
    SchedulerStopped,
    #[error("failed to allocate batch buffer for {0} tracks")]
    BatchAllocation(usize),
    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(io::Error),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
