use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::error::TransportErrorKind;
use crate::formation::GroupId;
use crate::health::HealthSnapshot;
use crate::net::ConnectionState;
use crate::registry::TrackId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// A recovery queue overflowed; the oldest batch went.
    QueueFull,
    /// The socket would have blocked.
    WouldBlock,
    MessageTooLarge,
    SendFailed,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::QueueFull => "recovery queue full",
            DropReason::WouldBlock => "socket busy",
            DropReason::MessageTooLarge => "message too large",
            DropReason::SendFailed => "send failed",
        }
    }
}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    ConnectionStateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    ConnectionFailed {
        kind: TransportErrorKind,
        message: String,
        retry_in: Duration,
    },
    TickOverrun {
        tick: u64,
        duration: Duration,
        overruns: u64,
    },
    TrackDegraded {
        track: TrackId,
        reason: String,
    },
    GroupDegraded {
        group: GroupId,
    },
    GroupRecovered {
        group: GroupId,
    },
    DeviceStatus {
        error: bool,
        message: String,
    },
    BatchDropped {
        reason: DropReason,
    },
    Health(HealthSnapshot),
    /// Unrecoverable; the scheduler has stopped.
    Fatal {
        message: String,
    },
}

/// Bounded, never-blocking outbound event channel.
#[derive(Debug)]
pub struct EventSink {
    tx: Sender<EngineEvent>,
    dropped: u64,
}

impl EventSink {
    pub fn new(capacity: usize) -> (Self, Receiver<EngineEvent>) {
        let (tx, rx) = bounded(capacity.max(1));
        (Self { tx, dropped: 0 }, rx)
    }

    /// Events that could not be delivered because the host fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn emit(&mut self, event: EngineEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.dropped += 1,
            // The host dropped its receiver; nobody is listening.
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = EngineEvent>) {
        for event in events {
            self.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_channel_never_blocks() {
        let (mut sink, rx) = EventSink::new(2);
        for group in 0..5 {
            sink.emit(EngineEvent::GroupDegraded {
                group: GroupId(group),
            });
        }
        assert_eq!(sink.dropped(), 3);
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn closed_receiver_is_ignored() {
        let (mut sink, rx) = EventSink::new(1);
        drop(rx);
        sink.emit(EngineEvent::GroupRecovered { group: GroupId(1) });
        assert_eq!(sink.dropped(), 0);
    }
}
