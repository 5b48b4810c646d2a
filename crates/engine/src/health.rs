use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::formation::GroupId;
use crate::net::ConnectionState;
use crate::registry::TrackId;

/// Transport side of a [`HealthSnapshot`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinkHealth {
    pub state: ConnectionState,
    pub remote: Option<SocketAddr>,
    pub local_port: Option<u16>,
    /// Smoothed heartbeat round trip.
    pub latency: Option<Duration>,
    pub latency_variance: Option<Duration>,
    pub error_rate: f64,
    pub error_count: u64,
    pub last_exchange: Option<Instant>,
    pub retry_count: u32,
    pub messages_sent: u64,
    pub bytes_sent: u64,
    pub queued_batches: usize,
    pub dropped_batches: u64,
}

/// Scheduler side of a [`HealthSnapshot`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchedulerHealth {
    pub tick: u64,
    pub batch_size: usize,
    pub datagrams: usize,
    pub tick_duration: Duration,
    pub overruns: u64,
    pub degraded_tracks: Vec<TrackId>,
    pub degraded_groups: Vec<GroupId>,
}

/// Read-only point-in-time copy of engine health.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HealthSnapshot {
    pub link: LinkHealth,
    pub scheduler: SchedulerHealth,
}

impl HealthSnapshot {
    pub fn is_connected(&self) -> bool {
        self.link.state == ConnectionState::Connected
    }

    pub fn is_degraded(&self) -> bool {
        !self.scheduler.degraded_tracks.is_empty() || !self.scheduler.degraded_groups.is_empty()
    }

    pub fn since_last_exchange(&self) -> Option<Duration> {
        self.link.last_exchange.map(|at| at.elapsed())
    }
}
