use std::time::Duration;

/// Largest UDP payload over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub tick_rate: u32,
    pub heartbeat_interval: Duration,
    pub subscription_interval: Duration,
    /// Consecutive unanswered heartbeats before the link is considered lost.
    pub missed_heartbeats: u32,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub handshake_timeout: Duration,
    /// Batches kept while recovering; the oldest is dropped first.
    pub recovery_queue_depth: usize,
    pub max_datagram_size: usize,
    /// Number of recent send attempts the error rate is computed over.
    pub error_window: usize,
    pub event_capacity: usize,
    /// Push a health snapshot on the event stream at this interval.
    pub health_interval: Option<Duration>,
    /// 0 binds an ephemeral port.
    pub local_port: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            heartbeat_interval: Duration::from_secs(1),
            subscription_interval: Duration::from_secs(30),
            missed_heartbeats: 3,
            backoff_initial: Duration::from_millis(100),
            backoff_max: Duration::from_secs(5),
            handshake_timeout: Duration::from_millis(500),
            recovery_queue_depth: 8,
            max_datagram_size: MAX_DATAGRAM_SIZE,
            error_window: 100,
            event_capacity: 1024,
            health_interval: None,
            local_port: 0,
        }
    }
}

impl EngineConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_period_is_sixty_hertz() {
        let config = EngineConfig::default();
        let period = config.tick_period().as_secs_f64();
        assert!((period - 1.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn zero_tick_rate_does_not_divide_by_zero() {
        let config = EngineConfig {
            tick_rate: 0,
            ..Default::default()
        };
        assert_eq!(config.tick_period(), Duration::from_secs(1));
    }
}
