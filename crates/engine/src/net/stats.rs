use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Running link metrics: smoothed round trip, windowed error rate and
/// traffic counters.
#[derive(Debug, Clone)]
pub struct LinkMetrics {
    srtt_ms: Option<f64>,
    rtt_var_ms: f64,
    outcomes: VecDeque<bool>,
    window: usize,
    pub error_count: u64,
    pub messages_sent: u64,
    pub bytes_sent: u64,
    pub messages_received: u64,
    pub bytes_received: u64,
    pub dropped_batches: u64,
    pub last_exchange: Option<Instant>,
}

impl LinkMetrics {
    const ALPHA: f64 = 0.125;
    const BETA: f64 = 0.25;

    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            srtt_ms: None,
            rtt_var_ms: 0.0,
            outcomes: VecDeque::with_capacity(window),
            window,
            error_count: 0,
            messages_sent: 0,
            bytes_sent: 0,
            messages_received: 0,
            bytes_received: 0,
            dropped_batches: 0,
            last_exchange: None,
        }
    }

    pub fn record_rtt(&mut self, rtt: Duration) {
        let sample = rtt.as_secs_f64() * 1000.0;
        match self.srtt_ms {
            None => {
                self.srtt_ms = Some(sample);
                self.rtt_var_ms = sample / 2.0;
            }
            Some(srtt) => {
                let diff = (sample - srtt).abs();
                self.rtt_var_ms = (1.0 - Self::BETA) * self.rtt_var_ms + Self::BETA * diff;
                self.srtt_ms = Some((1.0 - Self::ALPHA) * srtt + Self::ALPHA * sample);
            }
        }
    }

    pub fn record_sent(&mut self, bytes: usize) {
        self.messages_sent += 1;
        self.bytes_sent += bytes as u64;
        self.push_outcome(false);
    }

    pub fn record_error(&mut self) {
        self.error_count += 1;
        self.push_outcome(true);
    }

    pub fn record_received(&mut self, bytes: usize, at: Instant) {
        self.messages_received += 1;
        self.bytes_received += bytes as u64;
        self.last_exchange = Some(at);
    }

    pub fn record_dropped_batch(&mut self) {
        self.dropped_batches += 1;
    }

    pub fn latency(&self) -> Option<Duration> {
        self.srtt_ms.map(|ms| Duration::from_secs_f64(ms / 1000.0))
    }

    pub fn latency_variance(&self) -> Option<Duration> {
        self.srtt_ms
            .map(|_| Duration::from_secs_f64(self.rtt_var_ms / 1000.0))
    }

    /// Errors per attempt over the last `window` send attempts.
    pub fn error_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let errors = self.outcomes.iter().filter(|&&failed| failed).count();
        errors as f64 / self.outcomes.len() as f64
    }

    fn push_outcome(&mut self, failed: bool) {
        if self.outcomes.len() >= self.window {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn first_sample_seeds_the_average() {
        let mut metrics = LinkMetrics::new(10);
        assert_eq!(metrics.latency(), None);

        metrics.record_rtt(Duration::from_millis(20));
        let srtt = metrics.latency().unwrap().as_secs_f64() * 1000.0;
        assert_relative_eq!(srtt, 20.0, epsilon = 1e-6);

        metrics.record_rtt(Duration::from_millis(36));
        let srtt = metrics.latency().unwrap().as_secs_f64() * 1000.0;
        assert_relative_eq!(srtt, 22.0, epsilon = 1e-6);
        let var = metrics.latency_variance().unwrap().as_secs_f64() * 1000.0;
        assert_relative_eq!(var, 0.75 * 10.0 + 0.25 * 16.0, epsilon = 1e-6);
    }

    #[test]
    fn error_rate_is_windowed() {
        let mut metrics = LinkMetrics::new(4);
        metrics.record_error();
        metrics.record_error();
        metrics.record_sent(10);
        metrics.record_sent(10);
        assert_relative_eq!(metrics.error_rate(), 0.5);

        metrics.record_sent(10);
        metrics.record_sent(10);
        assert_relative_eq!(metrics.error_rate(), 0.0);
        assert_eq!(metrics.error_count, 2);
        assert_eq!(metrics.bytes_sent, 40);
    }
}
