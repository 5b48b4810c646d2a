use std::time::{Duration, Instant};

/// Deadline-driven fixed-rate clock.
///
/// A tick that finishes past its deadline makes the next one due
/// immediately; nothing is skipped or merged, the overrun is only counted.
#[derive(Debug, Clone)]
pub struct TickClock {
    period: Duration,
    start: Instant,
    deadline: Instant,
    tick: u64,
    overruns: u64,
    last_duration: Duration,
}

impl TickClock {
    pub fn new(tick_rate: u32, now: Instant) -> Self {
        Self {
            period: Duration::from_secs_f64(1.0 / tick_rate.max(1) as f64),
            start: now,
            deadline: now,
            tick: 0,
            overruns: 0,
            last_duration: Duration::ZERO,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    pub fn last_duration(&self) -> Duration {
        self.last_duration
    }

    /// Engine clock in seconds; animations measure elapsed time against it.
    pub fn seconds(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.start).as_secs_f64()
    }

    /// How long to sleep before the next tick is due. Never negative.
    pub fn until_next(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// Records a completed tick. Returns `true` when it overran.
    pub fn complete(&mut self, started: Instant, finished: Instant) -> bool {
        self.tick += 1;
        self.last_duration = finished.saturating_duration_since(started);

        let next = self.deadline + self.period;
        if finished > next {
            self.overruns += 1;
            self.deadline = finished;
            true
        } else {
            self.deadline = next;
            false
        }
    }
}
