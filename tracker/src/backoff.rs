//! Exponential poll backoff with a hard cap.

use std::time::Duration;

/// Produces successive poll delays: `initial`, `initial * m`, `initial * m²`, ...
/// clamped to `max` on every step.
#[derive(Clone, Debug)]
pub struct Backoff {
    current: Duration,
    multiplier: f64,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            current: initial.min(max),
            multiplier,
            max,
        }
    }

    /// The delay the next call to [`next_delay`](Self::next_delay) will return.
    pub fn peek(&self) -> Duration {
        self.current
    }

    /// Return the current delay and grow the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let grown = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max);
        self.current = grown.min(self.max);
        delay
    }
}
