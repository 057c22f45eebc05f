use std::time::Duration;

/// Margin between the last scheduled probe and the deadline.
const FINAL_MARGIN: Duration = Duration::from_millis(1);

/// Inter-poll delay schedule.
///
/// Starts at the minimum interval and grows by a multiplicative factor after
/// every pending observation. Growth is capped at half the time remaining
/// until the deadline. Once the next regular delay would not leave room for
/// another one, the last probe is placed just before the deadline. A delay
/// never shrinks below the previous one.
#[derive(Clone, Debug)]
pub struct Backoff {
    min_interval: Duration,
    factor: f64,
    current: Option<Duration>,
}

impl Backoff {
    pub fn new(min_interval: Duration, factor: f64) -> Self {
        Self {
            min_interval,
            factor,
            current: None,
        }
    }

    /// Delay before the next probe, given the time remaining until the deadline.
    pub fn next(&mut self, remaining: Duration) -> Duration {
        let usable = remaining.saturating_sub(FINAL_MARGIN);
        let next = match self.current {
            None => self.min_interval,
            Some(current) if usable < current.saturating_mul(2) => usable.max(current),
            Some(current) => current.max(self.grow(current).min(usable / 2)),
        };
        let next = next.max(self.min_interval);
        self.current = Some(next);
        next
    }

    fn grow(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.factor).unwrap_or(Duration::MAX)
    }
}
