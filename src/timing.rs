use std::time::{Duration, Instant};

/// after falling this many periods behind, stop trying to catch up
const MAX_BACKLOG_PERIODS: u32 = 8;

/// fixed-period ticker working off absolute deadlines, so a slow tick is
/// made up by the following ones instead of drifting
pub struct Ticker {
    period: Duration,
    next: Instant,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        Ticker {
            period,
            next: Instant::now() + period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// block until the next deadline
    pub fn wait(&mut self) {
        let now = Instant::now();
        if self.next > now {
            spin_sleep::sleep(self.next - now);
            self.next += self.period;
        } else if now - self.next > self.period * MAX_BACKLOG_PERIODS {
            self.next = now + self.period;
        } else {
            self.next += self.period;
        }
    }

    /// forget any backlog; the next deadline is one period from now
    pub fn reset(&mut self) {
        self.next = Instant::now() + self.period;
    }
}
