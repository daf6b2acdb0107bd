//! Monotonic clock used to timestamp frame completion

use std::time::Duration;

use rustix::time::{clock_gettime, ClockId};

/// A point on the monotonic clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time(Duration);

impl Time {
    /// Milliseconds, truncated to the 32 bits wayland timestamps carry
    pub fn as_millis(&self) -> u32 {
        self.0.as_millis() as u32
    }
}

impl From<Duration> for Time {
    fn from(duration: Duration) -> Self {
        Time(duration)
    }
}

/// Reads `CLOCK_MONOTONIC`
#[derive(Debug, Default, Clone, Copy)]
pub struct Clock;

impl Clock {
    pub fn new() -> Self {
        Clock
    }

    /// Returns the current time
    pub fn now(&self) -> Time {
        let ts = clock_gettime(ClockId::Monotonic);
        Time(Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_is_monotonic() {
        let clock = Clock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
