//! Send/receive timeout contract
//!
//! Negative millisecond values block indefinitely, zero never blocks and
//! positive values block for at most that long.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Block until the operation completes or the thread is interrupted
    Indefinite,
    /// Return immediately, with or without success
    Immediate,
    /// Block for at most the given duration
    After(Duration),
}

impl Timeout {
    pub fn from_millis(millis: i64) -> Self {
        match millis {
            m if m < 0 => Timeout::Indefinite,
            0 => Timeout::Immediate,
            m => Timeout::After(Duration::from_millis(m as u64)),
        }
    }

    /// Point in time when a bounded wait gives up. `None` for the other
    /// variants, and for durations too far out to represent as an `Instant`;
    /// those waits are unbounded.
    pub fn deadline(&self) -> Option<Instant> {
        match self {
            Timeout::After(duration) => Instant::now().checked_add(*duration),
            Timeout::Indefinite | Timeout::Immediate => None,
        }
    }

    pub fn is_blocking(&self) -> bool {
        !matches!(self, Timeout::Immediate)
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Timeout::Indefinite
    }
}

impl From<i64> for Timeout {
    fn from(millis: i64) -> Self {
        Timeout::from_millis(millis)
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        if duration.is_zero() {
            Timeout::Immediate
        } else {
            Timeout::After(duration)
        }
    }
}
