//! Time sources for the rate limiter.
//!
//! Windows are measured on a monotonic clock so wall clock steps cannot
//! move stored timestamps into the future. The wall clock is only read to
//! report reset times.

use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

/// A source of the current time.
pub trait Clock: Send + Sync {
    /// The current monotonic instant.
    fn instant(&self) -> Instant;

    /// The current wall-clock time.
    fn wall(&self) -> DateTime<Utc>;
}

/// The system clocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn instant(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Lets tests simulate the passage of a window without sleeping. Both the
/// monotonic and the wall reading advance together from their anchors.
#[derive(Debug)]
pub struct ManualClock {
    instant_anchor: Instant,
    wall_anchor: DateTime<Utc>,
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    /// Create a manual clock whose wall reading starts at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            instant_anchor: Instant::now(),
            wall_anchor: start,
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, delta: Duration) {
        *self.elapsed.lock() += delta;
    }

    /// Time advanced since creation.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn instant(&self) -> Instant {
        self.instant_anchor + self.elapsed()
    }

    fn wall(&self) -> DateTime<Utc> {
        TimeDelta::from_std(self.elapsed())
            .ok()
            .and_then(|elapsed| self.wall_anchor.checked_add_signed(elapsed))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
