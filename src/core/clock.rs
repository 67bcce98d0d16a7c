//! Time source abstraction
//!
//! The router needs two distinct notions of time: a monotonic clock for
//! measuring elapsed durations (latency, deadlines) and wall-clock time for
//! minute-bucket keys and log timestamps. Both are behind a trait so tests
//! can inject a fake clock instead of sleeping in real time.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// Source of monotonic and wall-clock time.
///
/// Implementations must be cheap to call and safe to share across tasks.
pub trait ClockSource: Send + Sync {
    /// A monotonic instant, suitable for measuring elapsed durations.
    fn now(&self) -> Instant;

    /// Wall-clock time, suitable for logging and minute-bucket keys.
    fn wall_now(&self) -> SystemTime;

    /// The current minute-bucket key in `YYYY-MM-DD-HH-MM` form.
    fn minute_bucket(&self) -> String {
        minute_bucket_for(self.wall_now())
    }
}

/// Format a [`SystemTime`] as a `YYYY-MM-DD-HH-MM` minute-bucket key.
pub fn minute_bucket_for(time: SystemTime) -> String {
    let datetime: chrono::DateTime<chrono::Utc> = time.into();
    datetime.format("%Y-%m-%d-%H-%M").to_string()
}

/// Real clock backed by [`std::time::Instant`]/[`std::time::SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Shared, dynamically dispatched clock handle used throughout the core.
pub type SharedClock = Arc<dyn ClockSource>;

/// Build the production default clock handle.
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

/// A clock that can be advanced deterministically, for tests.
///
/// `now()` returns a fixed base [`Instant`] offset by the accumulated
/// advance; `wall_now()` tracks a separately stored [`SystemTime`] advanced
/// in lockstep via [`FakeClock::advance`].
#[derive(Debug)]
pub struct FakeClock {
    inner: parking_lot::Mutex<FakeClockState>,
}

#[derive(Debug)]
struct FakeClockState {
    base_instant: Instant,
    elapsed: Duration,
    wall: SystemTime,
}

impl FakeClock {
    /// Create a new fake clock anchored at the given wall-clock time.
    pub fn new(wall_start: SystemTime) -> Self {
        Self {
            inner: parking_lot::Mutex::new(FakeClockState {
                base_instant: Instant::now(),
                elapsed: Duration::ZERO,
                wall: wall_start,
            }),
        }
    }

    /// Advance both the monotonic and wall clocks by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.inner.lock();
        state.elapsed += duration;
        state.wall += duration;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(SystemTime::UNIX_EPOCH)
    }
}

impl ClockSource for FakeClock {
    fn now(&self) -> Instant {
        let state = self.inner.lock();
        state.base_instant + state.elapsed
    }

    fn wall_now(&self) -> SystemTime {
        self.inner.lock().wall
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_monotonically() {
        let clock = FakeClock::default();
        let t0 = clock.now();
        clock.advance(Duration::from_secs(5));
        let t1 = clock.now();
        assert_eq!(t1 - t0, Duration::from_secs(5));
    }

    #[test]
    fn minute_bucket_has_expected_shape() {
        let bucket = minute_bucket_for(SystemTime::UNIX_EPOCH);
        assert_eq!(bucket, "1970-01-01-00-00");
    }

    #[test]
    fn fake_clock_wall_time_tracks_advance() {
        let clock = FakeClock::default();
        clock.advance(Duration::from_secs(60));
        assert_eq!(clock.minute_bucket(), "1970-01-01-00-01");
    }
}
