//! # Flush Throttle
//!
//! Polled once per tick against elapsed time. Nothing here sleeps.

use std::time::{Duration, Instant};

/// Decides when a deferred queue flushes.
///
/// A flush is due when the interval has elapsed since the last one, or
/// unconditionally after [`FlushTimer::expedite`].
#[derive(Debug, Clone)]
pub struct FlushTimer {
    /// Minimum time between flushes.
    interval: Duration,
    /// Last flush. `None` means the next poll fires.
    last_flush: Option<Instant>,
    /// Flushes fired so far.
    flush_count: u64,
}

impl FlushTimer {
    /// Creates a timer that fires on its first poll.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_flush: None,
            flush_count: 0,
        }
    }

    /// Creates a timer from a millisecond interval.
    #[must_use]
    pub const fn from_millis(interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(interval_ms))
    }

    /// Returns true, and restarts the interval, if a flush is due at `now`.
    pub fn poll(&mut self, now: Instant) -> bool {
        let due = self
            .last_flush
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);
        if due {
            self.last_flush = Some(now);
            self.flush_count += 1;
        }
        due
    }

    /// Guarantees that the next poll fires.
    pub fn expedite(&mut self) {
        self.last_flush = None;
    }

    /// True if the next poll will fire regardless of time.
    #[must_use]
    pub const fn is_expedited(&self) -> bool {
        self.last_flush.is_none()
    }

    /// Configured interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Flushes fired so far.
    #[must_use]
    pub const fn flush_count(&self) -> u64 {
        self.flush_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_poll_fires() {
        let mut timer = FlushTimer::from_millis(45);
        assert!(timer.poll(Instant::now()));
    }

    #[test]
    fn test_interval_is_respected() {
        let start = Instant::now();
        let mut timer = FlushTimer::from_millis(45);
        assert!(timer.poll(start));
        assert!(!timer.poll(start + Duration::from_millis(44)));
        assert!(timer.poll(start + Duration::from_millis(45)));
        assert!(!timer.poll(start + Duration::from_millis(60)));
        assert_eq!(timer.flush_count(), 2);
    }

    #[test]
    fn test_expedite_forces_next_poll() {
        let start = Instant::now();
        let mut timer = FlushTimer::from_millis(90);
        assert!(timer.poll(start));
        timer.expedite();
        assert!(timer.is_expedited());
        assert!(timer.poll(start + Duration::from_millis(1)));
        assert!(!timer.poll(start + Duration::from_millis(2)));
    }
}
