//! # Clock Reconciler
//!
//! Estimates the model's virtual time on the render side from `_teatime`
//! beacons.
//!
//! The estimate is an offset from a local monotonic stopwatch started once at
//! construction. Each beacon yields a candidate offset; the first is taken
//! as-is, later ones are low-pass filtered so that jitter in delivery does
//! not make the estimate jump.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tether_shared::constants::CLOCK_SMOOTHING_WEIGHT;

use crate::error::DecodeError;

/// Smoothed virtual-time estimate.
#[derive(Debug, Clone)]
pub struct ClockReconciler {
    /// Stopwatch zero.
    origin: Instant,
    /// Estimated virtual time at stopwatch zero. `None` until the first beacon.
    offset: Option<i64>,
    /// Weight given to each new sample.
    weight: f64,
    /// Beacons applied so far.
    beacons: u64,
}

impl ClockReconciler {
    /// Creates a reconciler whose stopwatch starts now.
    #[must_use]
    pub fn new() -> Self {
        Self::with_origin(Instant::now())
    }

    /// Creates a reconciler with an explicit stopwatch zero.
    #[must_use]
    pub const fn with_origin(origin: Instant) -> Self {
        Self {
            origin,
            offset: None,
            weight: CLOCK_SMOOTHING_WEIGHT,
            beacons: 0,
        }
    }

    /// Milliseconds since the stopwatch started.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        duration_ms(self.origin.elapsed())
    }

    /// Milliseconds from stopwatch zero to `at`. Instants before zero read 0.
    #[must_use]
    pub fn elapsed_ms_at(&self, at: Instant) -> i64 {
        duration_ms(at.saturating_duration_since(self.origin))
    }

    /// Applies a beacon received now. Returns the new offset.
    ///
    /// # Errors
    ///
    /// `InvalidTimestamp` if the beacon is too far out of range to yield an
    /// offset. The estimate is left untouched.
    pub fn on_beacon(&mut self, remote_virtual_time: i64) -> Result<i64, DecodeError> {
        self.on_beacon_at(remote_virtual_time, self.elapsed_ms())
    }

    /// Applies a beacon as if received `elapsed_ms` after stopwatch zero.
    ///
    /// # Errors
    ///
    /// As for [`Self::on_beacon`].
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn on_beacon_at(
        &mut self,
        remote_virtual_time: i64,
        elapsed_ms: i64,
    ) -> Result<i64, DecodeError> {
        let candidate = remote_virtual_time
            .checked_sub(elapsed_ms)
            .ok_or_else(|| DecodeError::InvalidTimestamp(remote_virtual_time.to_string()))?;
        let offset = match self.offset {
            None => candidate,
            Some(previous) => {
                let smoothed =
                    self.weight * candidate as f64 + (1.0 - self.weight) * previous as f64;
                smoothed as i64
            }
        };
        self.offset = Some(offset);
        self.beacons += 1;
        Ok(offset)
    }

    /// Current virtual-time estimate, or `None` before the first beacon.
    #[must_use]
    pub fn now(&self) -> Option<i64> {
        self.now_at(self.elapsed_ms())
    }

    /// Virtual-time estimate at `elapsed_ms` after stopwatch zero.
    #[must_use]
    pub fn now_at(&self, elapsed_ms: i64) -> Option<i64> {
        self.offset.map(|offset| offset.saturating_add(elapsed_ms))
    }

    /// True once a beacon has been applied.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.offset.is_some()
    }

    /// Current offset, if any.
    #[must_use]
    pub const fn offset(&self) -> Option<i64> {
        self.offset
    }

    /// Beacons applied so far.
    #[must_use]
    pub const fn beacon_count(&self) -> u64 {
        self.beacons
    }

    /// Forgets the estimate, e.g. when a session ends.
    pub fn reset(&mut self) {
        self.offset = None;
        self.beacons = 0;
    }
}

impl Default for ClockReconciler {
    fn default() -> Self {
        Self::new()
    }
}

/// Decides when the sending side emits a beacon.
///
/// At most one beacon per interval, measured on the sender's local clock.
#[derive(Debug, Clone)]
pub struct BeaconSchedule {
    interval: Duration,
    last_sent: Option<Instant>,
}

impl BeaconSchedule {
    /// Creates a schedule with the given interval.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: None,
        }
    }

    /// Returns true, and records the send, if a beacon is due at `now`.
    pub fn poll(&mut self, now: Instant) -> bool {
        let due = self
            .last_sent
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);
        if due {
            self.last_sent = Some(now);
        }
        due
    }

    /// Makes the next poll fire regardless of the interval.
    pub fn force(&mut self) {
        self.last_sent = None;
    }
}

/// Beacon payload: virtual time truncated to whole milliseconds.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn beacon_arg(virtual_time_ms: f64) -> String {
    (virtual_time_ms.floor() as i64).to_string()
}

/// Wall-clock milliseconds since the Unix epoch.
///
/// Bundle and geometry frame timestamps use this so the receiver can
/// measure delivery delay against its own wall clock.
#[must_use]
pub fn wall_clock_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, duration_ms)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn duration_ms(duration: Duration) -> i64 {
    duration.as_millis() as i64
}
