//! # Message Statistics
//!
//! Observational counters, reported and reset once per interval. Nothing
//! here affects protocol behavior.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Width of a setup-time histogram bucket.
pub const SETUP_BUCKET_MS: u64 = 20;

/// Counters for one reporting interval.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsReport {
    /// Inbound commands handled.
    pub in_messages: u64,
    /// Inbound bundles handled.
    pub in_bundles: u64,
    /// Sum of inbound bundle delays, in milliseconds.
    pub in_bundle_delay_ms: i64,
    /// Time spent handling inbound frames.
    pub in_processing: Duration,
    /// Outbound commands sent.
    pub out_messages: u64,
    /// Outbound text frames sent.
    pub out_bundles: u64,
    /// Outbound geometry frames sent.
    pub out_geometry_frames: u64,
    /// Outbound geometry records sent.
    pub out_geometry_records: u64,
    /// Inbound frames dropped as undecodable.
    pub decode_faults: u64,
    /// Outbound commands dropped by the queue bound.
    pub dropped_messages: u64,
}

impl StatsReport {
    /// Average bundle delay, if any bundle arrived.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn avg_bundle_delay_ms(&self) -> Option<i64> {
        (self.in_bundles > 0).then(|| self.in_bundle_delay_ms / self.in_bundles as i64)
    }

    /// True if nothing at all was counted.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "in: {} messages with {} bundles",
            self.in_messages, self.in_bundles
        )?;
        if let Some(avg) = self.avg_bundle_delay_ms() {
            write!(f, " ({avg}ms avg delay)")?;
        }
        write!(
            f,
            " handled in {}ms; out: {} messages in {} frames, {} geometry records in {} frames",
            self.in_processing.as_millis(),
            self.out_messages,
            self.out_bundles,
            self.out_geometry_records,
            self.out_geometry_frames
        )?;
        if self.decode_faults > 0 || self.dropped_messages > 0 {
            write!(
                f,
                "; {} bad frames, {} dropped",
                self.decode_faults, self.dropped_messages
            )?;
        }
        Ok(())
    }
}

/// Interval-reset message counters.
#[derive(Debug, Clone)]
pub struct MessageStats {
    current: StatsReport,
    interval: Duration,
    last_report: Instant,
}

impl MessageStats {
    /// Creates counters that report every `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    /// Creates counters whose first interval starts at `start`.
    #[must_use]
    pub fn starting_at(interval: Duration, start: Instant) -> Self {
        Self {
            current: StatsReport::default(),
            interval,
            last_report: start,
        }
    }

    /// Counts one inbound command.
    #[inline]
    pub fn inbound_message(&mut self) {
        self.current.in_messages += 1;
    }

    /// Counts one inbound bundle and its delay.
    #[inline]
    pub fn inbound_bundle(&mut self, delay_ms: i64) {
        self.current.in_bundles += 1;
        self.current.in_bundle_delay_ms =
            self.current.in_bundle_delay_ms.saturating_add(delay_ms);
    }

    /// Adds inbound processing time.
    #[inline]
    pub fn inbound_processing(&mut self, elapsed: Duration) {
        self.current.in_processing += elapsed;
    }

    /// Counts one outbound text frame carrying `messages` commands.
    #[inline]
    pub fn outbound_frame(&mut self, messages: usize) {
        self.current.out_bundles += 1;
        self.current.out_messages += messages as u64;
    }

    /// Counts one outbound geometry frame.
    #[inline]
    pub fn outbound_geometry(&mut self, records: usize) {
        self.current.out_geometry_frames += 1;
        self.current.out_geometry_records += records as u64;
    }

    /// Counts an undecodable inbound frame.
    #[inline]
    pub fn decode_fault(&mut self) {
        self.current.decode_faults += 1;
    }

    /// Counts a command dropped by the queue bound.
    #[inline]
    pub fn dropped_message(&mut self) {
        self.current.dropped_messages += 1;
    }

    /// Counters so far in this interval.
    #[must_use]
    pub const fn current(&self) -> &StatsReport {
        &self.current
    }

    /// Returns and resets the counters once the interval has elapsed.
    pub fn maybe_report(&mut self, now: Instant) -> Option<StatsReport> {
        if now.saturating_duration_since(self.last_report) < self.interval {
            return None;
        }
        self.last_report = now;
        Some(std::mem::take(&mut self.current))
    }
}

/// Histogram of object setup round-trips, in 20ms buckets.
#[derive(Debug, Clone, Default)]
pub struct SetupStats {
    buckets: BTreeMap<u64, u32>,
}

impl SetupStats {
    /// Creates an empty histogram.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buckets: BTreeMap::new(),
        }
    }

    /// Records one setup time. Negative delays (clock skew) count as zero.
    pub fn record(&mut self, delay_ms: i64) {
        let delay = u64::try_from(delay_ms).unwrap_or(0);
        *self.buckets.entry(delay / SETUP_BUCKET_MS * SETUP_BUCKET_MS).or_insert(0) += 1;
    }

    /// Total recorded setups.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.buckets.values().sum()
    }

    /// Count in the bucket starting at `bucket_ms`.
    #[must_use]
    pub fn bucket(&self, bucket_ms: u64) -> u32 {
        self.buckets.get(&bucket_ms).copied().unwrap_or(0)
    }

    /// Renders as `bucket:count` pairs and clears the histogram.
    pub fn take_summary(&mut self) -> String {
        let summary = self
            .buckets
            .iter()
            .map(|(bucket, count)| format!("{bucket}:{count}"))
            .collect::<Vec<_>>()
            .join(" ");
        self.buckets.clear();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_only_after_interval() {
        let start = Instant::now();
        let mut stats = MessageStats::starting_at(Duration::from_secs(1), start);
        stats.inbound_message();
        stats.inbound_bundle(12);
        stats.inbound_bundle(8);

        assert!(stats
            .maybe_report(start + Duration::from_millis(999))
            .is_none());

        let report = stats.maybe_report(start + Duration::from_secs(1)).unwrap();
        assert_eq!(report.in_messages, 1);
        assert_eq!(report.in_bundles, 2);
        assert_eq!(report.avg_bundle_delay_ms(), Some(10));

        // Counters were reset.
        assert!(stats.current().is_idle());
    }

    #[test]
    fn test_outbound_counters() {
        let mut stats = MessageStats::new(Duration::from_secs(1));
        stats.outbound_frame(3);
        stats.outbound_frame(1);
        stats.outbound_geometry(40);
        let current = stats.current();
        assert_eq!(current.out_bundles, 2);
        assert_eq!(current.out_messages, 4);
        assert_eq!(current.out_geometry_records, 40);
        assert_eq!(current.avg_bundle_delay_ms(), None);
    }

    #[test]
    fn test_display_mentions_faults_only_when_present() {
        let mut report = StatsReport::default();
        assert!(!report.to_string().contains("bad frames"));
        report.decode_faults = 2;
        assert!(report.to_string().contains("2 bad frames"));
    }

    #[test]
    fn test_setup_buckets() {
        let mut setup = SetupStats::new();
        for delay in [0, 19, 20, 45, -3] {
            setup.record(delay);
        }
        assert_eq!(setup.bucket(0), 3);
        assert_eq!(setup.bucket(20), 1);
        assert_eq!(setup.bucket(40), 1);
        assert_eq!(setup.total(), 5);
        assert_eq!(setup.take_summary(), "0:3 20:1 40:1");
        assert_eq!(setup.total(), 0);
    }
}
