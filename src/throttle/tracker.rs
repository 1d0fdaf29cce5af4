//! In-memory failure tracking keyed by client identity.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, trace};

/// Dividend used to turn a millisecond gap into submissions per second.
const SUBMISSION_RATE_DIVIDEND: f64 = 1000.0;

/// Instantaneous submission rate between two submissions, in submissions per
/// second. A zero or negative gap yields an infinite rate.
#[must_use]
pub fn submission_rate(now: DateTime<Utc>, last: DateTime<Utc>) -> f64 {
    let elapsed_ms = now.signed_duration_since(last).num_milliseconds();
    if elapsed_ms <= 0 {
        return f64::INFINITY;
    }
    #[allow(clippy::cast_precision_loss)]
    let elapsed_ms = elapsed_ms as f64;
    SUBMISSION_RATE_DIVIDEND / elapsed_ms
}

/// Outcome of a single cleaner sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted: usize,
    pub retained: usize,
}

/// Last failed submission per client key.
///
/// Only the most recent failure is kept: a new failure replaces the stored
/// timestamp. The map is sharded, so lookups and updates for different keys
/// do not contend.
#[derive(Debug)]
pub struct ThrottleTracker {
    failures: DashMap<String, DateTime<Utc>>,
    threshold_rate: f64,
}

impl ThrottleTracker {
    #[must_use]
    pub fn new(threshold_rate: f64) -> Self {
        Self {
            failures: DashMap::new(),
            threshold_rate,
        }
    }

    #[must_use]
    pub fn threshold_rate(&self) -> f64 {
        self.threshold_rate
    }

    #[must_use]
    pub fn exceeds_threshold(&self, key: &str) -> bool {
        self.exceeds_threshold_at(key, Utc::now())
    }

    /// Whether the failure rate for `key`, measured at `now`, is above the threshold.
    #[must_use]
    pub fn exceeds_threshold_at(&self, key: &str, now: DateTime<Utc>) -> bool {
        // Copy the timestamp out so the shard lock is released before comparing.
        let Some(last) = self.failures.get(key).map(|entry| *entry.value()) else {
            return false;
        };
        submission_rate(now, last) > self.threshold_rate
    }

    pub fn record_failure(&self, key: &str) {
        self.record_failure_at(key, Utc::now());
    }

    pub fn record_failure_at(&self, key: &str, now: DateTime<Utc>) {
        self.failures.insert(key.to_string(), now);
    }

    #[must_use]
    pub fn last_failure(&self, key: &str) -> Option<DateTime<Utc>> {
        self.failures.get(key).map(|entry| *entry.value())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Evict every entry whose rate at `now` has decayed below the threshold.
    ///
    /// Shards are locked one at a time, so concurrent failures keep being
    /// recorded while a sweep runs. A failure recorded after `now` has a
    /// negative gap and is always retained.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        debug!(
            keys = self.failures.len(),
            "Decrementing counts for throttler"
        );

        let mut report = SweepReport::default();
        self.failures.retain(|key, last| {
            if submission_rate(now, *last) < self.threshold_rate {
                trace!(key = %key, "Removing throttle entry");
                report.evicted += 1;
                false
            } else {
                report.retained += 1;
                true
            }
        });

        debug!(
            evicted = report.evicted,
            retained = report.retained,
            "Done decrementing counts for throttler"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use std::sync::Arc;

    fn ago(now: DateTime<Utc>, ms: i64) -> DateTime<Utc> {
        now - TimeDelta::milliseconds(ms)
    }

    #[test]
    fn submission_rate_is_per_second() {
        let now = Utc::now();
        assert!((submission_rate(now, ago(now, 500)) - 2.0).abs() < f64::EPSILON);
        assert!((submission_rate(now, ago(now, 2_000)) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn submission_rate_handles_zero_and_negative_gaps() {
        let now = Utc::now();
        assert!(submission_rate(now, now).is_infinite());
        assert!(submission_rate(now, now + TimeDelta::milliseconds(10)).is_infinite());
    }

    #[test]
    fn unknown_key_never_exceeds() {
        let tracker = ThrottleTracker::new(1.0);
        assert!(!tracker.exceeds_threshold("10.0.0.1"));
        assert!(tracker.is_empty());
    }

    #[test]
    fn recent_failure_exceeds_and_decays() {
        let now = Utc::now();
        let tracker = ThrottleTracker::new(1.0);

        tracker.record_failure_at("10.0.0.1", ago(now, 500));
        assert!(tracker.exceeds_threshold_at("10.0.0.1", now));

        tracker.record_failure_at("10.0.0.1", ago(now, 2_000));
        assert!(!tracker.exceeds_threshold_at("10.0.0.1", now));
    }

    #[test]
    fn failure_at_same_instant_exceeds() {
        let now = Utc::now();
        let tracker = ThrottleTracker::new(1_000_000.0);
        tracker.record_failure_at("10.0.0.1", now);
        assert!(tracker.exceeds_threshold_at("10.0.0.1", now));
    }

    #[test]
    fn rate_equal_to_threshold_neither_throttles_nor_evicts() {
        let now = Utc::now();
        let tracker = ThrottleTracker::new(1.0);
        tracker.record_failure_at("10.0.0.1", ago(now, 1_000));

        assert!(!tracker.exceeds_threshold_at("10.0.0.1", now));

        let report = tracker.sweep(now);
        assert_eq!(
            report,
            SweepReport {
                evicted: 0,
                retained: 1
            }
        );
        assert!(tracker.last_failure("10.0.0.1").is_some());
    }

    #[test]
    fn repeated_failures_keep_only_latest_timestamp() {
        let now = Utc::now();
        let tracker = ThrottleTracker::new(1.0);
        for ms in [3_000, 2_000, 1_000] {
            tracker.record_failure_at("user;10.0.0.1", ago(now, ms));
        }
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.last_failure("user;10.0.0.1"), Some(ago(now, 1_000)));
    }

    #[test]
    fn sweep_evicts_only_cooled_entries() {
        let now = Utc::now();
        let tracker = ThrottleTracker::new(1.0);
        tracker.record_failure_at("cold-1", ago(now, 5_000));
        tracker.record_failure_at("cold-2", ago(now, 1_500));
        tracker.record_failure_at("hot", ago(now, 200));
        tracker.record_failure_at("future", now + TimeDelta::milliseconds(50));

        let report = tracker.sweep(now);

        assert_eq!(
            report,
            SweepReport {
                evicted: 2,
                retained: 2
            }
        );
        assert!(tracker.last_failure("cold-1").is_none());
        assert!(tracker.last_failure("cold-2").is_none());
        assert!(tracker.last_failure("hot").is_some());
        assert!(tracker.last_failure("future").is_some());
    }

    #[test]
    fn sweep_tolerates_concurrent_failures() {
        let tracker = Arc::new(ThrottleTracker::new(1.0));
        let start = Utc::now();
        for i in 0..1_000 {
            tracker.record_failure_at(&format!("stale-{i}"), ago(start, 60_000));
        }

        let writer = {
            let tracker = tracker.clone();
            std::thread::spawn(move || {
                for i in 0..1_000 {
                    tracker.record_failure(&format!("live-{i}"));
                }
            })
        };
        let report = tracker.sweep(start);
        writer.join().expect("writer completes");

        assert!(report.evicted >= 1_000);
        for i in 0..1_000 {
            assert!(tracker.last_failure(&format!("live-{i}")).is_some());
        }
    }
}
