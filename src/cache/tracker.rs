//! Access Tracker
//!
//! Per-key ring of the most recent access timestamps, from which the
//! frequency score (accesses within the trailing window) is derived.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use super::{ACCESS_LOG_CAPACITY, FREQUENCY_WINDOW_HOURS};

/// Rolling per-key access log
pub struct AccessTracker {
    logs: DashMap<String, VecDeque<DateTime<Utc>>>,
    capacity: usize,
    window: Duration,
}

impl AccessTracker {
    /// Create a tracker with the default ring size and 24h window
    pub fn new() -> Self {
        Self::with_limits(ACCESS_LOG_CAPACITY, Duration::hours(FREQUENCY_WINDOW_HOURS))
    }

    /// Create a tracker with a custom ring size and window
    pub fn with_limits(capacity: usize, window: Duration) -> Self {
        Self {
            logs: DashMap::new(),
            capacity: capacity.max(1),
            window,
        }
    }

    /// Append an access and return the recomputed frequency
    pub fn record_access(&self, id: &str, now: DateTime<Utc>) -> u32 {
        let mut log = self.logs.entry(id.to_string()).or_default();
        if log.len() >= self.capacity {
            log.pop_front();
        }
        log.push_back(now);
        count_within(&log, self.window, now)
    }

    /// Accesses within the trailing window ending at `now`
    pub fn frequency(&self, id: &str, now: DateTime<Utc>) -> u32 {
        self.logs
            .get(id)
            .map(|log| count_within(&log, self.window, now))
            .unwrap_or(0)
    }

    /// Number of timestamps retained for `id`
    pub fn log_len(&self, id: &str) -> usize {
        self.logs.get(id).map(|log| log.len()).unwrap_or(0)
    }

    /// Drop the log for a deleted key
    pub fn forget(&self, id: &str) {
        self.logs.remove(id);
    }

    /// Drop every log
    pub fn clear(&self) {
        self.logs.clear();
    }

    /// Number of tracked keys
    pub fn tracked_keys(&self) -> usize {
        self.logs.len()
    }
}

impl Default for AccessTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn count_within(log: &VecDeque<DateTime<Utc>>, window: Duration, now: DateTime<Utc>) -> u32 {
    let cutoff = now - window;
    log.iter().filter(|at| **at > cutoff).count() as u32
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_record_increments_frequency() {
        let tracker = AccessTracker::new();
        assert_eq!(tracker.record_access("a", t0()), 1);
        assert_eq!(tracker.record_access("a", t0() + Duration::minutes(1)), 2);
        assert_eq!(tracker.frequency("a", t0() + Duration::minutes(2)), 2);
        assert_eq!(tracker.frequency("unknown", t0()), 0);
    }

    #[test]
    fn test_window_excludes_old_accesses() {
        let tracker = AccessTracker::new();
        tracker.record_access("a", t0());
        tracker.record_access("a", t0() + Duration::hours(20));

        let later = t0() + Duration::hours(25);
        assert_eq!(tracker.frequency("a", later), 1);
        assert_eq!(tracker.record_access("a", later), 2);
    }

    #[test]
    fn test_ring_capacity() {
        let tracker = AccessTracker::new();
        for i in 0..150 {
            tracker.record_access("a", t0() + Duration::seconds(i));
        }
        assert_eq!(tracker.log_len("a"), ACCESS_LOG_CAPACITY);
        assert_eq!(tracker.frequency("a", t0() + Duration::seconds(200)), 100);
    }

    #[test]
    fn test_forget() {
        let tracker = AccessTracker::new();
        tracker.record_access("a", t0());
        tracker.record_access("b", t0());
        assert_eq!(tracker.tracked_keys(), 2);

        tracker.forget("a");
        assert_eq!(tracker.frequency("a", t0()), 0);
        assert_eq!(tracker.tracked_keys(), 1);

        tracker.clear();
        assert_eq!(tracker.tracked_keys(), 0);
    }
}
