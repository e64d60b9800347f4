//! Cache Statistics
//!
//! Counters updated on the request path plus a store snapshot refreshed by
//! maintenance. [`StatsCollector::snapshot`] combines both into [`CacheStats`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;

use super::policy::CachePolicy;
use super::store::StoreSummary;

/// EMA smoothing factor for the average access time
const ACCESS_TIME_ALPHA: f64 = 0.1;

/// Sentinel for "no access time recorded yet"
const NO_SAMPLE: u64 = u64::MAX;

/// Point-in-time cache statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Stored bytes (compressed sizes where compression applied)
    pub total_size: u64,
    /// Stored entries
    pub total_entries: usize,
    /// Hits / (hits + misses)
    pub hit_rate: f64,
    /// Misses / (hits + misses)
    pub miss_rate: f64,
    pub hits: u64,
    pub misses: u64,
    /// Mean ratio over compressed entries (1.0 when none)
    pub compression_ratio: f64,
    /// EMA of `get` latency in milliseconds
    pub average_access_time_ms: f64,
    pub eviction_count: u64,
    pub preload_hits: u64,
    /// `total_size / max_size_bytes`, clamped to [0, 1]
    pub memory_pressure: f64,
    pub memory_tier_entries: usize,
}

/// Statistics collector
pub struct StatsCollector {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    preload_hits: AtomicU64,
    access_time_ms_bits: AtomicU64,
    store: RwLock<StoreSummary>,
}

impl StatsCollector {
    /// Create a new collector
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            preload_hits: AtomicU64::new(0),
            access_time_ms_bits: AtomicU64::new(NO_SAMPLE),
            store: RwLock::new(StoreSummary {
                compression_ratio: 1.0,
                ..Default::default()
            }),
        }
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_preloads(&self, count: u64) {
        self.preload_hits.fetch_add(count, Ordering::Relaxed);
    }

    /// Fold a `get` latency into the moving average
    ///
    /// The first sample seeds the average.
    pub fn record_access_time(&self, duration: Duration) {
        let sample = duration.as_secs_f64() * 1000.0;

        loop {
            let current = self.access_time_ms_bits.load(Ordering::Relaxed);
            let updated = if current == NO_SAMPLE {
                sample
            } else {
                (1.0 - ACCESS_TIME_ALPHA) * f64::from_bits(current) + ACCESS_TIME_ALPHA * sample
            };

            if self
                .access_time_ms_bits
                .compare_exchange_weak(
                    current,
                    updated.to_bits(),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                break;
            }
        }
    }

    /// Replace the store snapshot
    pub fn update_store(&self, summary: StoreSummary) {
        *self.store.write() = summary;
    }

    /// Get hit count
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get miss count
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Entries removed by eviction
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Entries created by warming
    pub fn preload_hits(&self) -> u64 {
        self.preload_hits.load(Ordering::Relaxed)
    }

    /// Average access time in milliseconds (0 before the first sample)
    pub fn average_access_time_ms(&self) -> f64 {
        match self.access_time_ms_bits.load(Ordering::Relaxed) {
            NO_SAMPLE => 0.0,
            bits => f64::from_bits(bits),
        }
    }

    /// Get hit rate
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Combine counters and the last store snapshot
    pub fn snapshot(&self, policy: &CachePolicy, memory_tier_entries: usize) -> CacheStats {
        let store = *self.store.read();
        let hits = self.hits();
        let misses = self.misses();
        let total = hits + misses;
        let (hit_rate, miss_rate) = if total == 0 {
            (0.0, 0.0)
        } else {
            (hits as f64 / total as f64, misses as f64 / total as f64)
        };

        CacheStats {
            total_size: store.total_size,
            total_entries: store.entries,
            hit_rate,
            miss_rate,
            hits,
            misses,
            compression_ratio: store.compression_ratio,
            average_access_time_ms: self.average_access_time_ms(),
            eviction_count: self.evictions(),
            preload_hits: self.preload_hits(),
            memory_pressure: policy.memory_pressure(store.total_size),
            memory_tier_entries,
        }
    }

    /// Reset request counters (the store snapshot is kept)
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.preload_hits.store(0, Ordering::Relaxed);
        self.access_time_ms_bits.store(NO_SAMPLE, Ordering::Relaxed);
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
