//! Cache Policy
//!
//! Size/count limits, TTL, compression threshold and the eviction strategy,
//! plus the tunable weights behind the intelligent eviction score.

use serde::{Deserialize, Serialize};

use super::entry::Priority;
use super::DEFAULT_MEMORY_TIER_CAPACITY;

/// Candidate selection strategy used when the cache is over its limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionStrategy {
    /// Least recently accessed first
    Lru,
    /// Least frequently accessed first
    Lfu,
    /// Oldest created first
    Fifo,
    /// Blended recency / frequency / size / priority / age score
    Intelligent,
}

impl EvictionStrategy {
    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            EvictionStrategy::Lru => "lru",
            EvictionStrategy::Lfu => "lfu",
            EvictionStrategy::Fifo => "fifo",
            EvictionStrategy::Intelligent => "intelligent",
        }
    }
}

impl Default for EvictionStrategy {
    fn default() -> Self {
        EvictionStrategy::Intelligent
    }
}

impl std::fmt::Display for EvictionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Weights for the intelligent eviction score
///
/// `score = -frequency_weight * frequency
///          + recency_weight * hours_since_last_access
///          + ln(size + 1) / size_divisor
///          + priority_bonus
///          + age_penalty (if older than age_threshold_hours)`
///
/// Higher scores are evicted first: cold, large, low-priority and aged
/// entries score high, frequently used and critical entries score low.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub frequency_weight: f64,
    pub recency_weight: f64,
    pub size_divisor: f64,
    pub critical_bonus: f64,
    pub high_bonus: f64,
    pub medium_bonus: f64,
    pub low_bonus: f64,
    pub age_threshold_hours: f64,
    pub age_penalty: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            frequency_weight: 10.0,
            recency_weight: 1.0,
            size_divisor: 1000.0,
            critical_bonus: -100.0,
            high_bonus: -50.0,
            medium_bonus: -20.0,
            low_bonus: 0.0,
            age_threshold_hours: 7.0 * 24.0,
            age_penalty: 50.0,
        }
    }
}

impl ScoringWeights {
    /// Bonus added for an entry's priority
    pub fn priority_bonus(&self, priority: Priority) -> f64 {
        match priority {
            Priority::Critical => self.critical_bonus,
            Priority::High => self.high_bonus,
            Priority::Medium => self.medium_bonus,
            Priority::Low => self.low_bonus,
        }
    }

    /// Compute the eviction score from raw inputs
    pub fn score(
        &self,
        frequency: u32,
        hours_since_access: f64,
        size_bytes: u64,
        priority: Priority,
        age_hours: f64,
    ) -> f64 {
        let size_term = ((size_bytes as f64) + 1.0).ln() / self.size_divisor;
        let age_term = if age_hours > self.age_threshold_hours {
            self.age_penalty
        } else {
            0.0
        };

        -self.frequency_weight * frequency as f64
            + self.recency_weight * hours_since_access
            + size_term
            + self.priority_bonus(priority)
            + age_term
    }
}

/// Cache policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachePolicy {
    /// Maximum total stored bytes
    pub max_size_bytes: u64,
    /// Maximum number of entries
    pub max_entries: usize,
    /// Time-to-live applied at creation (None = entries never expire)
    pub ttl_seconds: Option<u64>,
    /// Eviction strategy
    pub eviction_strategy: EvictionStrategy,
    /// Payloads larger than this are compressed
    pub compression_threshold: u64,
    /// Access count above which an item is considered worth preloading
    pub preload_threshold: u64,
    /// Memory tier capacity (entries)
    pub memory_tier_capacity: usize,
    /// Intelligent eviction weights
    pub scoring: ScoringWeights,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            max_size_bytes: 100 * 1024 * 1024, // 100MB
            max_entries: 1000,
            ttl_seconds: Some(7 * 24 * 60 * 60), // 7 days
            eviction_strategy: EvictionStrategy::Intelligent,
            compression_threshold: 1024 * 1024, // 1MB
            preload_threshold: 5,
            memory_tier_capacity: DEFAULT_MEMORY_TIER_CAPACITY,
            scoring: ScoringWeights::default(),
        }
    }
}

impl CachePolicy {
    /// Pure LRU policy with default limits
    pub fn lru() -> Self {
        Self {
            eviction_strategy: EvictionStrategy::Lru,
            ..Default::default()
        }
    }

    /// Pure LFU policy with default limits
    pub fn lfu() -> Self {
        Self {
            eviction_strategy: EvictionStrategy::Lfu,
            ..Default::default()
        }
    }

    /// FIFO policy with default limits
    pub fn fifo() -> Self {
        Self {
            eviction_strategy: EvictionStrategy::Fifo,
            ..Default::default()
        }
    }

    /// TTL as a chrono duration
    pub fn ttl(&self) -> Option<chrono::Duration> {
        self.ttl_seconds
            .filter(|secs| *secs > 0)
            .map(|secs| chrono::Duration::seconds(secs.min(i64::MAX as u64) as i64))
    }

    /// Whether the given totals exceed either limit
    pub fn is_over_limit(&self, total_size: u64, total_entries: usize) -> bool {
        total_size > self.max_size_bytes || total_entries > self.max_entries
    }

    /// Fraction of the byte budget in use, clamped to [0, 1]
    pub fn memory_pressure(&self, total_size: u64) -> f64 {
        if self.max_size_bytes == 0 {
            return if total_size == 0 { 0.0 } else { 1.0 };
        }
        (total_size as f64 / self.max_size_bytes as f64).min(1.0)
    }

    /// Merge a partial update. No range validation is performed.
    pub fn apply(&mut self, update: PolicyUpdate) {
        if let Some(v) = update.max_size_bytes {
            self.max_size_bytes = v;
        }
        if let Some(v) = update.max_entries {
            self.max_entries = v;
        }
        if let Some(v) = update.ttl_seconds {
            self.ttl_seconds = v;
        }
        if let Some(v) = update.eviction_strategy {
            self.eviction_strategy = v;
        }
        if let Some(v) = update.compression_threshold {
            self.compression_threshold = v;
        }
        if let Some(v) = update.preload_threshold {
            self.preload_threshold = v;
        }
        if let Some(v) = update.memory_tier_capacity {
            self.memory_tier_capacity = v;
        }
        if let Some(v) = update.scoring {
            self.scoring = v;
        }
    }
}

/// Partial policy update; `None` fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyUpdate {
    pub max_size_bytes: Option<u64>,
    pub max_entries: Option<usize>,
    /// `Some(None)` clears the TTL
    pub ttl_seconds: Option<Option<u64>>,
    pub eviction_strategy: Option<EvictionStrategy>,
    pub compression_threshold: Option<u64>,
    pub preload_threshold: Option<u64>,
    pub memory_tier_capacity: Option<usize>,
    pub scoring: Option<ScoringWeights>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = CachePolicy::default();
        assert_eq!(policy.eviction_strategy, EvictionStrategy::Intelligent);
        assert_eq!(policy.memory_tier_capacity, 50);
        assert_eq!(policy.ttl(), Some(chrono::Duration::days(7)));
    }

    #[test]
    fn test_named_policies() {
        assert_eq!(CachePolicy::lru().eviction_strategy, EvictionStrategy::Lru);
        assert_eq!(CachePolicy::lfu().eviction_strategy, EvictionStrategy::Lfu);
        assert_eq!(CachePolicy::fifo().eviction_strategy, EvictionStrategy::Fifo);
    }

    #[test]
    fn test_zero_ttl_means_no_expiry() {
        let policy = CachePolicy {
            ttl_seconds: Some(0),
            ..Default::default()
        };
        assert!(policy.ttl().is_none());
    }

    #[test]
    fn test_apply_partial_update() {
        let mut policy = CachePolicy::default();
        policy.apply(PolicyUpdate {
            max_entries: Some(2),
            eviction_strategy: Some(EvictionStrategy::Lfu),
            ..Default::default()
        });

        assert_eq!(policy.max_entries, 2);
        assert_eq!(policy.eviction_strategy, EvictionStrategy::Lfu);
        // Untouched fields keep their values
        assert_eq!(policy.max_size_bytes, 100 * 1024 * 1024);
    }

    #[test]
    fn test_apply_clears_ttl() {
        let mut policy = CachePolicy::default();
        policy.apply(PolicyUpdate {
            ttl_seconds: Some(None),
            ..Default::default()
        });
        assert!(policy.ttl().is_none());
    }

    #[test]
    fn test_update_accepts_out_of_range_values() {
        let mut policy = CachePolicy::default();
        policy.apply(PolicyUpdate {
            max_size_bytes: Some(0),
            ..Default::default()
        });
        assert_eq!(policy.max_size_bytes, 0);
        assert_eq!(policy.memory_pressure(10), 1.0);
    }

    #[test]
    fn test_memory_pressure_clamped() {
        let policy = CachePolicy {
            max_size_bytes: 100,
            ..Default::default()
        };
        assert_eq!(policy.memory_pressure(50), 0.5);
        assert_eq!(policy.memory_pressure(500), 1.0);
    }

    #[test]
    fn test_score_priority_ordering() {
        let weights = ScoringWeights::default();
        let critical = weights.score(1, 1.0, 1024, Priority::Critical, 1.0);
        let low = weights.score(1, 1.0, 1024, Priority::Low, 1.0);
        assert!(critical < low, "critical entries must score lower");
    }

    #[test]
    fn test_score_frequency_protects() {
        let weights = ScoringWeights::default();
        let cold = weights.score(1, 2.0, 1024, Priority::Medium, 1.0);
        let hot = weights.score(10, 2.0, 1024, Priority::Medium, 1.0);
        assert!(hot < cold);
    }

    #[test]
    fn test_score_age_penalty() {
        let weights = ScoringWeights::default();
        let young = weights.score(0, 0.0, 0, Priority::Low, 24.0);
        let old = weights.score(0, 0.0, 0, Priority::Low, 8.0 * 24.0);
        assert_eq!(old - young, 50.0);
    }

    #[test]
    fn test_policy_yaml_partial() {
        let policy: CachePolicy =
            serde_yaml::from_str("max_entries: 10\neviction_strategy: lru\n").unwrap();
        assert_eq!(policy.max_entries, 10);
        assert_eq!(policy.eviction_strategy, EvictionStrategy::Lru);
        assert_eq!(policy.compression_threshold, 1024 * 1024);
    }
}
