//! Eviction Candidate Selection
//!
//! Given a snapshot of the store, picks which entries to remove so the cache
//! returns under its size and count limits.
//!
//! # Slice rule
//!
//! Every strategy sorts candidates most-evictable first and takes a baseline
//! slice of 10% of the entries (rounded up). The intelligent strategy caps the
//! baseline at `entries - max_entries + 10`. The slice is then widened until
//! the entry count is back under `max_entries` and the projected byte total
//! is back under `max_size_bytes`, or every candidate is taken.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use super::entry::{CacheEntry, Priority};
use super::policy::{CachePolicy, EvictionStrategy};

/// Lightweight view of an entry used for ranking (no payload)
#[derive(Debug, Clone, PartialEq)]
pub struct EvictionCandidate {
    pub id: String,
    pub size: u64,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub frequency: u32,
}

impl From<&CacheEntry> for EvictionCandidate {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            id: entry.id.clone(),
            size: entry.size(),
            priority: entry.priority,
            created_at: entry.created_at,
            last_accessed: entry.last_accessed,
            frequency: entry.frequency,
        }
    }
}

/// Outcome of one `enforce_policy` pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Expired entries removed before ranking
    pub expired_removed: usize,
    /// Entries removed by the strategy
    pub evicted: usize,
    /// Candidates whose deletion failed (skipped)
    pub failed: usize,
    pub entries_before: usize,
    pub size_before: u64,
    pub entries_after: usize,
    pub size_after: u64,
}

impl EvictionReport {
    /// Whether the pass removed anything
    pub fn removed_any(&self) -> bool {
        self.expired_removed > 0 || self.evicted > 0
    }
}

/// Strategy-driven candidate selector
#[derive(Debug, Clone)]
pub struct EvictionPolicy {
    policy: CachePolicy,
}

impl EvictionPolicy {
    /// Create a selector for the given policy snapshot
    pub fn new(policy: CachePolicy) -> Self {
        Self { policy }
    }

    /// Policy in effect
    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Intelligent eviction score (higher = evict sooner)
    pub fn score(&self, candidate: &EvictionCandidate, now: DateTime<Utc>) -> f64 {
        let hours_since_access = hours_between(candidate.last_accessed, now);
        let age_hours = hours_between(candidate.created_at, now);

        self.policy.scoring.score(
            candidate.frequency,
            hours_since_access,
            candidate.size,
            candidate.priority,
            age_hours,
        )
    }

    /// Sort candidates most-evictable first
    pub fn rank(&self, candidates: &mut [EvictionCandidate], now: DateTime<Utc>) {
        match self.policy.eviction_strategy {
            EvictionStrategy::Lru => candidates.sort_by(|a, b| {
                a.last_accessed
                    .cmp(&b.last_accessed)
                    .then_with(|| a.id.cmp(&b.id))
            }),
            EvictionStrategy::Lfu => candidates.sort_by(|a, b| {
                a.frequency
                    .cmp(&b.frequency)
                    .then_with(|| a.last_accessed.cmp(&b.last_accessed))
                    .then_with(|| a.id.cmp(&b.id))
            }),
            EvictionStrategy::Fifo => candidates.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            }),
            EvictionStrategy::Intelligent => {
                let mut scored: Vec<(f64, EvictionCandidate)> = candidates
                    .iter()
                    .map(|c| (self.score(c, now), c.clone()))
                    .collect();
                scored.sort_by(|a, b| {
                    b.0.partial_cmp(&a.0)
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| a.1.id.cmp(&b.1.id))
                });
                for (slot, (_, candidate)) in candidates.iter_mut().zip(scored) {
                    *slot = candidate;
                }
            }
        }
    }

    /// Number of entries the baseline slice takes before limits are applied
    fn baseline_count(&self, total_entries: usize) -> usize {
        let tenth = total_entries.div_ceil(10);
        match self.policy.eviction_strategy {
            EvictionStrategy::Intelligent => {
                let cap = total_entries.saturating_sub(self.policy.max_entries) + 10;
                tenth.min(cap)
            }
            _ => tenth,
        }
    }

    /// Select the entries to evict
    ///
    /// `total_size` is the current byte total of the store the candidates
    /// were drawn from. Returns candidates in eviction order.
    pub fn select(
        &self,
        mut candidates: Vec<EvictionCandidate>,
        total_size: u64,
        now: DateTime<Utc>,
    ) -> Vec<EvictionCandidate> {
        let total_entries = candidates.len();
        if total_entries == 0 {
            return candidates;
        }

        self.rank(&mut candidates, now);

        let over_count = total_entries.saturating_sub(self.policy.max_entries);
        let mut count = self
            .baseline_count(total_entries)
            .max(over_count)
            .min(total_entries);

        let mut projected = candidates[..count]
            .iter()
            .fold(total_size, |acc, c| acc.saturating_sub(c.size));

        while projected > self.policy.max_size_bytes && count < total_entries {
            projected = projected.saturating_sub(candidates[count].size);
            count += 1;
        }

        candidates.truncate(count);
        candidates
    }
}

fn hours_between(earlier: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let secs = (now - earlier).num_milliseconds() as f64 / 1000.0;
    (secs / 3600.0).max(0.0)
}

// =============================================================================
// Tests
// =============================================================================
