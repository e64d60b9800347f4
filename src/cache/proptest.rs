//! Property-Based Tests for Eviction and Tiering
//!
//! # Test Properties
//!
//! 1. **Frequency Ordering**: with all else equal, a hotter entry is never
//!    evicted before a colder one
//! 2. **Limits Restored**: after selection the survivors fit both limits, or
//!    every candidate was taken
//! 3. **Progress**: an over-limit store always yields at least one candidate
//! 4. **Bounded Tiers**: the memory tier and access logs never exceed their bounds

#![cfg(test)]

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use super::entry::{CacheEntry, Priority};
use super::eviction::{EvictionCandidate, EvictionPolicy};
use super::memory::MemoryTier;
use super::policy::{CachePolicy, EvictionStrategy};
use super::store::{CacheStore, InMemoryCacheStore};
use super::tracker::AccessTracker;
use super::CacheEngine;
use crate::config::EngineConfig;

// =============================================================================
// Property Strategies
// =============================================================================

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 10, 1, 12, 0, 0).unwrap()
}

fn strategy_strategy() -> impl Strategy<Value = EvictionStrategy> {
    prop_oneof![
        Just(EvictionStrategy::Lru),
        Just(EvictionStrategy::Lfu),
        Just(EvictionStrategy::Fifo),
        Just(EvictionStrategy::Intelligent),
    ]
}

fn priority_strategy() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Critical),
        Just(Priority::High),
        Just(Priority::Medium),
        Just(Priority::Low),
    ]
}

/// Candidates with random frequency, size, priority, age and recency
fn candidates_strategy() -> impl Strategy<Value = Vec<EvictionCandidate>> {
    prop::collection::vec(
        (0u32..50, 1u64..10_000, priority_strategy(), 0i64..400, 0i64..400),
        1..60,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (frequency, size, priority, age_h, idle_h))| EvictionCandidate {
                id: format!("k{:03}", i),
                size,
                priority,
                created_at: now() - Duration::hours(age_h.max(idle_h)),
                last_accessed: now() - Duration::hours(idle_h),
                frequency,
            })
            .collect()
    })
}

// =============================================================================
// Selection Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: identical entries differing only in frequency are evicted
    /// coldest first under the intelligent strategy.
    #[test]
    fn prop_intelligent_respects_frequency(
        frequencies in prop::collection::vec(0u32..100, 2..40),
        max_entries in 0usize..40,
    ) {
        let candidates: Vec<EvictionCandidate> = frequencies
            .iter()
            .enumerate()
            .map(|(i, &frequency)| EvictionCandidate {
                id: format!("k{:03}", i),
                size: 1024,
                priority: Priority::Medium,
                created_at: now() - Duration::hours(2),
                last_accessed: now() - Duration::hours(1),
                frequency,
            })
            .collect();
        let total_size = 1024 * candidates.len() as u64;

        let selector = EvictionPolicy::new(CachePolicy {
            max_entries,
            ..Default::default()
        });
        let selected = selector.select(candidates.clone(), total_size, now());

        let max_selected = selected.iter().map(|c| c.frequency).max();
        let min_kept = candidates
            .iter()
            .filter(|c| !selected.iter().any(|s| s.id == c.id))
            .map(|c| c.frequency)
            .min();

        if let (Some(evicted), Some(kept)) = (max_selected, min_kept) {
            prop_assert!(evicted <= kept, "evicted freq {} while keeping freq {}", evicted, kept);
        }
    }

    /// Property: survivors fit both limits unless every candidate was taken.
    #[test]
    fn prop_selection_restores_limits(
        candidates in candidates_strategy(),
        strategy in strategy_strategy(),
        max_entries in 0usize..60,
        max_size in 0u64..200_000,
    ) {
        let total_size: u64 = candidates.iter().map(|c| c.size).sum();
        let total = candidates.len();

        let selector = EvictionPolicy::new(CachePolicy {
            max_entries,
            max_size_bytes: max_size,
            eviction_strategy: strategy,
            ..Default::default()
        });
        let selected = selector.select(candidates, total_size, now());

        let remaining_entries = total - selected.len();
        let remaining_size = total_size - selected.iter().map(|c| c.size).sum::<u64>();

        prop_assert!(selected.len() <= total);
        prop_assert!(
            selected.len() == total
                || (remaining_entries <= max_entries && remaining_size <= max_size),
            "left {} entries / {} bytes over limits {} / {}",
            remaining_entries, remaining_size, max_entries, max_size
        );
    }

    /// Property: a non-empty candidate set always yields at least one victim.
    #[test]
    fn prop_selection_makes_progress(
        candidates in candidates_strategy(),
        strategy in strategy_strategy(),
    ) {
        let total_size: u64 = candidates.iter().map(|c| c.size).sum();
        let selector = EvictionPolicy::new(CachePolicy {
            eviction_strategy: strategy,
            ..Default::default()
        });
        prop_assert!(!selector.select(candidates, total_size, now()).is_empty());
    }
}

// =============================================================================
// Tier Bound Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: the memory tier never holds more than its capacity.
    #[test]
    fn prop_memory_tier_bounded(
        capacity in 0usize..20,
        keys in prop::collection::vec(0u32..50, 0..200),
    ) {
        let tier = MemoryTier::with_capacity(capacity);
        for key in keys {
            tier.insert(CacheEntry::new_at(format!("k{}", key), Bytes::new(), now()));
            prop_assert!(tier.len() <= capacity);
        }
    }

    /// Property: frequency never exceeds the retained log or the access count.
    #[test]
    fn prop_tracker_frequency_bounded(
        offsets in prop::collection::vec(0i64..(48 * 3600), 1..300),
    ) {
        let tracker = AccessTracker::new();
        let mut sorted = offsets.clone();
        sorted.sort_unstable();

        let mut last = 0;
        for offset in &sorted {
            last = tracker.record_access("k", now() + Duration::seconds(*offset));
        }

        prop_assert!(last as usize <= tracker.log_len("k"));
        prop_assert!(tracker.log_len("k") <= 100);
        prop_assert!(last as usize <= sorted.len());
    }
}

// =============================================================================
// Engine Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    /// Property: after enforcement the store is within both limits.
    #[test]
    fn prop_engine_enforcement_holds_limits(
        sizes in prop::collection::vec(1usize..4096, 1..40),
        max_entries in 1usize..20,
        max_size in 1024u64..32_768,
        strategy in strategy_strategy(),
    ) {
        let store = Arc::new(InMemoryCacheStore::new());
        let config = EngineConfig {
            policy: CachePolicy {
                max_entries,
                max_size_bytes: max_size,
                eviction_strategy: strategy,
                ..Default::default()
            },
            ..Default::default()
        };
        let engine = CacheEngine::with_config(config, store.clone());

        let summary = tokio_test::block_on(async {
            for (i, size) in sizes.iter().enumerate() {
                engine
                    .set(CacheEntry::new(format!("k{}", i), Bytes::from(vec![0u8; *size])))
                    .await;
            }
            engine.enforce_policy().await.unwrap();
            store.summary().await.unwrap()
        });

        prop_assert!(summary.entries <= max_entries);
        prop_assert!(summary.total_size <= max_size);
    }
}
