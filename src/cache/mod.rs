//! Tiered Media Cache
//!
//! A small in-process memory tier in front of a persistent store, with
//! policy-driven eviction, transparent compression and schedule-gated warming.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                          CacheEngine (façade)                             │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │  MemoryTier (hot)     │ CacheStore (persistent)  │ AccessTracker          │
//! │  ┌────────────────┐   │ ┌────────────────────┐   │ ┌──────────────────┐   │
//! │  │ bounded map    │   │ │ entries + indexes  │   │ │ 100-slot ring    │   │
//! │  │ capacity: 50   │   │ │ (memory or files)  │   │ │ 24h frequency    │   │
//! │  └────────────────┘   │ └────────────────────┘   │ └──────────────────┘   │
//! │         │             │            │             │          │             │
//! │         └─────────────┴────────────┴─────────────┴──────────┘             │
//! │                                   │                                        │
//! │        EvictionPolicy (lru / lfu / fifo / intelligent scoring)            │
//! │        CacheWarmer · MaintenanceScheduler · StatsCollector                │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Lookup path
//!
//! `get` checks the memory tier, falls back to the store, records the access,
//! and promotes entries that are high priority or hotter than
//! [`HOT_FREQUENCY_THRESHOLD`] into the memory tier.

mod clock;
mod engine;
mod entry;
mod eviction;
mod locks;
mod memory;
mod policy;
mod stats;
mod tracker;
pub mod compression;
pub mod scheduler;
pub mod store;
pub mod warmer;

#[cfg(test)]
mod proptest;

pub use clock::{Clock, ManualClock, SystemClock};
pub use compression::{
    Compressed, CompressionConfig, CompressionManager, Compressor, Lz4Compressor, NoopCompressor,
};
pub use engine::CacheEngine;
pub use entry::{AccessUpdate, CacheEntry, EntryMetadata, Priority};
pub use eviction::{EvictionCandidate, EvictionPolicy, EvictionReport};
pub use memory::MemoryTier;
pub use policy::{CachePolicy, EvictionStrategy, PolicyUpdate, ScoringWeights};
pub use scheduler::{MaintenanceScheduler, MaintenanceTask, SchedulerConfig};
pub use stats::{CacheStats, StatsCollector};
pub use store::{
    CacheStore, FileCacheStore, InMemoryCacheStore, ScanPage, StoreStats, StoreSummary,
};
pub use tracker::AccessTracker;
pub use warmer::{
    CacheWarmer, ContentCatalog, ContentItem, StaticCatalog, WarmingConfig, WarmingConfigUpdate,
    WarmingReport, WarmingTarget,
};

/// Default number of entries held by the memory tier
pub const DEFAULT_MEMORY_TIER_CAPACITY: usize = 50;

/// Maximum number of access timestamps kept per key
pub const ACCESS_LOG_CAPACITY: usize = 100;

/// Trailing window used to compute the frequency score (hours)
pub const FREQUENCY_WINDOW_HOURS: i64 = 24;

/// Entries with a frequency above this are promoted to the memory tier
pub const HOT_FREQUENCY_THRESHOLD: u32 = 3;

/// Number of stripes in the per-key lock table (power of two)
pub const KEY_LOCK_STRIPES: usize = 64;

/// Page size used when scanning the persistent store
pub const DEFAULT_SCAN_PAGE_SIZE: usize = 256;

/// Key prefix for warmed placeholder entries
pub const WARM_KEY_PREFIX: &str = "warm:";

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_stripes_is_power_of_two() {
        // Power of 2 enables fast modulo via bitwise AND
        assert!(KEY_LOCK_STRIPES.is_power_of_two());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(DEFAULT_MEMORY_TIER_CAPACITY, 50);
        assert_eq!(ACCESS_LOG_CAPACITY, 100);
        assert_eq!(FREQUENCY_WINDOW_HOURS, 24);
    }
}
