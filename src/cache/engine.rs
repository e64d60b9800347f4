//! Cache Engine - Tiered Cache Façade
//!
//! Orchestrates the memory tier, the persistent store, access tracking,
//! compression, eviction and warming behind `get`/`set`/`delete`.
//!
//! # Failure model
//!
//! The request path never returns errors: store failures and timeouts are
//! logged and reported as a miss or `false`. Maintenance operations
//! (`enforce_policy`, `cleanup_expired`, `refresh_stats`) propagate errors so
//! the scheduler can log them per task.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::clock::{Clock, SystemClock};
use super::compression::{CompressionManager, Compressor};
use super::entry::{AccessUpdate, CacheEntry};
use super::eviction::{EvictionCandidate, EvictionPolicy, EvictionReport};
use super::locks::KeyLocks;
use super::memory::MemoryTier;
use super::policy::{CachePolicy, PolicyUpdate};
use super::stats::{CacheStats, StatsCollector};
use super::store::{CacheStore, InMemoryCacheStore};
use super::tracker::AccessTracker;
use super::warmer::{
    CacheWarmer, ContentItem, WarmingConfig, WarmingConfigUpdate, WarmingReport, WarmingTarget,
};
use super::FREQUENCY_WINDOW_HOURS;
use crate::config::EngineConfig;
use crate::error::{Error, Result};

/// Tiered cache engine
pub struct CacheEngine {
    /// Persistent store
    store: Arc<dyn CacheStore>,
    /// Hot entries
    memory: MemoryTier,
    /// Per-key access logs
    tracker: AccessTracker,
    /// Payload codec
    compression: CompressionManager,
    /// Placeholder prefetch
    warmer: CacheWarmer,
    /// Counters and store snapshot
    stats: StatsCollector,
    policy: RwLock<CachePolicy>,
    locks: KeyLocks,
    /// Held for the duration of one enforcement pass
    enforcement: tokio::sync::Mutex<()>,
    clock: Arc<dyn Clock>,
    io_timeout: Duration,
    scan_page_size: usize,
}

impl CacheEngine {
    /// Create an engine with default configuration
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_config(EngineConfig::default(), store)
    }

    /// Create an engine with custom configuration
    pub fn with_config(config: EngineConfig, store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            memory: MemoryTier::with_capacity(config.policy.memory_tier_capacity),
            tracker: AccessTracker::new(),
            compression: CompressionManager::with_config(config.compression.clone()),
            warmer: CacheWarmer::with_batch_pause(
                config.warming.clone(),
                config.warming_batch_pause(),
            ),
            stats: StatsCollector::new(),
            policy: RwLock::new(config.policy.clone()),
            locks: KeyLocks::new(),
            enforcement: tokio::sync::Mutex::new(()),
            clock: Arc::new(SystemClock),
            io_timeout: config.io_timeout(),
            scan_page_size: config.scan_page_size.max(1),
        }
    }

    /// Create with an in-memory store (for testing)
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCacheStore::new()))
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the payload codec
    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compression = CompressionManager::with_compressor(compressor);
        self
    }

    // =========================================================================
    // Request path
    // =========================================================================

    /// Get an entry, decompressed, with its access fields updated
    pub async fn get(&self, id: &str) -> Option<CacheEntry> {
        let started = Instant::now();
        let result = self.lookup(id).await;
        self.stats.record_access_time(started.elapsed());

        match &result {
            Some(_) => self.stats.record_hit(),
            None => self.stats.record_miss(),
        }
        result
    }

    async fn lookup(&self, id: &str) -> Option<CacheEntry> {
        let _guard = self.locks.lock(id).await;
        let now = self.clock.now();

        let (mut entry, resident) = match self.memory.get(id) {
            Some(entry) => (entry, true),
            None => match self.bounded("get", self.store.get(id)).await {
                Ok(Some(entry)) => (entry, false),
                Ok(None) => {
                    debug!(id, "Cache miss");
                    return None;
                }
                Err(e) => {
                    warn!(id, error = %e, "Store read failed, treating as miss");
                    return None;
                }
            },
        };

        if entry.is_expired(now) {
            debug!(id, "Entry expired on read");
            self.remove_locked(id).await;
            return None;
        }

        let frequency = self.tracker.record_access(id, now);
        let update = AccessUpdate::after_hit(&entry, now, frequency);
        entry.apply_access(&update);

        if resident {
            self.memory.apply_access(id, &update);
        }
        if let Err(e) = self
            .bounded("update_access", self.store.update_access(id, &update))
            .await
        {
            warn!(id, error = %e, "Failed to persist access update");
        }
        if !resident && MemoryTier::qualifies(&entry) && self.memory.insert(entry.clone()) {
            debug!(id, frequency, "Promoted entry to memory tier");
        }

        match self.decode(entry) {
            Ok(entry) => {
                debug!(id, resident, frequency, "Cache hit");
                Some(entry)
            }
            Err(e) => {
                warn!(id, error = %e, "Failed to decompress entry, removing");
                self.remove_locked(id).await;
                None
            }
        }
    }

    /// Replace a compressed payload with the original bytes
    fn decode(&self, mut entry: CacheEntry) -> Result<CacheEntry> {
        let original = match (&entry.metadata.codec, &entry.payload) {
            (Some(codec), Some(payload)) => Some(self.compression.decompress(payload, codec)?),
            _ => None,
        };
        if original.is_some() {
            entry.payload = original;
        }
        Ok(entry)
    }

    /// Insert or replace an entry, then enforce the policy
    ///
    /// Returns `false` if the store write failed.
    pub async fn set(&self, entry: CacheEntry) -> bool {
        let id = entry.id.clone();

        let stored = {
            let _guard = self.locks.lock(&id).await;
            let entry = self.prepare(entry);

            match self.bounded("set", self.store.set(entry.clone())).await {
                Ok(()) => {
                    if MemoryTier::qualifies(&entry) {
                        self.memory.insert(entry);
                    } else {
                        self.memory.remove(&id);
                    }
                    debug!(id = %id, "Stored entry");
                    true
                }
                Err(e) => {
                    warn!(id = %id, error = %e, "Store write failed");
                    false
                }
            }
        };

        if stored {
            if let Err(e) = self.enforce_policy().await {
                warn!(error = %e, "Policy enforcement after set failed");
            }
        }
        stored
    }

    /// Stamp timestamps, size, expiry and compression on an incoming entry
    fn prepare(&self, mut entry: CacheEntry) -> CacheEntry {
        let now = self.clock.now();
        let policy = self.policy();

        entry.created_at = now;
        entry.last_accessed = now;

        if !entry.is_compressed() {
            if let Some(payload) = &entry.payload {
                entry.metadata.size = payload.len() as u64;
            }
        }

        if let Some(ttl) = policy.ttl() {
            entry.expires_at = Some(entry.created_at + ttl);
        }

        if entry.size() > policy.compression_threshold && !entry.is_compressed() {
            self.compress(&mut entry);
        }
        entry
    }

    fn compress(&self, entry: &mut CacheEntry) {
        let Some(payload) = entry.payload.as_ref() else {
            return;
        };

        match self.compression.compress(payload) {
            Ok(Some(compressed)) => {
                let ratio = compressed.ratio();
                debug!(
                    id = %entry.id,
                    original = compressed.original_size,
                    compressed = compressed.data.len(),
                    ratio,
                    "Compressed payload"
                );
                entry.original_size = Some(compressed.original_size);
                entry.compression_ratio = Some(ratio);
                entry.metadata.size = compressed.data.len() as u64;
                entry.metadata.compression_level = compressed.level;
                entry.metadata.codec = Some(compressed.codec);
                entry.payload = Some(compressed.data);
            }
            Ok(None) => {
                warn!(id = %entry.id, codec = self.compression.codec(), "Compression did not shrink payload, storing raw");
            }
            Err(e) => {
                warn!(id = %entry.id, error = %e, "Compression failed, storing raw");
            }
        }
    }

    /// Delete an entry from every tier
    pub async fn delete(&self, id: &str) -> bool {
        let _guard = self.locks.lock(id).await;
        self.remove_locked(id).await
    }

    /// Remove from store, memory tier and tracker; caller holds the key lock
    async fn remove_locked(&self, id: &str) -> bool {
        let in_memory = self.memory.remove(id).is_some();
        self.tracker.forget(id);

        match self.bounded("delete", self.store.delete(id)).await {
            Ok(existed) => existed || in_memory,
            Err(e) => {
                warn!(id, error = %e, "Store delete failed");
                false
            }
        }
    }

    /// Remove every entry
    pub async fn clear(&self) -> bool {
        self.memory.clear();
        self.tracker.clear();

        match self.bounded("clear", self.store.clear()).await {
            Ok(()) => {
                info!("Cache cleared");
                true
            }
            Err(e) => {
                warn!(error = %e, "Store clear failed");
                false
            }
        }
    }

    /// Check if an entry exists in either tier
    pub async fn contains(&self, id: &str) -> bool {
        if self.memory.contains(id) {
            return true;
        }
        match self.bounded("contains", self.store.contains(id)).await {
            Ok(found) => found,
            Err(e) => {
                warn!(id, error = %e, "Store lookup failed");
                false
            }
        }
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Remove expired entries, then evict until the store is within limits
    ///
    /// The store is only scanned when the post-sweep summary is over a
    /// limit. Only one pass runs at a time; a call made while another pass
    /// is in progress returns an empty report.
    #[instrument(skip(self))]
    pub async fn enforce_policy(&self) -> Result<EvictionReport> {
        let Ok(_pass) = self.enforcement.try_lock() else {
            debug!("Enforcement already running, skipping");
            return Ok(EvictionReport::default());
        };

        let policy = self.policy();
        let now = self.clock.now();

        let before = self.bounded("summary", self.store.summary()).await?;
        let mut report = EvictionReport {
            entries_before: before.entries,
            size_before: before.total_size,
            ..Default::default()
        };

        report.expired_removed = self.sweep_expired(now).await?;

        let swept = if report.expired_removed > 0 {
            self.bounded("summary", self.store.summary()).await?
        } else {
            before
        };
        if !policy.is_over_limit(swept.total_size, swept.entries) {
            report.entries_after = swept.entries;
            report.size_after = swept.total_size;
            self.stats.update_store(swept);
            if report.removed_any() {
                info!(
                    expired = report.expired_removed,
                    entries = report.entries_after,
                    size = report.size_after,
                    "Policy enforced"
                );
            }
            return Ok(report);
        }

        let (candidates, total_size) = self.collect_candidates(now).await?;
        if policy.is_over_limit(total_size, candidates.len()) {
            let selected = EvictionPolicy::new(policy.clone()).select(candidates, total_size, now);
            debug!(
                strategy = %policy.eviction_strategy,
                selected = selected.len(),
                "Selected eviction candidates"
            );

            for candidate in selected {
                let _guard = self.locks.lock(&candidate.id).await;
                self.memory.remove(&candidate.id);
                self.tracker.forget(&candidate.id);

                match self.bounded("delete", self.store.delete(&candidate.id)).await {
                    Ok(true) => report.evicted += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(id = %candidate.id, error = %e, "Eviction failed, skipping");
                        report.failed += 1;
                    }
                }
            }
            self.stats.record_evictions(report.evicted as u64);
        }

        let after = self.bounded("summary", self.store.summary()).await?;
        report.entries_after = after.entries;
        report.size_after = after.total_size;
        self.stats.update_store(after);

        if report.removed_any() {
            info!(
                expired = report.expired_removed,
                evicted = report.evicted,
                failed = report.failed,
                entries = report.entries_after,
                size = report.size_after,
                "Policy enforced"
            );
        }
        Ok(report)
    }

    /// Ranking inputs for every live entry, plus the store's byte total
    async fn collect_candidates(&self, now: DateTime<Utc>) -> Result<(Vec<EvictionCandidate>, u64)> {
        let mut candidates = Vec::new();
        let mut total_size = 0u64;
        let mut cursor: Option<String> = None;

        loop {
            let page = self
                .bounded("scan", self.store.scan(cursor.as_deref(), self.scan_page_size))
                .await?;
            for entry in &page.entries {
                if entry.is_expired(now) {
                    continue;
                }
                total_size += entry.size();
                candidates.push(EvictionCandidate::from(entry));
            }
            match page.next {
                Some(next) => cursor = Some(next),
                None => return Ok((candidates, total_size)),
            }
        }
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let expired = self
            .bounded("ids_expired_before", self.store.ids_expired_before(now))
            .await?;

        let mut removed = 0;
        for id in expired {
            let _guard = self.locks.lock(&id).await;
            if self.remove_locked(&id).await {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "Removed expired entries");
        }
        Ok(removed)
    }

    /// Remove every entry whose expiry has passed
    #[instrument(skip(self))]
    pub async fn cleanup_expired(&self) -> Result<usize> {
        let removed = self.sweep_expired(self.clock.now()).await?;
        if removed > 0 {
            info!(removed, "Expired entries cleaned up");
        }
        Ok(removed)
    }

    /// Re-read store totals and return a fresh snapshot
    pub async fn refresh_stats(&self) -> Result<CacheStats> {
        let summary = self.bounded("summary", self.store.summary()).await?;
        self.stats.update_store(summary);
        Ok(self.stats())
    }

    /// Enforce the policy, clean up expired entries and refresh statistics
    #[instrument(skip(self))]
    pub async fn optimize(&self) -> CacheStats {
        if let Err(e) = self.enforce_policy().await {
            warn!(error = %e, "Enforcement during optimize failed");
        }
        if let Err(e) = self.cleanup_expired().await {
            warn!(error = %e, "Expiry cleanup during optimize failed");
        }
        match self.refresh_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "Stats refresh during optimize failed");
                self.stats()
            }
        }
    }

    /// Populate the memory tier from the store
    ///
    /// Walks entries by frequency, highest first, admitting those accessed
    /// within the frequency window or of critical/high priority until the
    /// tier is full.
    #[instrument(skip(self))]
    pub async fn load_memory_tier(&self) -> Result<usize> {
        let now = self.clock.now();
        let window = chrono::Duration::hours(FREQUENCY_WINDOW_HOURS);
        let ids = self
            .bounded(
                "ids_by_frequency_desc",
                self.store.ids_by_frequency_desc(usize::MAX),
            )
            .await?;

        let mut loaded = 0;
        for id in ids {
            if self.memory.is_full() {
                break;
            }
            let Some(entry) = self.bounded("get", self.store.get(&id)).await? else {
                continue;
            };
            if entry.is_expired(now) {
                continue;
            }
            if (entry.accessed_within(window, now) || entry.priority.is_hot())
                && self.memory.insert(entry)
            {
                loaded += 1;
            }
        }

        info!(loaded, capacity = self.memory.capacity(), "Memory tier loaded");
        Ok(loaded)
    }

    // =========================================================================
    // Warming
    // =========================================================================

    /// Warm placeholders for `items` if the schedule allows it now
    pub async fn warm_cache(&self, items: &[ContentItem]) -> WarmingReport {
        self.warm_cache_with_cancel(items, &CancellationToken::new())
            .await
    }

    /// Warm placeholders, stopping early once `cancel` fires
    pub async fn warm_cache_with_cancel(
        &self,
        items: &[ContentItem],
        cancel: &CancellationToken,
    ) -> WarmingReport {
        let report = self
            .warmer
            .warm(self, items, self.clock.now(), cancel)
            .await;
        self.stats.record_preloads(report.warmed as u64);
        report
    }

    // =========================================================================
    // Configuration & introspection
    // =========================================================================

    /// Merge a partial policy update
    pub fn update_policy(&self, update: PolicyUpdate) {
        let mut policy = self.policy.write();
        policy.apply(update);
        self.memory.set_capacity(policy.memory_tier_capacity);
        info!(
            max_size_bytes = policy.max_size_bytes,
            max_entries = policy.max_entries,
            strategy = %policy.eviction_strategy,
            "Cache policy updated"
        );
    }

    /// Merge a partial warming configuration update
    pub fn update_warming_config(&self, update: WarmingConfigUpdate) {
        self.warmer.update_config(update);
        info!("Warming configuration updated");
    }

    /// Current policy
    pub fn policy(&self) -> CachePolicy {
        self.policy.read().clone()
    }

    /// Current warming configuration
    pub fn warming_config(&self) -> WarmingConfig {
        self.warmer.config()
    }

    /// Statistics snapshot (store totals as of the last refresh)
    pub fn stats(&self) -> CacheStats {
        let policy = self.policy.read();
        self.stats.snapshot(&policy, self.memory.len())
    }

    /// Get reference to the memory tier
    pub fn memory_tier(&self) -> &MemoryTier {
        &self.memory
    }

    /// Get reference to the persistent store
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Get reference to the access tracker
    pub fn tracker(&self) -> &AccessTracker {
        &self.tracker
    }

    /// Bound a store call by the I/O timeout
    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.io_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation: operation.to_string(),
                timeout: self.io_timeout,
            }),
        }
    }
}

#[async_trait]
impl WarmingTarget for CacheEngine {
    async fn contains(&self, id: &str) -> bool {
        CacheEngine::contains(self, id).await
    }

    async fn set(&self, entry: CacheEntry) -> bool {
        CacheEngine::set(self, entry).await
    }
}

// =============================================================================
// Tests
// =============================================================================
