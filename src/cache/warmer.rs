//! Cache Warming
//!
//! Schedule-gated prefetch of predicted-hot content as low-priority
//! placeholder entries.
//!
//! # Flow
//!
//! ```text
//! candidates ──► gate (enabled, hour in schedule)
//!            ──► filter (priority category or rating > 4)
//!            ──► sort by rating desc, take max_entries
//!            ──► batches of batch_size, pause between batches
//!                 └─ per item: skip if warm:<id> exists, else set placeholder
//! ```
//!
//! Cancellation is checked before every item and during the inter-batch
//! pause. Each placeholder is written with a single `set`, so a cancelled run
//! leaves only whole entries behind.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::entry::{CacheEntry, Priority};
use super::WARM_KEY_PREFIX;
use crate::error::Result;

/// Ratings strictly above this qualify an item regardless of category
pub const WARM_RATING_THRESHOLD: f64 = 4.0;

/// Estimated placeholder bytes per second of content (128 kbps audio)
pub const PLACEHOLDER_BYTES_PER_SECOND: u64 = 16 * 1024;

/// Smallest estimated placeholder size
pub const MIN_PLACEHOLDER_SIZE: u64 = 1024;

/// Entry type recorded on warmed placeholders
pub const WARM_ENTRY_TYPE: &str = "warm";

// =============================================================================
// Configuration
// =============================================================================

/// Warming configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmingConfig {
    pub enabled: bool,
    /// Hours of the day (0-23, UTC) during which warming runs
    pub schedule_hours: BTreeSet<u32>,
    /// Maximum items warmed per run
    pub max_warming_entries: usize,
    /// Items written between pauses
    pub warming_batch_size: usize,
    /// Categories that qualify regardless of rating
    pub priority_categories: BTreeSet<String>,
}

impl Default for WarmingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule_hours: [6, 7, 8, 18, 19, 20].into_iter().collect(),
            max_warming_entries: 100,
            warming_batch_size: 10,
            priority_categories: ["featured", "trending"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl WarmingConfig {
    /// Whether warming may run at `now`
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.schedule_hours.contains(&now.hour())
    }

    /// Merge a partial update. No range validation is performed.
    pub fn apply(&mut self, update: WarmingConfigUpdate) {
        if let Some(v) = update.enabled {
            self.enabled = v;
        }
        if let Some(v) = update.schedule_hours {
            self.schedule_hours = v;
        }
        if let Some(v) = update.max_warming_entries {
            self.max_warming_entries = v;
        }
        if let Some(v) = update.warming_batch_size {
            self.warming_batch_size = v;
        }
        if let Some(v) = update.priority_categories {
            self.priority_categories = v;
        }
    }
}

/// Partial warming configuration update; `None` fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmingConfigUpdate {
    pub enabled: Option<bool>,
    pub schedule_hours: Option<BTreeSet<u32>>,
    pub max_warming_entries: Option<usize>,
    pub warming_batch_size: Option<usize>,
    pub priority_categories: Option<BTreeSet<String>>,
}

// =============================================================================
// Content & Targets
// =============================================================================

/// Catalog item offered for warming
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub category: String,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: f64,
}

impl ContentItem {
    /// Create an item with no rating, tags or duration
    pub fn new(id: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            rating: None,
            tags: Vec::new(),
            duration: 0.0,
        }
    }

    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = seconds;
        self
    }

    /// Cache key of this item's placeholder
    pub fn warm_key(&self) -> String {
        format!("{}{}", WARM_KEY_PREFIX, self.id)
    }

    /// Estimated placeholder size from the duration
    pub fn estimated_size(&self) -> u64 {
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return MIN_PLACEHOLDER_SIZE;
        }
        let estimate = (self.duration * PLACEHOLDER_BYTES_PER_SECOND as f64).ceil();
        (estimate.min(u64::MAX as f64) as u64).max(MIN_PLACEHOLDER_SIZE)
    }
}

/// Where warmed placeholders are written
#[async_trait]
pub trait WarmingTarget: Send + Sync {
    /// Whether an entry already exists under `id`
    async fn contains(&self, id: &str) -> bool;

    /// Write an entry, returning whether it was stored
    async fn set(&self, entry: CacheEntry) -> bool;
}

/// Source of warming candidates for scheduled runs
#[async_trait]
pub trait ContentCatalog: Send + Sync {
    /// Items to consider on the next warming run
    async fn warming_candidates(&self) -> Result<Vec<ContentItem>>;
}

/// Fixed list of items
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    items: Vec<ContentItem>,
}

impl StaticCatalog {
    pub fn new(items: Vec<ContentItem>) -> Self {
        Self { items }
    }

    /// Load items from a JSON array file
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = tokio::fs::read(path).await?;
        let items: Vec<ContentItem> = serde_json::from_slice(&data)?;
        Ok(Self::new(items))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl ContentCatalog for StaticCatalog {
    async fn warming_candidates(&self) -> Result<Vec<ContentItem>> {
        Ok(self.items.clone())
    }
}

// =============================================================================
// Warmer
// =============================================================================

/// Outcome of one warming run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmingReport {
    /// Items left after filtering and truncation
    pub considered: usize,
    /// Placeholders written
    pub warmed: usize,
    /// Items whose placeholder already existed
    pub skipped: usize,
    /// Items whose write failed
    pub failed: usize,
    /// Run stopped early by cancellation
    pub cancelled: bool,
}

/// Schedule-gated placeholder writer
pub struct CacheWarmer {
    config: RwLock<WarmingConfig>,
    batch_pause: Duration,
}

impl CacheWarmer {
    /// Create a warmer with the default 100ms inter-batch pause
    pub fn new(config: WarmingConfig) -> Self {
        Self::with_batch_pause(config, Duration::from_millis(100))
    }

    /// Create a warmer with a custom inter-batch pause
    pub fn with_batch_pause(config: WarmingConfig, batch_pause: Duration) -> Self {
        Self {
            config: RwLock::new(config),
            batch_pause,
        }
    }

    /// Current configuration
    pub fn config(&self) -> WarmingConfig {
        self.config.read().clone()
    }

    /// Merge a partial configuration update
    pub fn update_config(&self, update: WarmingConfigUpdate) {
        self.config.write().apply(update);
    }

    /// Filter, order and truncate candidates
    pub fn plan(&self, items: &[ContentItem]) -> Vec<ContentItem> {
        let config = self.config.read();
        let mut selected: Vec<ContentItem> = items
            .iter()
            .filter(|item| {
                config.priority_categories.contains(&item.category)
                    || item.rating.is_some_and(|r| r > WARM_RATING_THRESHOLD)
            })
            .cloned()
            .collect();

        // Unrated items sort last
        selected.sort_by(|a, b| {
            let a = a.rating.unwrap_or(f64::NEG_INFINITY);
            let b = b.rating.unwrap_or(f64::NEG_INFINITY);
            b.total_cmp(&a)
        });
        selected.truncate(config.max_warming_entries);
        selected
    }

    /// Placeholder entry for an item
    pub fn placeholder(item: &ContentItem, now: DateTime<Utc>) -> CacheEntry {
        let mut entry = CacheEntry::placeholder(item.warm_key(), item.estimated_size(), now)
            .with_priority(Priority::Low)
            .with_type(WARM_ENTRY_TYPE);
        entry.metadata.is_preloaded = true;
        if !item.category.is_empty() {
            entry.metadata.tags.insert(item.category.clone());
        }
        entry.metadata.tags.extend(item.tags.iter().cloned());
        entry
    }

    /// Warm `items` into `target`
    ///
    /// A no-op (empty report) unless warming is enabled and the hour of
    /// `now` is scheduled.
    #[instrument(skip_all, fields(candidates = items.len()))]
    pub async fn warm(
        &self,
        target: &dyn WarmingTarget,
        items: &[ContentItem],
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> WarmingReport {
        let (active, batch_size) = {
            let config = self.config.read();
            (config.is_active_at(now), config.warming_batch_size.max(1))
        };
        if !active {
            debug!(hour = now.hour(), "Warming skipped outside schedule");
            return WarmingReport::default();
        }

        let plan = self.plan(items);
        let mut report = WarmingReport {
            considered: plan.len(),
            ..Default::default()
        };

        'batches: for (batch_no, batch) in plan.chunks(batch_size).enumerate() {
            if batch_no > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        report.cancelled = true;
                        break 'batches;
                    }
                    _ = tokio::time::sleep(self.batch_pause) => {}
                }
            }

            for item in batch {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    break 'batches;
                }

                let key = item.warm_key();
                if target.contains(&key).await {
                    report.skipped += 1;
                    continue;
                }

                if target.set(Self::placeholder(item, now)).await {
                    report.warmed += 1;
                } else {
                    warn!(id = %item.id, "Failed to warm item");
                    report.failed += 1;
                }
            }
        }

        info!(
            considered = report.considered,
            warmed = report.warmed,
            skipped = report.skipped,
            failed = report.failed,
            cancelled = report.cancelled,
            "Warming run finished"
        );
        report
    }
}

impl Default for CacheWarmer {
    fn default() -> Self {
        Self::new(WarmingConfig::default())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use dashmap::DashMap;
    use std::collections::HashSet;

    #[derive(Default)]
    struct RecordingTarget {
        entries: DashMap<String, CacheEntry>,
        failing: HashSet<String>,
    }

    #[async_trait]
    impl WarmingTarget for RecordingTarget {
        async fn contains(&self, id: &str) -> bool {
            self.entries.contains_key(id)
        }

        async fn set(&self, entry: CacheEntry) -> bool {
            if self.failing.contains(&entry.id) {
                return false;
            }
            self.entries.insert(entry.id.clone(), entry);
            true
        }
    }

    fn at_hour(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 2, hour, 30, 0).unwrap()
    }

    fn items() -> Vec<ContentItem> {
        vec![
            ContentItem::new("a", "featured").with_rating(3.0),
            ContentItem::new("b", "misc").with_rating(4.5),
            ContentItem::new("c", "misc").with_rating(4.0),
            ContentItem::new("d", "trending"),
            ContentItem::new("e", "misc").with_rating(4.9).with_tag("jazz"),
        ]
    }

    #[test]
    fn test_plan_filters_and_orders() {
        let warmer = CacheWarmer::default();
        let plan = warmer.plan(&items());
        let ids: Vec<&str> = plan.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["e", "b", "a", "d"]);
    }

    #[test]
    fn test_plan_truncates() {
        let warmer = CacheWarmer::new(WarmingConfig {
            max_warming_entries: 2,
            ..Default::default()
        });
        assert_eq!(warmer.plan(&items()).len(), 2);
    }

    #[test]
    fn test_placeholder_shape() {
        let item = ContentItem::new("42", "featured")
            .with_tag("jazz")
            .with_duration(10.0);
        let entry = CacheWarmer::placeholder(&item, at_hour(6));

        assert_eq!(entry.id, "warm:42");
        assert!(entry.payload.is_none());
        assert_eq!(entry.priority, Priority::Low);
        assert!(entry.metadata.is_preloaded);
        assert_eq!(entry.size(), 10 * PLACEHOLDER_BYTES_PER_SECOND);
        assert!(entry.metadata.tags.contains("featured"));
        assert!(entry.metadata.tags.contains("jazz"));
    }

    #[test]
    fn test_estimated_size_floor() {
        assert_eq!(ContentItem::new("x", "c").estimated_size(), MIN_PLACEHOLDER_SIZE);
        assert_eq!(
            ContentItem::new("x", "c").with_duration(f64::NAN).estimated_size(),
            MIN_PLACEHOLDER_SIZE
        );
    }

    #[tokio::test]
    async fn test_outside_schedule_warms_nothing() {
        let warmer = CacheWarmer::new(WarmingConfig {
            schedule_hours: [6, 7, 8].into_iter().collect(),
            ..Default::default()
        });
        let target = RecordingTarget::default();

        let report = warmer
            .warm(&target, &items(), at_hour(14), &CancellationToken::new())
            .await;
        assert_eq!(report, WarmingReport::default());
        assert!(target.entries.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_warms_nothing() {
        let warmer = CacheWarmer::new(WarmingConfig {
            enabled: false,
            ..Default::default()
        });
        let target = RecordingTarget::default();

        let report = warmer
            .warm(&target, &items(), at_hour(7), &CancellationToken::new())
            .await;
        assert_eq!(report.warmed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_warm_skips_existing_and_counts_failures() {
        let warmer = CacheWarmer::new(WarmingConfig {
            warming_batch_size: 2,
            ..Default::default()
        });
        let target = RecordingTarget {
            failing: ["warm:a".to_string()].into_iter().collect(),
            ..Default::default()
        };
        target.entries.insert(
            "warm:b".into(),
            CacheEntry::placeholder("warm:b", 1024, at_hour(7)),
        );

        let report = warmer
            .warm(&target, &items(), at_hour(7), &CancellationToken::new())
            .await;

        assert_eq!(report.considered, 4);
        assert_eq!(report.warmed, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 1);
        assert!(!report.cancelled);
        assert!(target.entries.contains_key("warm:e"));
        assert!(target.entries.contains_key("warm:d"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let warmer = CacheWarmer::default();
        let target = RecordingTarget::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = warmer.warm(&target, &items(), at_hour(7), &cancel).await;
        assert!(report.cancelled);
        assert_eq!(report.warmed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_between_batches() {
        let warmer = CacheWarmer::with_batch_pause(
            WarmingConfig {
                warming_batch_size: 1,
                ..Default::default()
            },
            Duration::from_secs(60),
        );
        let target = std::sync::Arc::new(RecordingTarget::default());
        let cancel = CancellationToken::new();

        let run = {
            let target = target.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                warmer
                    .warm(target.as_ref(), &items(), at_hour(7), &cancel)
                    .await
            })
        };

        // First batch is written immediately, then the warmer sleeps
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let report = run.await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.warmed, 1);
        assert_eq!(target.entries.len(), 1);
    }

    #[test]
    fn test_config_update() {
        let warmer = CacheWarmer::default();
        warmer.update_config(WarmingConfigUpdate {
            enabled: Some(false),
            warming_batch_size: Some(0),
            ..Default::default()
        });
        let config = warmer.config();
        assert!(!config.enabled);
        assert_eq!(config.warming_batch_size, 0);
        assert_eq!(config.max_warming_entries, 100);
    }
}
