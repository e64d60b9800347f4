//! In-memory store backend
//!
//! Default backend and the one used by tests. A single `RwLock` guards the
//! primary map and its indexes together.

use std::collections::BTreeMap;
use std::ops::Bound;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::index::EntryIndex;
use super::{page_cursor, CacheStore, OpCounters, ScanPage, StoreStats, StoreSummary};
use crate::cache::entry::{AccessUpdate, CacheEntry, Priority};
use crate::error::Result;

#[derive(Default)]
struct Inner {
    entries: BTreeMap<String, CacheEntry>,
    index: EntryIndex,
}

/// In-memory store
#[derive(Default)]
pub struct InMemoryCacheStore {
    inner: RwLock<Inner>,
    ops: OpCounters,
}

impl InMemoryCacheStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, id: &str) -> Result<Option<CacheEntry>> {
        self.ops.read();
        Ok(self.inner.read().entries.get(id).cloned())
    }

    async fn set(&self, entry: CacheEntry) -> Result<()> {
        self.ops.write();
        let mut inner = self.inner.write();
        inner.index.insert(&entry);
        inner.entries.insert(entry.id.clone(), entry);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.ops.delete();
        let mut inner = self.inner.write();
        inner.index.remove(id);
        Ok(inner.entries.remove(id).is_some())
    }

    async fn scan(&self, after: Option<&str>, limit: usize) -> Result<ScanPage> {
        self.ops.read();
        let inner = self.inner.read();
        let lower = match after {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };

        let mut range = inner
            .entries
            .range::<str, _>((lower, Bound::Unbounded))
            .map(|(_, entry)| entry);
        let entries: Vec<CacheEntry> = range.by_ref().take(limit.max(1)).cloned().collect();
        let has_more = range.next().is_some();
        let next = page_cursor(entries.last().map(|e| e.id.as_str()), has_more);

        Ok(ScanPage { entries, next })
    }

    async fn clear(&self) -> Result<()> {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.index.clear();
        Ok(())
    }

    async fn summary(&self) -> Result<StoreSummary> {
        let inner = self.inner.read();
        Ok(StoreSummary {
            entries: inner.index.len(),
            total_size: inner.index.total_size(),
            compression_ratio: inner.index.compression_ratio(),
        })
    }

    async fn ids_expired_before(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        Ok(self.inner.read().index.expired_before(now))
    }

    async fn ids_by_priority(&self, priority: Priority) -> Result<Vec<String>> {
        Ok(self.inner.read().index.by_priority(priority))
    }

    async fn ids_by_tag(&self, tag: &str) -> Result<Vec<String>> {
        Ok(self.inner.read().index.by_tag(tag))
    }

    async fn ids_by_type(&self, entry_type: &str) -> Result<Vec<String>> {
        Ok(self.inner.read().index.by_type(entry_type))
    }

    async fn ids_by_frequency_desc(&self, limit: usize) -> Result<Vec<String>> {
        Ok(self.inner.read().index.by_frequency_desc(limit))
    }

    async fn ids_by_last_accessed(&self, limit: usize) -> Result<Vec<String>> {
        Ok(self.inner.read().index.by_last_accessed(limit))
    }

    fn stats(&self) -> StoreStats {
        let inner = self.inner.read();
        self.ops
            .snapshot(inner.index.len(), inner.index.total_size())
    }

    async fn update_access(&self, id: &str, update: &AccessUpdate) -> Result<bool> {
        self.ops.write();
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        match inner.entries.get_mut(id) {
            Some(entry) => {
                entry.apply_access(update);
                inner.index.insert(entry);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Duration;

    fn make_entry(id: &str, size: usize) -> CacheEntry {
        CacheEntry::new(id, Bytes::from(vec![1u8; size]))
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = InMemoryCacheStore::new();
        store.set(make_entry("a", 10)).await.unwrap();

        let entry = store.get("a").await.unwrap().unwrap();
        assert_eq!(entry.size(), 10);
        assert!(store.contains("a").await.unwrap());

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_summary_tracks_replacements() {
        let store = InMemoryCacheStore::new();
        store.set(make_entry("a", 10)).await.unwrap();
        store.set(make_entry("b", 20)).await.unwrap();
        store.set(make_entry("a", 5)).await.unwrap();

        let summary = store.summary().await.unwrap();
        assert_eq!(summary.entries, 2);
        assert_eq!(summary.total_size, 25);
        assert_eq!(summary.compression_ratio, 1.0);
    }

    #[tokio::test]
    async fn test_scan_pages_in_id_order() {
        let store = InMemoryCacheStore::new();
        for i in 0..5 {
            store.set(make_entry(&format!("k{}", i), 1)).await.unwrap();
        }

        let first = store.scan(None, 2).await.unwrap();
        assert_eq!(first.entries.len(), 2);
        assert_eq!(first.next.as_deref(), Some("k1"));

        let second = store.scan(first.next.as_deref(), 2).await.unwrap();
        assert_eq!(second.entries[0].id, "k2");

        let last = store.scan(Some("k3"), 2).await.unwrap();
        assert_eq!(last.entries.len(), 1);
        assert!(last.next.is_none());

        assert_eq!(store.get_all().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_update_access_reindexes() {
        let store = InMemoryCacheStore::new();
        store.set(make_entry("a", 1)).await.unwrap();
        store.set(make_entry("b", 1).with_frequency(2)).await.unwrap();

        let update = AccessUpdate {
            last_accessed: Utc::now() + Duration::seconds(5),
            access_count: 3,
            frequency: 9,
        };
        assert!(store.update_access("a", &update).await.unwrap());
        assert!(!store.update_access("missing", &update).await.unwrap());

        assert_eq!(store.ids_by_frequency_desc(1).await.unwrap(), vec!["a"]);
        assert_eq!(store.get("a").await.unwrap().unwrap().access_count, 3);
    }

    #[tokio::test]
    async fn test_secondary_queries() {
        let store = InMemoryCacheStore::new();
        let now = Utc::now();
        store
            .set(make_entry("a", 1).with_type("audio").with_tag("rock"))
            .await
            .unwrap();
        store
            .set(
                make_entry("b", 1)
                    .with_priority(Priority::Critical)
                    .with_expiry(now - Duration::seconds(1)),
            )
            .await
            .unwrap();

        assert_eq!(store.ids_by_type("audio").await.unwrap(), vec!["a"]);
        assert_eq!(store.ids_by_tag("rock").await.unwrap(), vec!["a"]);
        assert_eq!(
            store.ids_by_priority(Priority::Critical).await.unwrap(),
            vec!["b"]
        );
        assert_eq!(store.ids_expired_before(now).await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_clear_and_stats() {
        let store = InMemoryCacheStore::new();
        store.set(make_entry("a", 10)).await.unwrap();
        store.get("a").await.unwrap();
        store.delete("missing").await.unwrap();

        let stats = store.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.total_bytes, 10);
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.reads, 1);
        assert_eq!(stats.deletes, 1);

        store.clear().await.unwrap();
        assert!(store.is_empty());
        assert_eq!(store.summary().await.unwrap().total_size, 0);
    }
}
