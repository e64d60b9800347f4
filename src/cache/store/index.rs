//! Secondary indexes shared by the store backends
//!
//! Every backend keeps one `EntryIndex` next to its primary map and updates
//! it under the same lock, so index scans never see a half-applied write.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use crate::cache::entry::{CacheEntry, Priority};

/// Indexed fields of one entry, kept so a removal can undo its insert
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct IndexedFields {
    size: u64,
    priority: Priority,
    entry_type: String,
    tags: BTreeSet<String>,
    last_accessed: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    frequency: u32,
    compression_ratio: Option<f64>,
}

impl From<&CacheEntry> for IndexedFields {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            size: entry.size(),
            priority: entry.priority,
            entry_type: entry.metadata.entry_type.clone(),
            tags: entry.metadata.tags.clone(),
            last_accessed: entry.last_accessed,
            expires_at: entry.expires_at,
            frequency: entry.frequency,
            compression_ratio: entry.compression_ratio,
        }
    }
}

/// Secondary indexes over a set of entries
#[derive(Debug, Default)]
pub(crate) struct EntryIndex {
    fields: HashMap<String, IndexedFields>,
    by_last_accessed: BTreeSet<(DateTime<Utc>, String)>,
    by_expiry: BTreeSet<(DateTime<Utc>, String)>,
    by_frequency: BTreeSet<(u32, String)>,
    by_priority: HashMap<Priority, BTreeSet<String>>,
    by_type: HashMap<String, BTreeSet<String>>,
    by_tag: HashMap<String, BTreeSet<String>>,
    total_size: u64,
    compressed: usize,
    ratio_sum: f64,
}

impl EntryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index an entry, replacing any previous version with the same id
    pub fn insert(&mut self, entry: &CacheEntry) {
        self.remove(&entry.id);

        let id = entry.id.clone();
        let fields = IndexedFields::from(entry);

        self.by_last_accessed
            .insert((fields.last_accessed, id.clone()));
        if let Some(at) = fields.expires_at {
            self.by_expiry.insert((at, id.clone()));
        }
        self.by_frequency.insert((fields.frequency, id.clone()));
        self.by_priority
            .entry(fields.priority)
            .or_default()
            .insert(id.clone());
        if !fields.entry_type.is_empty() {
            self.by_type
                .entry(fields.entry_type.clone())
                .or_default()
                .insert(id.clone());
        }
        for tag in &fields.tags {
            self.by_tag.entry(tag.clone()).or_default().insert(id.clone());
        }

        self.total_size += fields.size;
        if let Some(ratio) = fields.compression_ratio {
            self.compressed += 1;
            self.ratio_sum += ratio;
        }

        self.fields.insert(id, fields);
    }

    /// Drop an entry from every index
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(fields) = self.fields.remove(id) else {
            return false;
        };
        let id = id.to_string();

        self.by_last_accessed
            .remove(&(fields.last_accessed, id.clone()));
        if let Some(at) = fields.expires_at {
            self.by_expiry.remove(&(at, id.clone()));
        }
        self.by_frequency.remove(&(fields.frequency, id.clone()));
        remove_from_bucket(&mut self.by_priority, &fields.priority, &id);
        remove_from_bucket(&mut self.by_type, &fields.entry_type, &id);
        for tag in &fields.tags {
            remove_from_bucket(&mut self.by_tag, tag, &id);
        }

        self.total_size = self.total_size.saturating_sub(fields.size);
        if let Some(ratio) = fields.compression_ratio {
            self.compressed = self.compressed.saturating_sub(1);
            self.ratio_sum -= ratio;
            if self.compressed == 0 {
                self.ratio_sum = 0.0;
            }
        }
        true
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Mean ratio over compressed entries, 1.0 when none are compressed
    pub fn compression_ratio(&self) -> f64 {
        if self.compressed == 0 {
            1.0
        } else {
            self.ratio_sum / self.compressed as f64
        }
    }

    /// Ids whose expiry is strictly before `now`, soonest first
    pub fn expired_before(&self, now: DateTime<Utc>) -> Vec<String> {
        self.by_expiry
            .iter()
            .take_while(|(at, _)| *at < now)
            .map(|(_, id)| id.clone())
            .collect()
    }

    pub fn by_priority(&self, priority: Priority) -> Vec<String> {
        bucket_ids(&self.by_priority, &priority)
    }

    pub fn by_type(&self, entry_type: &str) -> Vec<String> {
        bucket_ids(&self.by_type, entry_type)
    }

    pub fn by_tag(&self, tag: &str) -> Vec<String> {
        bucket_ids(&self.by_tag, tag)
    }

    /// Highest frequency first
    pub fn by_frequency_desc(&self, limit: usize) -> Vec<String> {
        self.by_frequency
            .iter()
            .rev()
            .take(limit)
            .map(|(_, id)| id.clone())
            .collect()
    }

    /// Least recently accessed first
    pub fn by_last_accessed(&self, limit: usize) -> Vec<String> {
        self.by_last_accessed
            .iter()
            .take(limit)
            .map(|(_, id)| id.clone())
            .collect()
    }
}

fn bucket_ids<K, Q>(map: &HashMap<K, BTreeSet<String>>, key: &Q) -> Vec<String>
where
    K: std::borrow::Borrow<Q> + std::hash::Hash + Eq,
    Q: std::hash::Hash + Eq + ?Sized,
{
    map.get(key)
        .map(|ids| ids.iter().cloned().collect())
        .unwrap_or_default()
}

fn remove_from_bucket<K, Q>(map: &mut HashMap<K, BTreeSet<String>>, key: &Q, id: &str)
where
    K: std::borrow::Borrow<Q> + std::hash::Hash + Eq,
    Q: std::hash::Hash + Eq + ?Sized,
{
    let now_empty = match map.get_mut(key) {
        Some(ids) => {
            ids.remove(id);
            ids.is_empty()
        }
        None => false,
    };
    if now_empty {
        map.remove(key);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn entry(id: &str, frequency: u32) -> CacheEntry {
        CacheEntry::new_at(id, Bytes::from(vec![0u8; 10]), t0())
            .with_frequency(frequency)
            .with_type("audio")
            .with_tag("jazz")
    }

    #[test]
    fn test_insert_and_remove() {
        let mut index = EntryIndex::new();
        index.insert(&entry("a", 1));
        index.insert(&entry("b", 2));

        assert_eq!(index.len(), 2);
        assert_eq!(index.total_size(), 20);
        assert_eq!(index.by_type("audio"), vec!["a", "b"]);
        assert_eq!(index.by_tag("jazz").len(), 2);

        assert!(index.remove("a"));
        assert!(!index.remove("a"));
        assert_eq!(index.total_size(), 10);
        assert_eq!(index.by_tag("jazz"), vec!["b"]);
    }

    #[test]
    fn test_reinsert_replaces_old_fields() {
        let mut index = EntryIndex::new();
        index.insert(&entry("a", 1));
        index.insert(&entry("a", 9).with_priority(Priority::High));

        assert_eq!(index.len(), 1);
        assert_eq!(index.total_size(), 10);
        assert!(index.by_priority(Priority::Medium).is_empty());
        assert_eq!(index.by_priority(Priority::High), vec!["a"]);
        assert_eq!(index.by_frequency_desc(10), vec!["a"]);
    }

    #[test]
    fn test_frequency_and_recency_order() {
        let mut index = EntryIndex::new();
        let mut old = entry("old", 5);
        old.last_accessed = t0() - Duration::hours(3);
        index.insert(&old);
        index.insert(&entry("new", 1));
        index.insert(&entry("hot", 50));

        assert_eq!(index.by_frequency_desc(2), vec!["hot", "old"]);
        assert_eq!(index.by_last_accessed(1), vec!["old"]);
    }

    #[test]
    fn test_expired_before() {
        let mut index = EntryIndex::new();
        index.insert(&entry("soon", 0).with_expiry(t0() + Duration::seconds(1)));
        index.insert(&entry("later", 0).with_expiry(t0() + Duration::hours(1)));
        index.insert(&entry("never", 0));

        assert!(index.expired_before(t0()).is_empty());
        assert_eq!(index.expired_before(t0() + Duration::seconds(2)), vec!["soon"]);
    }

    #[test]
    fn test_compression_ratio_mean() {
        let mut index = EntryIndex::new();
        assert_eq!(index.compression_ratio(), 1.0);

        let mut a = entry("a", 0);
        a.compression_ratio = Some(2.0);
        let mut b = entry("b", 0);
        b.compression_ratio = Some(4.0);
        index.insert(&a);
        index.insert(&b);
        assert_eq!(index.compression_ratio(), 3.0);

        index.remove("a");
        index.remove("b");
        assert_eq!(index.compression_ratio(), 1.0);
    }
}
