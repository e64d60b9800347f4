//! Memory Tier - bounded in-process hot set
//!
//! Holds a small number of hot entries in front of the persistent store.
//!
//! # Design
//!
//! - Single `RwLock<HashMap>` so the capacity check and insert are atomic
//! - Admission only: entries qualify by priority or frequency when written,
//!   and leave only through delete, expiry or eviction
//! - A full tier refuses new keys; existing keys are always updatable

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::entry::{AccessUpdate, CacheEntry};
use super::{DEFAULT_MEMORY_TIER_CAPACITY, HOT_FREQUENCY_THRESHOLD};

/// Bounded hot-entry map
pub struct MemoryTier {
    entries: RwLock<HashMap<String, CacheEntry>>,
    capacity: AtomicUsize,
    size_bytes: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    rejections: AtomicU64,
}

impl MemoryTier {
    /// Create a memory tier with default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_TIER_CAPACITY)
    }

    /// Create a memory tier holding at most `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::with_capacity(capacity)),
            capacity: AtomicUsize::new(capacity),
            size_bytes: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }

    /// Whether an entry is eligible to live in the memory tier
    #[inline]
    pub fn qualifies(entry: &CacheEntry) -> bool {
        entry.priority.is_hot() || entry.frequency > HOT_FREQUENCY_THRESHOLD
    }

    /// Get a copy of an entry
    pub fn get(&self, id: &str) -> Option<CacheEntry> {
        let entry = self.entries.read().get(id).cloned();
        match &entry {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        entry
    }

    /// Insert or replace an entry
    ///
    /// Returns `false` if the key is new and the tier is full.
    pub fn insert(&self, entry: CacheEntry) -> bool {
        let mut entries = self.entries.write();
        let size = entry.size();

        if let Some(old) = entries.get_mut(&entry.id) {
            let old_size = old.size();
            *old = entry;
            self.adjust_size(old_size, size);
            return true;
        }

        if entries.len() >= self.capacity() {
            self.rejections.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        entries.insert(entry.id.clone(), entry);
        self.size_bytes.fetch_add(size, Ordering::Relaxed);
        true
    }

    /// Write access-tracking fields back into a resident entry
    pub fn apply_access(&self, id: &str, update: &AccessUpdate) -> bool {
        match self.entries.write().get_mut(id) {
            Some(entry) => {
                entry.apply_access(update);
                true
            }
            None => false,
        }
    }

    /// Remove an entry
    pub fn remove(&self, id: &str) -> Option<CacheEntry> {
        let removed = self.entries.write().remove(id);
        if let Some(entry) = &removed {
            self.size_bytes.fetch_sub(entry.size(), Ordering::Relaxed);
        }
        removed
    }

    /// Check if an entry is resident
    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Resident ids
    pub fn ids(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.write().clear();
        self.size_bytes.store(0, Ordering::Relaxed);
    }

    /// Change the capacity. Shrinking does not drop resident entries.
    pub fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity, Ordering::Relaxed);
    }

    /// Capacity in entries
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Whether the tier has reached capacity
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Number of resident entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the tier is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Bytes held by resident entries
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes.load(Ordering::Relaxed)
    }

    /// Get hit count
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get miss count
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Inserts refused because the tier was full
    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }

    fn adjust_size(&self, old_size: u64, new_size: u64) {
        if new_size > old_size {
            self.size_bytes
                .fetch_add(new_size - old_size, Ordering::Relaxed);
        } else {
            self.size_bytes
                .fetch_sub(old_size - new_size, Ordering::Relaxed);
        }
    }
}

impl Default for MemoryTier {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::Priority;
    use bytes::Bytes;
    use chrono::Utc;

    fn make_entry(id: &str, size: usize) -> CacheEntry {
        CacheEntry::new(id, Bytes::from(vec![0u8; size]))
    }

    #[test]
    fn test_memory_tier_creation() {
        let tier = MemoryTier::new();
        assert!(tier.is_empty());
        assert_eq!(tier.capacity(), 50);
        assert_eq!(tier.size_bytes(), 0);
    }

    #[test]
    fn test_insert_get() {
        let tier = MemoryTier::new();
        assert!(tier.insert(make_entry("a", 100)));

        let entry = tier.get("a").unwrap();
        assert_eq!(entry.size(), 100);
        assert_eq!(tier.hits(), 1);

        assert!(tier.get("missing").is_none());
        assert_eq!(tier.misses(), 1);
    }

    #[test]
    fn test_capacity_bound() {
        let tier = MemoryTier::with_capacity(2);
        assert!(tier.insert(make_entry("a", 10)));
        assert!(tier.insert(make_entry("b", 10)));
        assert!(!tier.insert(make_entry("c", 10)));

        assert_eq!(tier.len(), 2);
        assert_eq!(tier.rejections(), 1);
        assert!(!tier.contains("c"));
    }

    #[test]
    fn test_full_tier_still_updates_existing() {
        let tier = MemoryTier::with_capacity(1);
        assert!(tier.insert(make_entry("a", 10)));
        assert!(tier.insert(make_entry("a", 30)));
        assert_eq!(tier.size_bytes(), 30);
    }

    #[test]
    fn test_remove_tracks_size() {
        let tier = MemoryTier::new();
        tier.insert(make_entry("a", 100));
        tier.insert(make_entry("b", 50));
        assert_eq!(tier.size_bytes(), 150);

        assert!(tier.remove("a").is_some());
        assert_eq!(tier.size_bytes(), 50);
        assert!(tier.remove("a").is_none());
    }

    #[test]
    fn test_qualifies() {
        let hot = make_entry("a", 1).with_priority(Priority::High);
        let frequent = make_entry("b", 1).with_frequency(4);
        let cold = make_entry("c", 1).with_frequency(3);

        assert!(MemoryTier::qualifies(&hot));
        assert!(MemoryTier::qualifies(&frequent));
        assert!(!MemoryTier::qualifies(&cold));
    }

    #[test]
    fn test_apply_access() {
        let tier = MemoryTier::new();
        tier.insert(make_entry("a", 1));
        let update = AccessUpdate {
            last_accessed: Utc::now(),
            access_count: 7,
            frequency: 5,
        };
        assert!(tier.apply_access("a", &update));
        assert_eq!(tier.get("a").unwrap().access_count, 7);
        assert!(!tier.apply_access("missing", &update));
    }

    #[test]
    fn test_clear() {
        let tier = MemoryTier::new();
        for i in 0..10 {
            tier.insert(make_entry(&format!("k{}", i), 10));
        }
        tier.clear();
        assert!(tier.is_empty());
        assert_eq!(tier.size_bytes(), 0);
    }
}
