//! Persistent Store
//!
//! The lower tier of the cache: a key/value store of [`CacheEntry`] values
//! with secondary indexes over type, priority, tags, last access, frequency
//! and expiry.
//!
//! # Design
//!
//! - Pluggable backend behind the async [`CacheStore`] trait
//! - Full scans are paginated (`scan(after, limit)`, ordered by id)
//! - Every operation is fallible; the engine turns failures into misses

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::entry::{AccessUpdate, CacheEntry, Priority};
use super::DEFAULT_SCAN_PAGE_SIZE;
use crate::error::Result;

mod file;
mod index;
mod memory;

pub use file::FileCacheStore;
pub use memory::InMemoryCacheStore;

/// One page of a paginated scan
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    /// Entries in ascending id order
    pub entries: Vec<CacheEntry>,
    /// Cursor for the next page, `None` once the scan is complete
    pub next: Option<String>,
}

/// Entry count and byte total of a store
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StoreSummary {
    pub entries: usize,
    pub total_size: u64,
    /// Mean compression ratio over compressed entries (1.0 if none)
    pub compression_ratio: f64,
}

/// Store statistics
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// Total entries stored
    pub entries: u64,
    /// Total bytes stored
    pub total_bytes: u64,
    /// Read operations
    pub reads: u64,
    /// Write operations
    pub writes: u64,
    /// Delete operations
    pub deletes: u64,
}

/// Persistent store trait
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get an entry
    async fn get(&self, id: &str) -> Result<Option<CacheEntry>>;

    /// Insert or replace an entry
    async fn set(&self, entry: CacheEntry) -> Result<()>;

    /// Delete an entry, returning whether it existed
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Up to `limit` entries with ids strictly after `after`
    async fn scan(&self, after: Option<&str>, limit: usize) -> Result<ScanPage>;

    /// Remove every entry
    async fn clear(&self) -> Result<()>;

    /// Entry count, byte total and compression ratio
    async fn summary(&self) -> Result<StoreSummary>;

    /// Ids with `expires_at < now`
    async fn ids_expired_before(&self, now: DateTime<Utc>) -> Result<Vec<String>>;

    /// Ids with the given priority
    async fn ids_by_priority(&self, priority: Priority) -> Result<Vec<String>>;

    /// Ids carrying the given tag
    async fn ids_by_tag(&self, tag: &str) -> Result<Vec<String>>;

    /// Ids of the given asset type
    async fn ids_by_type(&self, entry_type: &str) -> Result<Vec<String>>;

    /// Up to `limit` ids, highest frequency first
    async fn ids_by_frequency_desc(&self, limit: usize) -> Result<Vec<String>>;

    /// Up to `limit` ids, least recently accessed first
    async fn ids_by_last_accessed(&self, limit: usize) -> Result<Vec<String>>;

    /// Get store statistics
    fn stats(&self) -> StoreStats;

    /// Write access-tracking fields back into a stored entry
    ///
    /// Returns `false` if the entry no longer exists.
    async fn update_access(&self, id: &str, update: &AccessUpdate) -> Result<bool> {
        match self.get(id).await? {
            Some(mut entry) => {
                entry.apply_access(update);
                self.set(entry).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Check if an entry exists
    async fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.get(id).await?.is_some())
    }

    /// Every entry, read page by page
    async fn get_all(&self) -> Result<Vec<CacheEntry>> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.scan(cursor.as_deref(), DEFAULT_SCAN_PAGE_SIZE).await?;
            all.extend(page.entries);
            match page.next {
                Some(next) => cursor = Some(next),
                None => return Ok(all),
            }
        }
    }
}

/// Operation counters shared by the backends
#[derive(Debug, Default)]
pub(crate) struct OpCounters {
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl OpCounters {
    pub fn read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, entries: usize, total_bytes: u64) -> StoreStats {
        StoreStats {
            entries: entries as u64,
            total_bytes,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }
}

/// Cursor for a page ending at `last_id`; `None` when nothing follows it
pub(crate) fn page_cursor(last_id: Option<&str>, has_more: bool) -> Option<String> {
    if has_more {
        last_id.map(str::to_string)
    } else {
        None
    }
}
