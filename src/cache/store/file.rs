//! File-backed store
//!
//! One JSON document per entry under a directory, with the secondary
//! indexes held in memory and rebuilt on open.
//!
//! # Layout
//!
//! ```text
//! <dir>/
//!   <url-encoded id>.json        committed entry
//!   <url-encoded id>.<n>.tmp     in-flight write, renamed into place
//! ```
//!
//! Encoded ids longer than [`MAX_STEM_LEN`] bytes are shortened to a prefix
//! plus a hash of the full id, keeping names under filesystem limits. The
//! document body always carries the real id.
//!
//! A write is visible only once its rename has completed, so a crash leaves
//! either the old or the new document, never a torn one.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::index::EntryIndex;
use super::{page_cursor, CacheStore, OpCounters, ScanPage, StoreStats, StoreSummary};
use crate::cache::entry::{CacheEntry, Priority};
use crate::cache::locks::fx_hash;
use crate::error::{Error, Result};

const ENTRY_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

/// Longest file stem written, in bytes
pub const MAX_STEM_LEN: usize = 160;
/// Encoded-id bytes kept in front of the hash of a shortened stem
const STEM_PREFIX_LEN: usize = MAX_STEM_LEN - 17;

#[derive(Default)]
struct Inner {
    ids: BTreeSet<String>,
    index: EntryIndex,
}

/// Directory-backed persistent store
pub struct FileCacheStore {
    dir: PathBuf,
    inner: RwLock<Inner>,
    ops: OpCounters,
    temp_seq: AtomicU64,
}

impl FileCacheStore {
    /// Open (or create) a store rooted at `dir`, indexing existing entries
    ///
    /// Undecodable documents are logged and skipped; leftover temp files
    /// from interrupted writes are removed.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let mut inner = Inner::default();
        let mut skipped = 0usize;
        let mut read_dir = tokio::fs::read_dir(&dir).await?;

        while let Some(dirent) = read_dir.next_entry().await? {
            let path = dirent.path();
            match path.extension().and_then(|ext| ext.to_str()) {
                Some(ENTRY_EXTENSION) => match read_entry(&path).await {
                    Ok(entry) => {
                        inner.index.insert(&entry);
                        inner.ids.insert(entry.id);
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping unreadable cache entry");
                        skipped += 1;
                    }
                },
                Some(TEMP_EXTENSION) => {
                    if let Err(e) = tokio::fs::remove_file(&path).await {
                        warn!(path = %path.display(), error = %e, "Failed to remove stale temp file");
                    }
                }
                _ => {}
            }
        }

        info!(
            dir = %dir.display(),
            entries = inner.ids.len(),
            total_size = inner.index.total_size(),
            skipped,
            "Opened file cache store"
        );

        Ok(Self {
            dir,
            inner: RwLock::new(inner),
            ops: OpCounters::default(),
            temp_seq: AtomicU64::new(0),
        })
    }

    /// Root directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", file_stem(id), ENTRY_EXTENSION))
    }

    fn temp_path(&self, id: &str) -> PathBuf {
        let seq = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        self.dir
            .join(format!("{}.{}.{}", file_stem(id), seq, TEMP_EXTENSION))
    }

    fn is_indexed(&self, id: &str) -> bool {
        self.inner.read().ids.contains(id)
    }

    async fn remove_file(&self, id: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.entry_path(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// File name (without extension) for an id
fn file_stem(id: &str) -> String {
    let encoded = urlencoding::encode(id);
    if encoded.len() <= MAX_STEM_LEN {
        return encoded.into_owned();
    }
    // Percent-encoding is ASCII, so any byte offset is a char boundary
    format!(
        "{}~{:016x}",
        &encoded[..STEM_PREFIX_LEN],
        fx_hash(id.as_bytes())
    )
}

async fn read_entry(path: &Path) -> Result<CacheEntry> {
    let data = tokio::fs::read(path).await?;
    serde_json::from_slice(&data).map_err(|e| Error::CorruptEntry {
        id: path.display().to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn get(&self, id: &str) -> Result<Option<CacheEntry>> {
        self.ops.read();
        if !self.is_indexed(id) {
            return Ok(None);
        }
        match read_entry(&self.entry_path(id)).await {
            Ok(entry) => Ok(Some(entry)),
            Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set(&self, entry: CacheEntry) -> Result<()> {
        self.ops.write();
        let data = serde_json::to_vec(&entry)?;
        let temp = self.temp_path(&entry.id);

        tokio::fs::write(&temp, &data).await?;
        if let Err(e) = tokio::fs::rename(&temp, self.entry_path(&entry.id)).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(Error::store("set", e));
        }

        debug!(id = %entry.id, bytes = data.len(), "Wrote cache entry");
        let mut inner = self.inner.write();
        inner.index.insert(&entry);
        inner.ids.insert(entry.id);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.ops.delete();
        let removed = self.remove_file(id).await?;

        let mut inner = self.inner.write();
        inner.index.remove(id);
        Ok(inner.ids.remove(id) || removed)
    }

    async fn scan(&self, after: Option<&str>, limit: usize) -> Result<ScanPage> {
        self.ops.read();
        let (ids, has_more) = {
            let inner = self.inner.read();
            let lower = match after {
                Some(id) => Bound::Excluded(id),
                None => Bound::Unbounded,
            };
            let mut range = inner.ids.range::<str, _>((lower, Bound::Unbounded));
            let ids: Vec<String> = range.by_ref().take(limit.max(1)).cloned().collect();
            (ids, range.next().is_some())
        };

        let mut entries = Vec::with_capacity(ids.len());
        for id in &ids {
            match read_entry(&self.entry_path(id)).await {
                Ok(entry) => entries.push(entry),
                // Deleted after the id snapshot was taken
                Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        let next = page_cursor(ids.last().map(String::as_str), has_more);
        Ok(ScanPage { entries, next })
    }

    async fn clear(&self) -> Result<()> {
        let ids: Vec<String> = self.inner.read().ids.iter().cloned().collect();
        for id in &ids {
            self.remove_file(id).await?;
        }

        let mut inner = self.inner.write();
        inner.ids.clear();
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

    async fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.is_indexed(id))
    }
}

// =============================================================================
// Tests
// =============================================================================
