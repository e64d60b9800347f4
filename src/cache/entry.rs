//! Cache Entry Types
//!
//! The unit stored by every tier, plus the access-tracking update that is
//! written back on each hit.

use std::collections::BTreeSet;

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Entry priority, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// All priorities, highest first
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    /// Critical and high entries always qualify for the memory tier
    #[inline]
    pub fn is_hot(&self) -> bool {
        matches!(self, Priority::Critical | Priority::High)
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Descriptive metadata carried by every entry
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryMetadata {
    /// Stored size in bytes (compressed size once compression applied)
    pub size: u64,
    /// Codec level used for the payload (0 = uncompressed)
    pub compression_level: i32,
    /// Name of the codec that produced the payload, if compressed
    pub codec: Option<String>,
    /// Free-form tags (category, genre, ...)
    pub tags: BTreeSet<String>,
    /// Entry was created by the warmer rather than by demand
    pub is_preloaded: bool,
    /// Asset type (`audio`, `image`, `warm`, ...), indexed by the store
    pub entry_type: String,
}

/// Cache entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Unique key
    pub id: String,
    /// Payload bytes; absent for warmed placeholders
    #[serde(default)]
    pub payload: Option<Bytes>,
    /// Entry metadata
    pub metadata: EntryMetadata,
    /// Eviction priority
    pub priority: Priority,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last access time
    pub last_accessed: DateTime<Utc>,
    /// Expiry time, if a TTL applies
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Total number of recorded accesses
    #[serde(default)]
    pub access_count: u64,
    /// Accesses within the trailing frequency window
    #[serde(default)]
    pub frequency: u32,
    /// Size before compression, if compressed
    #[serde(default)]
    pub original_size: Option<u64>,
    /// `original_size / size`, if compressed
    #[serde(default)]
    pub compression_ratio: Option<f64>,
}

impl CacheEntry {
    /// Create an entry stamped with the current wall-clock time
    pub fn new(id: impl Into<String>, payload: Bytes) -> Self {
        Self::new_at(id, payload, Utc::now())
    }

    /// Create an entry created at `now`
    pub fn new_at(id: impl Into<String>, payload: Bytes, now: DateTime<Utc>) -> Self {
        let size = payload.len() as u64;
        Self {
            id: id.into(),
            payload: Some(payload),
            metadata: EntryMetadata {
                size,
                ..Default::default()
            },
            priority: Priority::default(),
            created_at: now,
            last_accessed: now,
            expires_at: None,
            access_count: 0,
            frequency: 0,
            original_size: None,
            compression_ratio: None,
        }
    }

    /// Create a payload-less placeholder with an estimated size
    pub fn placeholder(id: impl Into<String>, estimated_size: u64, now: DateTime<Utc>) -> Self {
        let mut entry = Self::new_at(id, Bytes::new(), now);
        entry.payload = None;
        entry.metadata.size = estimated_size;
        entry
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.metadata.tags.insert(tag.into());
        self
    }

    /// Set the asset type
    pub fn with_type(mut self, entry_type: impl Into<String>) -> Self {
        self.metadata.entry_type = entry_type.into();
        self
    }

    /// Set the frequency score
    pub fn with_frequency(mut self, frequency: u32) -> Self {
        self.frequency = frequency;
        self
    }

    /// Set an explicit expiry
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Stored size in bytes
    #[inline]
    pub fn size(&self) -> u64 {
        self.metadata.size
    }

    /// Whether the payload is stored compressed
    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.metadata.codec.is_some()
    }

    /// Check if the entry has expired at `now`
    #[inline]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }

    /// Whether the entry was accessed within `window` of `now`
    pub fn accessed_within(&self, window: Duration, now: DateTime<Utc>) -> bool {
        now - self.last_accessed <= window
    }

    /// Apply an access-tracking update
    pub fn apply_access(&mut self, update: &AccessUpdate) {
        self.last_accessed = update.last_accessed;
        self.access_count = update.access_count;
        self.frequency = update.frequency;
    }
}

/// Access-tracking fields written back after a hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccessUpdate {
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    pub frequency: u32,
}

impl AccessUpdate {
    /// Build the update that follows `entry` being read at `now`
    pub fn after_hit(entry: &CacheEntry, now: DateTime<Utc>, frequency: u32) -> Self {
        Self {
            last_accessed: now,
            access_count: entry.access_count.saturating_add(1),
            frequency,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
