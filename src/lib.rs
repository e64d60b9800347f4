//! mediacache - Tiered Media Cache Engine
//!
//! A cache for media metadata and small payloads: a bounded in-memory hot
//! tier in front of a persistent store, with policy-driven eviction,
//! transparent LZ4 compression and schedule-gated cache warming.
//!
//! # Architecture
//!
//! ```text
//! get/set/delete ──▶ CacheEngine ──▶ MemoryTier ──▶ CacheStore
//!                        │                         (memory or files)
//!                        ├── AccessTracker (24h frequency)
//!                        ├── EvictionPolicy (lru/lfu/fifo/intelligent)
//!                        └── CacheWarmer ◀── ContentCatalog
//!
//! MaintenanceScheduler: expiry sweep · stats refresh · enforcement · warming
//! ```
//!
//! # Modules
//!
//! - [`cache`] - Engine, tiers, stores, eviction and warming
//! - [`config`] - YAML-loadable engine configuration
//! - [`error`] - Error types
//! - [`monitoring`] - Prometheus exporter and health checks
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use mediacache::cache::{CacheEngine, CacheEntry};
//!
//! # tokio_test::block_on(async {
//! let engine = CacheEngine::in_memory();
//! assert!(engine.set(CacheEntry::new("poster:42", Bytes::from_static(b"jpeg"))).await);
//!
//! let entry = engine.get("poster:42").await.unwrap();
//! assert_eq!(entry.payload.as_deref(), Some(&b"jpeg"[..]));
//! # });
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod monitoring;

// Re-export commonly used types
pub use cache::{
    CacheEngine, CacheEntry, CachePolicy, CacheStats, CacheStore, EvictionStrategy,
    MaintenanceScheduler, Priority,
};
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use monitoring::StatsExporter;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
