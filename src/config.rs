//! Engine Configuration
//!
//! Everything needed to build a [`CacheEngine`](crate::cache::CacheEngine)
//! and its scheduler, loadable from YAML. Every field has a default, so a
//! config file only needs the values it overrides:
//!
//! ```yaml
//! policy:
//!   max_entries: 5000
//!   eviction_strategy: lfu
//! warming:
//!   schedule_hours: [5, 6, 7]
//! io_timeout_secs: 2
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{CachePolicy, CompressionConfig, SchedulerConfig, WarmingConfig};
use crate::cache::DEFAULT_SCAN_PAGE_SIZE;
use crate::error::{Error, Result};

/// Default bound on a single store operation (seconds)
pub const DEFAULT_IO_TIMEOUT_SECS: u64 = 5;

/// Default pause between warming batches (milliseconds)
pub const DEFAULT_WARMING_BATCH_PAUSE_MS: u64 = 100;

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Limits, TTL, eviction strategy and memory tier capacity
    pub policy: CachePolicy,
    /// Warming schedule and selection
    pub warming: WarmingConfig,
    /// Background task periods
    pub scheduler: SchedulerConfig,
    /// Default codec settings
    pub compression: CompressionConfig,
    /// Bound on each store call
    pub io_timeout_secs: u64,
    /// Entries fetched per store scan page
    pub scan_page_size: usize,
    /// Pause between warming batches
    pub warming_batch_pause_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy: CachePolicy::default(),
            warming: WarmingConfig::default(),
            scheduler: SchedulerConfig::default(),
            compression: CompressionConfig::default(),
            io_timeout_secs: DEFAULT_IO_TIMEOUT_SECS,
            scan_page_size: DEFAULT_SCAN_PAGE_SIZE,
            warming_batch_pause_ms: DEFAULT_WARMING_BATCH_PAUSE_MS,
        }
    }
}

impl EngineConfig {
    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a YAML file
    pub async fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Reject values the engine cannot run with
    ///
    /// Only structural problems are rejected here. Limits themselves are
    /// taken as given, the same as runtime policy updates.
    pub fn validate(&self) -> Result<()> {
        if self.io_timeout_secs == 0 {
            return Err(Error::Config("io_timeout_secs must be > 0".into()));
        }
        if self.scan_page_size == 0 {
            return Err(Error::Config("scan_page_size must be > 0".into()));
        }
        if let Some(hour) = self.warming.schedule_hours.iter().find(|h| **h > 23) {
            return Err(Error::Config(format!(
                "schedule_hours entry {} is not an hour of the day",
                hour
            )));
        }
        Ok(())
    }

    /// Store call bound
    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }

    /// Pause between warming batches
    pub fn warming_batch_pause(&self) -> Duration {
        Duration::from_millis(self.warming_batch_pause_ms)
    }
}

// =============================================================================
// Tests
// =============================================================================
