//! Prometheus exposition of cache statistics
//!
//! Gauges live in a registry owned by the exporter so several engines (or
//! tests) can coexist in one process.

use prometheus::{Encoder, Gauge, IntGauge, Registry, TextEncoder};

use crate::cache::CacheStats;
use crate::error::{Error, Result};

/// Metric name prefix
pub const METRIC_PREFIX: &str = "mediacache";

/// Mirrors [`CacheStats`] into Prometheus gauges
pub struct StatsExporter {
    registry: Registry,
    total_size_bytes: IntGauge,
    entries: IntGauge,
    memory_tier_entries: IntGauge,
    hits: IntGauge,
    misses: IntGauge,
    evictions: IntGauge,
    preloads: IntGauge,
    hit_rate: Gauge,
    compression_ratio: Gauge,
    access_time_ms: Gauge,
    memory_pressure: Gauge,
}

impl StatsExporter {
    /// Create an exporter with every gauge registered
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let exporter = Self {
            total_size_bytes: int_gauge(&registry, "size_bytes", "Stored bytes")?,
            entries: int_gauge(&registry, "entries", "Stored entries")?,
            memory_tier_entries: int_gauge(
                &registry,
                "memory_tier_entries",
                "Entries resident in the memory tier",
            )?,
            hits: int_gauge(&registry, "hits", "Lookups served from the cache")?,
            misses: int_gauge(&registry, "misses", "Lookups that found nothing")?,
            evictions: int_gauge(&registry, "evictions", "Entries removed by eviction")?,
            preloads: int_gauge(&registry, "preloads", "Entries created by warming")?,
            hit_rate: gauge(&registry, "hit_rate", "Hits over all lookups")?,
            compression_ratio: gauge(
                &registry,
                "compression_ratio",
                "Mean original/stored ratio over compressed entries",
            )?,
            access_time_ms: gauge(
                &registry,
                "access_time_ms",
                "Moving average of lookup latency",
            )?,
            memory_pressure: gauge(
                &registry,
                "memory_pressure",
                "Stored bytes over the configured maximum",
            )?,
            registry,
        };

        Ok(exporter)
    }

    /// Copy a snapshot into the gauges
    pub fn update(&self, stats: &CacheStats) {
        self.total_size_bytes.set(clamp_i64(stats.total_size));
        self.entries.set(clamp_i64(stats.total_entries as u64));
        self.memory_tier_entries
            .set(clamp_i64(stats.memory_tier_entries as u64));
        self.hits.set(clamp_i64(stats.hits));
        self.misses.set(clamp_i64(stats.misses));
        self.evictions.set(clamp_i64(stats.eviction_count));
        self.preloads.set(clamp_i64(stats.preload_hits));
        self.hit_rate.set(stats.hit_rate);
        self.compression_ratio.set(stats.compression_ratio);
        self.access_time_ms.set(stats.average_access_time_ms);
        self.memory_pressure.set(stats.memory_pressure);
    }

    /// Render the registry in the text exposition format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| Error::Internal(format!("metrics encoding failed: {}", e)))?;
        String::from_utf8(buffer)
            .map_err(|e| Error::Internal(format!("metrics are not UTF-8: {}", e)))
    }

    /// Content type of [`render`](Self::render) output
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    /// Underlying registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

fn int_gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge> {
    let gauge = IntGauge::new(format!("{}_{}", METRIC_PREFIX, name), help)
        .map_err(|e| Error::Internal(format!("invalid metric {}: {}", name, e)))?;
    registry
        .register(Box::new(gauge.clone()))
        .map_err(|e| Error::Internal(format!("cannot register {}: {}", name, e)))?;
    Ok(gauge)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<Gauge> {
    let gauge = Gauge::new(format!("{}_{}", METRIC_PREFIX, name), help)
        .map_err(|e| Error::Internal(format!("invalid metric {}: {}", name, e)))?;
    registry
        .register(Box::new(gauge.clone()))
        .map_err(|e| Error::Internal(format!("cannot register {}: {}", name, e)))?;
    Ok(gauge)
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

// =============================================================================
// Tests
// =============================================================================
