//! Observability
//!
//! Prometheus exposition of [`CacheStats`](crate::cache::CacheStats) and
//! liveness/readiness probes for the binary's HTTP endpoint.
//!
//! ```text
//!   CacheEngine::refresh_stats ──▶ StatsExporter::update ──▶ GET /metrics
//!   CacheEngine (store probe)  ──▶ HealthCheck::check    ──▶ GET /healthz
//! ```

mod exporter;
mod health;

pub use exporter::{StatsExporter, METRIC_PREFIX};
pub use health::{
    HealthCheck, HealthCheckResult, HealthResponse, HealthStatus, DEGRADED_MEMORY_PRESSURE,
};
