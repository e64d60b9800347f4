//! Health Checks
//!
//! Liveness and readiness of a running cache. Readiness is derived from the
//! engine itself: the store must answer, and memory pressure must not be
//! pinned at the limit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::cache::CacheEngine;

/// Memory pressure at or above which the cache reports degraded
pub const DEGRADED_MEMORY_PRESSURE: f64 = 0.95;

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Service is healthy
    Healthy,
    /// Service is degraded but operational
    Degraded,
    /// Service is unhealthy
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy or degraded (operational)
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    fn severity(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 2,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "Healthy"),
            HealthStatus::Degraded => write!(f, "Degraded"),
            HealthStatus::Unhealthy => write!(f, "Unhealthy"),
        }
    }
}

/// Result of one named check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub duration_ms: u64,
}

impl HealthCheckResult {
    pub fn healthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            message: None,
            duration_ms: 0,
        }
    }

    pub fn degraded(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            duration_ms: 0,
        }
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            duration_ms: 0,
        }
    }

    /// Set duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Worst status among the checks
    pub status: HealthStatus,
    pub checks: Vec<HealthCheckResult>,
    pub version: String,
    pub uptime_seconds: u64,
}

impl HealthResponse {
    /// Create a new health response
    pub fn new(checks: Vec<HealthCheckResult>, uptime: Duration) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .max_by_key(HealthStatus::severity)
            .unwrap_or(HealthStatus::Healthy);

        Self {
            status,
            checks,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime.as_secs(),
        }
    }
}

/// Health state of the running binary
pub struct HealthCheck {
    start_time: Instant,
    ready: AtomicBool,
}

impl HealthCheck {
    /// Create a health tracker (not ready until startup completes)
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            ready: AtomicBool::new(false),
        }
    }

    /// Get uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Check readiness
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    /// Set readiness
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    /// Probe the engine
    ///
    /// Refreshes the store snapshot, so a failing or hung store surfaces
    /// here as `Unhealthy`.
    pub async fn check(&self, engine: &CacheEngine) -> HealthResponse {
        let mut checks = Vec::with_capacity(3);

        checks.push(if self.is_ready() {
            HealthCheckResult::healthy("startup")
        } else {
            HealthCheckResult::unhealthy("startup", "memory tier not loaded yet")
        });

        let started = Instant::now();
        match engine.refresh_stats().await {
            Ok(stats) => {
                checks.push(HealthCheckResult::healthy("store").with_duration(started.elapsed()));
                checks.push(if stats.memory_pressure >= DEGRADED_MEMORY_PRESSURE {
                    HealthCheckResult::degraded(
                        "memory_pressure",
                        format!("{:.2} of max size in use", stats.memory_pressure),
                    )
                } else {
                    HealthCheckResult::healthy("memory_pressure")
                });
            }
            Err(e) => {
                checks.push(
                    HealthCheckResult::unhealthy("store", e.to_string())
                        .with_duration(started.elapsed()),
                );
            }
        }

        HealthResponse::new(checks, self.uptime())
    }
}

impl Default for HealthCheck {
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
    use crate::cache::{CacheEntry, CachePolicy};
    use crate::cache::InMemoryCacheStore;
    use crate::config::EngineConfig;
    use bytes::Bytes;
    use std::sync::Arc;

    #[test]
    fn test_health_status() {
        assert!(HealthStatus::Healthy.is_operational());
        assert!(HealthStatus::Degraded.is_operational());
        assert!(!HealthStatus::Unhealthy.is_operational());
        assert_eq!(format!("{}", HealthStatus::Degraded), "Degraded");
    }

    #[test]
    fn test_response_takes_worst_status() {
        let checks = vec![
            HealthCheckResult::healthy("a"),
            HealthCheckResult::degraded("b", "slow"),
        ];

        let response = HealthResponse::new(checks, Duration::from_secs(60));
        assert_eq!(response.status, HealthStatus::Degraded);
        assert_eq!(response.uptime_seconds, 60);
    }

    #[tokio::test]
    async fn test_not_ready_before_startup() {
        let health = HealthCheck::new();
        let response = health.check(&CacheEngine::in_memory()).await;
        assert_eq!(response.status, HealthStatus::Unhealthy);

        health.set_ready(true);
        let response = health.check(&CacheEngine::in_memory()).await;
        assert_eq!(response.status, HealthStatus::Healthy);
        assert_eq!(response.checks.len(), 3);
    }

    #[tokio::test]
    async fn test_degraded_under_memory_pressure() {
        let config = EngineConfig {
            policy: CachePolicy {
                max_size_bytes: 100,
                ..Default::default()
            },
            ..Default::default()
        };
        let store = Arc::new(InMemoryCacheStore::new());
        let engine = CacheEngine::with_config(config, store.clone());
        crate::cache::CacheStore::set(
            store.as_ref(),
            CacheEntry::new("big", Bytes::from(vec![0u8; 100])),
        )
        .await
        .unwrap();

        let health = HealthCheck::new();
        health.set_ready(true);
        let response = health.check(&engine).await;
        assert_eq!(response.status, HealthStatus::Degraded);
    }

    #[test]
    fn test_serialization() {
        let result = HealthCheckResult::healthy("store");
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("Healthy"));
    }
}
