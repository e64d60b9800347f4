//! Maintenance Scheduler
//!
//! Independent periodic tasks driving the engine's background upkeep.
//!
//! # Tasks
//!
//! | Task            | Default period | Engine call            |
//! |-----------------|----------------|------------------------|
//! | expiry sweep    | 1 hour         | `cleanup_expired`      |
//! | stats refresh   | 5 minutes      | `refresh_stats`        |
//! | enforcement     | 10 minutes     | `enforce_policy`       |
//! | warming         | 1 hour         | `warm_cache_with_cancel` (only with a catalog) |
//!
//! Each run executes in its own spawned task so an error or panic is logged
//! and the loop carries on. Panic isolation relies on unwinding; a build
//! with `panic = "abort"` terminates the process instead. `shutdown` cancels
//! the shared token and waits for every loop to exit.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use super::engine::CacheEngine;
use super::warmer::ContentCatalog;
use crate::error::Result;

/// Scheduler periods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub expiry_sweep_interval_secs: u64,
    pub stats_refresh_interval_secs: u64,
    pub enforcement_interval_secs: u64,
    pub warming_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            expiry_sweep_interval_secs: 60 * 60,
            stats_refresh_interval_secs: 5 * 60,
            enforcement_interval_secs: 10 * 60,
            warming_interval_secs: 60 * 60,
        }
    }
}

impl SchedulerConfig {
    fn period(&self, task: MaintenanceTask) -> Duration {
        let secs = match task {
            MaintenanceTask::ExpirySweep => self.expiry_sweep_interval_secs,
            MaintenanceTask::StatsRefresh => self.stats_refresh_interval_secs,
            MaintenanceTask::Enforcement => self.enforcement_interval_secs,
            MaintenanceTask::Warming => self.warming_interval_secs,
        };
        Duration::from_secs(secs.max(1))
    }
}

/// Background task kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceTask {
    ExpirySweep,
    StatsRefresh,
    Enforcement,
    Warming,
}

impl MaintenanceTask {
    pub fn name(&self) -> &'static str {
        match self {
            MaintenanceTask::ExpirySweep => "expiry_sweep",
            MaintenanceTask::StatsRefresh => "stats_refresh",
            MaintenanceTask::Enforcement => "enforcement",
            MaintenanceTask::Warming => "warming",
        }
    }
}

impl std::fmt::Display for MaintenanceTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Handle to the running maintenance tasks
pub struct MaintenanceScheduler {
    cancel: CancellationToken,
    handles: Vec<(MaintenanceTask, JoinHandle<()>)>,
}

impl MaintenanceScheduler {
    /// Spawn the maintenance loops
    ///
    /// The warming loop is started only when a catalog is supplied. The first
    /// run of every task happens one period after start.
    pub fn start(
        engine: Arc<CacheEngine>,
        config: SchedulerConfig,
        catalog: Option<Arc<dyn ContentCatalog>>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let mut tasks = vec![
            MaintenanceTask::ExpirySweep,
            MaintenanceTask::StatsRefresh,
            MaintenanceTask::Enforcement,
        ];
        if catalog.is_some() {
            tasks.push(MaintenanceTask::Warming);
        }

        let handles = tasks
            .into_iter()
            .map(|task| {
                let handle = tokio::spawn(run_loop(
                    task,
                    config.period(task),
                    engine.clone(),
                    catalog.clone(),
                    cancel.clone(),
                ));
                (task, handle)
            })
            .collect::<Vec<_>>();

        info!(tasks = handles.len(), ?config, "Maintenance scheduler started");
        Self { cancel, handles }
    }

    /// Running task kinds
    pub fn tasks(&self) -> Vec<MaintenanceTask> {
        self.handles.iter().map(|(task, _)| *task).collect()
    }

    /// Token cancelled on shutdown
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel every task and wait for them to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();

        let (tasks, handles): (Vec<_>, Vec<_>) = self.handles.into_iter().unzip();
        let results = futures::future::join_all(handles).await;
        for (task, result) in tasks.into_iter().zip(results) {
            if let Err(e) = result {
                error!(%task, error = %e, "Maintenance loop did not exit cleanly");
            }
        }
        info!("Maintenance scheduler stopped");
    }
}

#[instrument(skip_all, fields(task = %task, ?period))]
async fn run_loop(
    task: MaintenanceTask,
    period: Duration,
    engine: Arc<CacheEngine>,
    catalog: Option<Arc<dyn ContentCatalog>>,
    cancel: CancellationToken,
) {
    let mut tick = interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {
                let run = tokio::spawn(run_once(
                    task,
                    engine.clone(),
                    catalog.clone(),
                    cancel.clone(),
                ));
                match run.await {
                    Ok(Ok(())) => debug!("Maintenance run finished"),
                    Ok(Err(e)) => error!(error = %e, "Maintenance run failed"),
                    Err(e) if e.is_panic() => error!("Maintenance run panicked"),
                    Err(e) => error!(error = %e, "Maintenance run aborted"),
                }
            }
        }
    }

    debug!("Maintenance loop exiting");
}

async fn run_once(
    task: MaintenanceTask,
    engine: Arc<CacheEngine>,
    catalog: Option<Arc<dyn ContentCatalog>>,
    cancel: CancellationToken,
) -> Result<()> {
    match task {
        MaintenanceTask::ExpirySweep => {
            engine.cleanup_expired().await?;
        }
        MaintenanceTask::StatsRefresh => {
            let stats = engine.refresh_stats().await?;
            debug!(
                entries = stats.total_entries,
                size = stats.total_size,
                hit_rate = stats.hit_rate,
                "Stats refreshed"
            );
        }
        MaintenanceTask::Enforcement => {
            engine.enforce_policy().await?;
        }
        MaintenanceTask::Warming => {
            if let Some(catalog) = catalog {
                let items = catalog.warming_candidates().await?;
                engine.warm_cache_with_cancel(&items, &cancel).await;
            }
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
