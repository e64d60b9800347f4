//! mediacache daemon
//!
//! Runs a cache engine with its maintenance scheduler and serves metrics and
//! health over HTTP.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         mediacache                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │  Scheduler   │───▶│ CacheEngine  │◀───│ HTTP server  │       │
//! │  │ (sweep/stats │    │ (memory tier │    │ /metrics     │       │
//! │  │  evict/warm) │    │  + store)    │    │ /healthz     │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mediacache::cache::{
    CacheEngine, CacheStore, ContentCatalog, FileCacheStore, InMemoryCacheStore,
    MaintenanceScheduler, StaticCatalog,
};
use mediacache::monitoring::{HealthCheck, StatsExporter};
use mediacache::EngineConfig;

// =============================================================================
// CLI Arguments
// =============================================================================

/// mediacache - tiered media cache with scheduled eviction and warming
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "MEDIACACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for the file-backed store (in-memory store when absent)
    #[arg(long, env = "MEDIACACHE_STORE_DIR")]
    store_dir: Option<PathBuf>,

    /// JSON file of content items used for scheduled warming
    #[arg(long, env = "MEDIACACHE_CATALOG")]
    catalog: Option<PathBuf>,

    /// Metrics and health server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:9090")]
    metrics_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Override the maximum stored bytes
    #[arg(long, env = "MEDIACACHE_MAX_SIZE_BYTES")]
    max_size_bytes: Option<u64>,

    /// Override the maximum number of entries
    #[arg(long, env = "MEDIACACHE_MAX_ENTRIES")]
    max_entries: Option<usize>,
}

/// State shared with HTTP handlers
struct AppState {
    engine: Arc<CacheEngine>,
    exporter: StatsExporter,
    health: HealthCheck,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = load_config(&args).await?;
    info!("Starting mediacache {}", mediacache::VERSION);
    info!(
        "  Limits: {} bytes, {} entries",
        config.policy.max_size_bytes, config.policy.max_entries
    );
    info!("  Eviction strategy: {}", config.policy.eviction_strategy);
    info!("  Memory tier capacity: {}", config.policy.memory_tier_capacity);

    let store: Arc<dyn CacheStore> = match &args.store_dir {
        Some(dir) => {
            let store = FileCacheStore::open(dir)
                .await
                .with_context(|| format!("opening store at {}", dir.display()))?;
            info!("  Store: files under {}", dir.display());
            Arc::new(store)
        }
        None => {
            info!("  Store: in-memory");
            Arc::new(InMemoryCacheStore::new())
        }
    };

    let catalog: Option<Arc<dyn ContentCatalog>> = match &args.catalog {
        Some(path) => {
            let catalog = StaticCatalog::from_json_file(path)
                .await
                .with_context(|| format!("loading catalog {}", path.display()))?;
            info!("  Warming catalog: {} items", catalog.len());
            Some(Arc::new(catalog) as Arc<dyn ContentCatalog>)
        }
        None => None,
    };

    let engine = Arc::new(CacheEngine::with_config(config.clone(), store));

    let state = Arc::new(AppState {
        engine: engine.clone(),
        exporter: StatsExporter::new().context("registering metrics")?,
        health: HealthCheck::new(),
    });

    // Serve probes while the memory tier loads
    let shutdown = CancellationToken::new();
    let addr: SocketAddr = args
        .metrics_addr
        .parse()
        .with_context(|| format!("invalid metrics address {}", args.metrics_addr))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("HTTP server listening on {}", addr);
    let server = tokio::spawn(run_http_server(listener, state.clone(), shutdown.clone()));

    match engine.load_memory_tier().await {
        Ok(loaded) => info!(loaded, "Memory tier populated"),
        Err(e) => warn!(error = %e, "Memory tier population failed, starting cold"),
    }
    if let Err(e) = engine.refresh_stats().await {
        warn!(error = %e, "Initial stats refresh failed");
    }
    state.health.set_ready(true);

    let scheduler = MaintenanceScheduler::start(engine.clone(), config.scheduler.clone(), catalog);

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Shutdown signal received");

    state.health.set_ready(false);
    scheduler.shutdown().await;
    shutdown.cancel();
    if let Err(e) = server.await {
        error!("HTTP server task failed: {}", e);
    }

    let stats = engine.stats();
    info!(
        entries = stats.total_entries,
        size = stats.total_size,
        hit_rate = stats.hit_rate,
        "mediacache shutdown complete"
    );
    Ok(())
}

async fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_yaml_file(path)
            .await
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    if let Some(max_size_bytes) = args.max_size_bytes {
        config.policy.max_size_bytes = max_size_bytes;
    }
    if let Some(max_entries) = args.max_entries {
        config.policy.max_entries = max_entries;
    }
    Ok(config)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    if let Ok(directive) = "hyper=warn".parse() {
        filter = filter.add_directive(directive);
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// HTTP Server
// =============================================================================

async fn run_http_server(listener: TcpListener, state: Arc<AppState>, shutdown: CancellationToken) {
    loop {
        let (stream, _) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("HTTP accept error: {}", e);
                    continue;
                }
            },
        };

        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle(req, state.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("HTTP connection error: {}", e);
            }
        });
    }
    info!("HTTP server stopped");
}

async fn handle(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let response = match req.uri().path() {
        "/metrics" => metrics_response(&state).await,
        "/healthz" | "/readyz" => health_response(&state).await,
        "/livez" => text(StatusCode::OK, "text/plain", "ok"),
        _ => text(StatusCode::NOT_FOUND, "text/plain", "not found"),
    };
    Ok(response)
}

async fn metrics_response(state: &AppState) -> Response<Full<Bytes>> {
    // Serve the last snapshot if the store cannot be read right now
    let stats = match state.engine.refresh_stats().await {
        Ok(stats) => stats,
        Err(e) => {
            warn!(error = %e, "Stats refresh for /metrics failed");
            state.engine.stats()
        }
    };
    state.exporter.update(&stats);

    match state.exporter.render() {
        Ok(body) => text(StatusCode::OK, &state.exporter.content_type(), body),
        Err(e) => {
            error!("Metrics rendering failed: {}", e);
            text(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", "metrics unavailable")
        }
    }
}

async fn health_response(state: &AppState) -> Response<Full<Bytes>> {
    let report = state.health.check(&state.engine).await;
    let status = if report.status.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    match serde_json::to_string(&report) {
        Ok(body) => text(status, "application/json", body),
        Err(e) => {
            error!("Health serialization failed: {}", e);
            text(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", "health unavailable")
        }
    }
}

fn text(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    if let Ok(value) = content_type.parse() {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, value);
    }
    response
}
