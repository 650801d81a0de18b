//! jobgridd — the JobGrid daemon.
//!
//! Single binary that assembles the control plane:
//! - State store (redb)
//! - Rate limiter over the shared store
//! - Worker lifecycle manager
//! - Alert engine
//! - Per-queue control loops
//! - REST API
//!
//! The broker and orchestrator are trait interfaces; this binary wires
//! the in-memory implementations for the dev loop. Production
//! deployments swap in implementations backed by the real queue backend
//! and process manager.
//!
//! # Usage
//!
//! ```text
//! jobgridd run --config jobgrid.toml --port 8700
//! ```

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use tracing::info;

use jobgrid_alert::AlertEngine;
use jobgrid_api::ApiState;
use jobgrid_broker::{MemoryBroker, MemoryOrchestrator};
use jobgrid_control::{ControlLoopScheduler, condition_bridge};
use jobgrid_queue::QueueController;
use jobgrid_ratelimit::{RateLimiter, StateLimiterStore};
use jobgrid_state::{ScalingMetrics, StateStore};
use jobgrid_worker::WorkerLifecycleManager;

#[derive(Parser)]
#[command(name = "jobgridd", about = "JobGrid control-plane daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control plane (dev loop: in-memory broker/orchestrator).
    Run {
        /// Path to the toml configuration file.
        #[arg(long, default_value = "jobgrid.toml")]
        config: PathBuf,

        /// Override the API port from the config file.
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,jobgridd=debug,jobgrid=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, port } => run(config, port).await,
    }
}

async fn run(config_path: PathBuf, port_override: Option<u16>) -> anyhow::Result<()> {
    info!("JobGrid daemon starting");

    let config = config::load(&config_path)?;
    let port = port_override.unwrap_or(config.daemon.api_port);

    // ── State store ────────────────────────────────────────────────
    std::fs::create_dir_all(&config.daemon.data_dir)?;
    let db_path = config.daemon.data_dir.join("jobgrid.redb");
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    // Persist validated policies and rules so the admin surface and the
    // control loops read one source of truth.
    let now = epoch_secs();
    for queue in &config.queues {
        store.put_policy(&queue.to_policy(now))?;
    }
    for rule in &config.alert_rules {
        store.put_alert_rule(rule)?;
    }
    info!(
        queues = config.queues.len(),
        rules = config.alert_rules.len(),
        "configuration loaded"
    );

    // ── Collaborators (dev loop) ───────────────────────────────────
    let broker = Arc::new(MemoryBroker::new());
    for queue in &config.queues {
        broker.add_queue(&queue.name, empty_metrics(&queue.name));
    }
    let orchestrator = Arc::new(MemoryOrchestrator::new());

    // ── Rate limiter over the shared store ─────────────────────────
    let mut limiter = RateLimiter::new(Arc::new(StateLimiterStore::new(store.clone())));
    for limiter_config in config.limiters.clone() {
        limiter.register(limiter_config)?;
    }
    let limiter = Arc::new(limiter);
    info!(limiters = config.limiters.len(), "rate limiters registered");

    // ── Alerts + lifecycle ─────────────────────────────────────────
    let alerts = Arc::new(AlertEngine::new(store.clone()));
    let lifecycle = WorkerLifecycleManager::new(store.clone(), Arc::clone(&orchestrator) as _)
        .with_limits(config.recycle)
        .with_condition_callback(condition_bridge(Arc::clone(&alerts)));
    info!(limits = ?config.recycle, "worker lifecycle manager initialized");

    // ── Control loops ──────────────────────────────────────────────
    let scheduler = ControlLoopScheduler::new(
        store.clone(),
        Arc::clone(&broker) as _,
        lifecycle.clone(),
        Arc::clone(&alerts),
    )
    .with_tick_interval(Duration::from_secs(config.daemon.tick_interval_secs))
    .with_metrics_timeout(Duration::from_secs(config.daemon.metrics_timeout_secs));

    for queue in &config.queues {
        scheduler.register_queue(&queue.name).await;
    }

    // ── Queue controller ───────────────────────────────────────────
    let controller = QueueController::new(Arc::clone(&broker) as _)
        .with_timeout(Duration::from_secs(config.daemon.command_timeout_secs));

    // ── API server ─────────────────────────────────────────────────
    let router = jobgrid_api::build_router(ApiState {
        store,
        limiter,
        alerts,
        lifecycle,
        controller,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let shutdown_scheduler = scheduler.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install CTRL+C handler");
            info!("shutdown signal received");
            shutdown_scheduler.stop_all().await;
        })
        .await?;

    info!("JobGrid daemon stopped");
    Ok(())
}

/// A zeroed snapshot for a queue the dev broker has no traffic on yet.
fn empty_metrics(queue: &str) -> ScalingMetrics {
    ScalingMetrics {
        queue: queue.to_string(),
        queue_depth: 0,
        queue_latency_ms: 0,
        active_jobs: 0,
        completed_rate: 0.0,
        error_rate: 0.0,
        current_workers: 0,
        cpu_percent: None,
        memory_percent: None,
        timestamp: epoch_secs(),
    }
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
