//! Service binary: watch store, scheduler loop, and HTTP gateway in one
//! process.
//!
//! Configuration is read from the path in `FAIRE_CONFIG` when set, otherwise
//! from the default location (`~/.config/faire/config.toml`). A missing file
//! falls back to built-in defaults. The process runs until Ctrl+C, then stops
//! the scheduler loop and gateway before exiting.

use faire::config::FaireConfig;
use faire::{
    ActiveRuns, Gateway, HttpResearchEngine, NotificationDispatcher, QuickExecutor, ResearchEngine,
    RunPipeline, SchedulerManager, TaskExecutor, TrendAnalyzer, WatchStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Log to stderr, quieting the HTTP stack by default. RUST_LOG overrides.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("faire=info,hyper=warn,reqwest=warn")),
        )
        .init();

    info!("faire-host v{} starting", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::var_os("FAIRE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(FaireConfig::default_config_path);
    let config = if config_path.exists() {
        info!(path = %config_path.display(), "loading configuration");
        FaireConfig::from_file(&config_path)?
    } else {
        info!(path = %config_path.display(), "no configuration file, using defaults");
        FaireConfig::default()
    };

    let store = Arc::new(WatchStore::open(&config.store.root_dir)?);
    info!(db = %store.path().display(), "watch store opened");

    let engine = Arc::new(HttpResearchEngine::new(&config.engine));
    if !engine.health_check().await.unwrap_or(false) {
        warn!(
            base_url = %config.engine.base_url,
            "research engine is not reachable; runs will fail until it comes up"
        );
    }

    let dispatcher = NotificationDispatcher::new(config.gateway.events_buffer);
    let pipeline = Arc::new(RunPipeline::new(
        Arc::clone(&store),
        engine,
        TrendAnalyzer::new(config.analysis.trend_window),
        dispatcher.clone(),
    ));
    let active = ActiveRuns::new();
    let standard = Arc::new(TaskExecutor::new(
        Arc::clone(&pipeline),
        active.clone(),
        config.executor.max_concurrent,
    ));
    let quick = Arc::new(QuickExecutor::new(
        pipeline,
        active.clone(),
        config.executor.quick_max_concurrent,
    ));

    let manager = Arc::new(SchedulerManager::new(
        Arc::clone(&store),
        standard,
        quick,
        active,
        config.scheduler.tick_interval_secs,
    ));
    manager.restore()?;
    let scheduler_loop = manager.start();

    let gateway = Gateway::start(&config.gateway, store, Arc::clone(&manager), dispatcher).await?;
    info!(port = gateway.port(), "faire-host ready");

    tokio::signal::ctrl_c().await?;
    info!("received Ctrl+C, shutting down...");

    manager.stop();
    if let Some(handle) = scheduler_loop {
        let _ = handle.await;
    }
    gateway.shutdown();

    info!("faire-host shut down cleanly");
    Ok(())
}
