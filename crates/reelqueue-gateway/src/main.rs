use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use reelqueue_core::ReelqueueConfig;
use reelqueue_scheduler::{
    ReadinessEvaluator, RetryPolicy, SchedulerEngine, TimeSource, UploadDriver,
};
use reelqueue_store::{QueueStore, SqliteQueueStore};
use reelqueue_youtube::{GoogleAuthorizer, YouTubePublisher};
use tracing::info;

mod app;
mod error;
mod http;
mod schedule;

#[derive(Debug, Parser)]
#[command(name = "reelqueue-gateway", version, about = "Multi-tenant YouTube upload scheduler")]
struct Args {
    /// Config file (default: ~/.reelqueue/reelqueue.toml)
    #[arg(long, env = "REELQUEUE_CONFIG")]
    config: Option<String>,

    /// Override `gateway.port`.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "reelqueue_gateway=info,reelqueue_scheduler=info,tower_http=debug".into()
            }),
        )
        .init();

    let args = Args::parse();
    let mut config = ReelqueueConfig::load(args.config.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        ReelqueueConfig::default()
    });
    if let Some(port) = args.port {
        config.gateway.port = port;
    }

    let db_path = config.database.path.clone();
    ensure_parent_dir(&db_path);
    info!(path = %db_path, "opening SQLite database");
    let store: Arc<dyn QueueStore> = Arc::new(SqliteQueueStore::open(&db_path)?);

    std::fs::create_dir_all(&config.storage.uploads_dir)?;
    info!(path = %config.storage.uploads_dir, "uploads directory ready");

    let time = Arc::new(TimeSource::from_config(&config.clock));
    let authorizer = Arc::new(GoogleAuthorizer::new(
        config.youtube.clone(),
        Arc::clone(&store),
    ));
    let publisher = Arc::new(YouTubePublisher::new(config.youtube.clone()));
    let policy = RetryPolicy::new(
        config.scheduler.max_retries,
        Duration::from_secs(config.scheduler.retry_backoff_secs),
    );
    let driver = UploadDriver::new(authorizer.clone(), publisher, policy);

    let engine = SchedulerEngine::new(Arc::clone(&store), Arc::clone(&time), driver)
        .with_evaluator(ReadinessEvaluator::from_minutes(
            config.scheduler.upload_window_mins,
        ))
        .with_tick_interval(Duration::from_secs(config.scheduler.tick_interval_secs.max(1)));
    let scheduler = Arc::new(engine).start();

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let state = Arc::new(app::AppState::new(config, store, authorizer, time));
    let router = app::build_router(state);

    info!("reelqueue gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // stop ticking; detached upload tasks end with the runtime
    scheduler.join().await;
    info!("reelqueue gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("cannot listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
