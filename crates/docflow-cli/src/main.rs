use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use docflow_core::cache::{RedisConfig, RedisPool};
use docflow_core::config::AppConfig;
use docflow_core::{ArtifactCache, HealthAggregator, Job, JobQueue, JobRegistry, Pool};

#[derive(Parser)]
#[command(name = "docflow")]
#[command(about = "Asynchronous document-processing job pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server and worker pool (the default).
    Serve,

    /// Submit a single job and print its id, without starting the server.
    Submit {
        #[arg(help = "Job type (media_processing, text_extraction)")]
        job_type: String,

        #[arg(help = "JSON payload")]
        payload: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::from_env().map_err(|e| anyhow::anyhow!("configuration error: {}", e))?;

    tracing_subscriber::fmt()
        .with_env_filter(config.log.directive.clone())
        .init();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Submit { job_type, payload } => submit(config, job_type, payload).await,
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let store = RedisPool::new(RedisConfig::from_store_config(&config.store))
        .await
        .map_err(|e| anyhow::anyhow!("failed to connect to coordination store: {}", e))?;

    let queue = JobQueue::new(store.clone(), config.worker.queue_name.clone(), config.worker.retry_delay);
    let registry = JobRegistry::builder().with_reference_processors().build();
    let pool = Pool::new(queue.clone(), registry.clone(), config.worker.clone());
    let health = Arc::new(HealthAggregator::new(store.clone(), pool.clone(), registry.clone()));

    let cache = Arc::new(
        ArtifactCache::new(&config.cache)
            .await
            .map_err(|e| anyhow::anyhow!("failed to initialize artifact cache: {}", e))?,
    );
    let sweeper_cancel = CancellationToken::new();
    let sweeper_handle = cache.clone().spawn_sweeper(sweeper_cancel.clone());

    let state = docflow_api::AppState::new(queue.clone(), registry, health, config.worker.retry_count);
    let router = docflow_api::build_router(state);

    let host: std::net::IpAddr = config
        .http
        .host
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid HTTP_HOST: {}", e))?;
    let addr = SocketAddr::from((host, config.http.port));

    let http_cancel = CancellationToken::new();
    let http_handle = {
        let http_cancel = http_cancel.clone();
        tokio::spawn(async move {
            docflow_api::serve(addr, router, async move { http_cancel.cancelled().await }).await
        })
    };

    pool.start().await;
    info!("docflow running, min_workers={}", config.worker.min_workers);

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining");

    http_cancel.cancel();
    if let Err(e) = http_handle.await {
        error!(error = %e, "HTTP server task panicked during shutdown");
    }

    const SHUTDOWN_BUDGET: std::time::Duration = std::time::Duration::from_secs(30);
    if tokio::time::timeout(SHUTDOWN_BUDGET, pool.stop()).await.is_err() {
        error!("worker pool did not drain within the shutdown budget");
    }

    sweeper_cancel.cancel();
    let _ = sweeper_handle.await;

    if let Err(e) = queue.close().await {
        error!(error = %e, "error closing coordination store connection");
    }

    info!("shutdown complete");
    Ok(())
}

async fn submit(config: AppConfig, job_type: String, payload: String) -> anyhow::Result<()> {
    let payload: serde_json::Value = serde_json::from_str(&payload)?;

    let store = RedisPool::new(RedisConfig::from_store_config(&config.store))
        .await
        .map_err(|e| anyhow::anyhow!("failed to connect to coordination store: {}", e))?;
    let queue = JobQueue::new(store, config.worker.queue_name.clone(), config.worker.retry_delay);

    let job = Job::new(job_type, payload, config.worker.retry_count);
    queue.enqueue(&job).await.map_err(|e| anyhow::anyhow!("{}", e))?;

    println!("{}", job.id);
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_defaults_to_serve() {
        let cli = Cli::parse_from(["docflow"]);
        assert!(matches!(cli.command, None));
    }

    #[test]
    fn test_cli_parse_submit() {
        let cli = Cli::parse_from(["docflow", "submit", "text_extraction", "{}"]);
        assert!(matches!(cli.command, Some(Commands::Submit { .. })));
    }
}
