use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use tracing::info;

use docflow_core::Result;

use crate::routes::create_router;
use crate::state::AppState;

/// Build the router. Pure: no I/O, so it can be exercised directly in tests.
pub fn build_router(state: AppState) -> Router {
    create_router(state)
}

/// Bind and serve `router` on `addr`, running until `shutdown` resolves.
/// Does not itself own the job pool's lifecycle; the caller coordinates
/// `Pool::start`/`Pool::stop` around this call per the process bootstrap
/// order.
pub async fn serve(
    addr: SocketAddr,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| docflow_core::Error::Network(e.to_string()))?;

    info!("docflow API listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| docflow_core::Error::Network(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_core::config::CacheConfig;
    use docflow_core::{ArtifactCache, HealthAggregator, JobQueue, JobRegistry};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_router_builds() {
        let pool = docflow_core::cache::RedisPool::new(docflow_core::cache::RedisConfig::development()).await;
        if let Ok(pool) = pool {
            let queue = JobQueue::new(pool.clone(), "docflow_router_test", std::time::Duration::from_secs(1));
            let registry = JobRegistry::builder().build();
            let worker_config = docflow_core::config::WorkerConfig {
                max_concurrency: 1,
                min_workers: 1,
                queue_name: "docflow_router_test".to_string(),
                retry_count: 1,
                retry_delay: std::time::Duration::from_secs(1),
                scale_up_threshold: 10,
                scale_down_threshold: 0,
                check_interval: std::time::Duration::from_secs(60),
                scale_delay: std::time::Duration::from_secs(60),
                max_processing_time: std::time::Duration::from_secs(5),
            };
            let job_pool = docflow_core::Pool::new(queue.clone(), registry.clone(), worker_config);
            let _ = ArtifactCache::new(&CacheConfig {
                enabled: false,
                ttl: std::time::Duration::from_secs(1),
                max_size_bytes: 1,
                cleanup_age: std::time::Duration::from_secs(1),
                directory: std::env::temp_dir().to_string_lossy().to_string(),
            })
            .await;
            let health = Arc::new(HealthAggregator::new(pool, job_pool, registry.clone()));
            let state = AppState::new(queue, registry, health, 3);
            let _router = build_router(state);
        }
    }
}
