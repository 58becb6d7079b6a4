//! Health aggregator (C7): three independent queries over the running
//! pipeline — liveness, readiness, and a full status aggregate used by the
//! HTTP surface and by operators diagnosing a stuck deployment.

use std::sync::Arc;

use serde::Serialize;

use crate::cache::RedisPool;
use crate::jobs::{JobRegistry, Pool, QueueStats};

/// Always "alive" once constructed; the process being able to answer at
/// all is the only signal liveness carries.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Liveness {
    pub alive: bool,
}

/// Readiness: store reachable and at least `min_workers` running.
#[derive(Debug, Clone, Serialize)]
pub struct Readiness {
    pub ready: bool,
    pub store_reachable: bool,
    pub workers_running: usize,
    pub min_workers: usize,
}

/// Per-dependency and per-processor detail behind the readiness verdict.
#[derive(Debug, Clone, Serialize)]
pub struct FullStatus {
    pub ready: bool,
    pub store_reachable: bool,
    pub workers_running: usize,
    pub min_workers: usize,
    pub max_workers: usize,
    pub processors: std::collections::HashMap<String, bool>,
    pub queue: QueueStats,
}

/// Aggregates the store connection, worker pool, and processor registry
/// into the three queries the HTTP surface exposes under `/health/*`.
pub struct HealthAggregator {
    store: RedisPool,
    pool: Arc<Pool>,
    registry: JobRegistry,
}

impl HealthAggregator {
    pub fn new(store: RedisPool, pool: Arc<Pool>, registry: JobRegistry) -> Self {
        Self { store, pool, registry }
    }

    /// Always alive while the process can answer this call at all.
    pub fn liveness(&self) -> Liveness {
        Liveness { alive: true }
    }

    pub async fn readiness(&self) -> Readiness {
        let store_reachable = self.store_reachable().await;
        let stats = self.pool.stats().await;

        Readiness {
            ready: store_reachable && stats.workers >= stats.min_workers,
            store_reachable,
            workers_running: stats.workers,
            min_workers: stats.min_workers,
        }
    }

    pub async fn full_status(&self) -> FullStatus {
        let store_reachable = self.store_reachable().await;
        let stats = self.pool.stats().await;
        let processors = self.registry.availability().await;

        let queue = match self.pool.queue_stats().await {
            Ok(stats) => stats,
            Err(_) => QueueStats::default(),
        };

        FullStatus {
            ready: store_reachable && stats.workers >= stats.min_workers,
            store_reachable,
            workers_running: stats.workers,
            min_workers: stats.min_workers,
            max_workers: stats.max_workers,
            processors,
            queue,
        }
    }

    async fn store_reachable(&self) -> bool {
        match self.store.get().await {
            Ok(mut conn) => conn.ping().await.unwrap_or(false),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RedisConfig;
    use crate::config::WorkerConfig;
    use crate::jobs::{JobQueue, JobRegistry};
    use std::time::Duration;

    fn test_worker_config() -> WorkerConfig {
        WorkerConfig {
            max_concurrency: 4,
            min_workers: 1,
            queue_name: "docflow_health_test".to_string(),
            retry_count: 1,
            retry_delay: Duration::from_secs(1),
            scale_up_threshold: 10,
            scale_down_threshold: 2,
            check_interval: Duration::from_secs(10),
            scale_delay: Duration::from_secs(30),
            max_processing_time: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn liveness_is_always_alive() {
        let config = RedisConfig::development();
        if let Ok(store) = RedisPool::new(config).await {
            let queue = JobQueue::new(store.clone(), "docflow_health_test", Duration::from_secs(1));
            let registry = JobRegistry::builder().with_reference_processors().build();
            let pool = Pool::new(queue, registry.clone(), test_worker_config());
            let health = HealthAggregator::new(store, pool, registry);
            assert!(health.liveness().alive);
        }
    }

    #[tokio::test]
    async fn readiness_false_before_pool_starts() {
        let config = RedisConfig::development();
        if let Ok(store) = RedisPool::new(config).await {
            let queue = JobQueue::new(store.clone(), "docflow_health_test2", Duration::from_secs(1));
            let registry = JobRegistry::builder().with_reference_processors().build();
            let pool = Pool::new(queue, registry.clone(), test_worker_config());
            let health = HealthAggregator::new(store, pool, registry);

            let readiness = health.readiness().await;
            assert!(readiness.store_reachable);
            assert!(!readiness.ready, "no workers started yet");
        }
    }
}
