//! Worker pool and depth-sampling autoscaler (C6). Owns a set of workers
//! and a control loop that grows or shrinks the pool between `[min, max]`
//! bounds, one worker at a time per tick, with a cooldown between scaling
//! actions to avoid oscillation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::WorkerConfig;
use crate::jobs::{JobProcessingResult, JobQueue, JobRegistry, Worker, WorkerId};

struct RunningWorker {
    worker: Arc<Worker>,
    handle: JoinHandle<()>,
}

/// A depth-sampling autoscaled pool of [`Worker`]s.
pub struct Pool {
    queue: JobQueue,
    registry: JobRegistry,
    config: WorkerConfig,
    workers: Mutex<HashMap<WorkerId, RunningWorker>>,
    last_scale_time: Mutex<std::time::Instant>,
    root_cancel: CancellationToken,
    scaler_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Pool {
    pub fn new(queue: JobQueue, registry: JobRegistry, config: WorkerConfig) -> Arc<Self> {
        Arc::new(Self {
            queue,
            registry,
            config,
            workers: Mutex::new(HashMap::new()),
            last_scale_time: Mutex::new(std::time::Instant::now()),
            root_cancel: CancellationToken::new(),
            scaler_handle: Mutex::new(None),
        })
    }

    /// Spawn `min_workers` workers and start the autoscaler's ticker.
    pub async fn start(self: &Arc<Self>) {
        {
            let mut workers = self.workers.lock().await;
            for _ in 0..self.config.min_workers {
                self.spawn_worker(&mut workers);
            }
        }

        let pool = Arc::clone(self);
        let handle = tokio::spawn(async move { pool.run_scaler().await });
        *self.scaler_handle.lock().await = Some(handle);

        info!(workers = self.config.min_workers, "pool started");
    }

    /// Cancel the scaler first, then cancel every worker and wait for all
    /// of them to drain. Idempotent: calling `stop` twice is a no-op the
    /// second time.
    pub async fn stop(&self) {
        if self.root_cancel.is_cancelled() {
            return;
        }
        self.root_cancel.cancel();

        if let Some(handle) = self.scaler_handle.lock().await.take() {
            let _ = handle.await;
        }

        let drained: Vec<RunningWorker> = {
            let mut workers = self.workers.lock().await;
            for running in workers.values() {
                running.worker.stop();
            }
            workers.drain().map(|(_, running)| running).collect()
        };
        for running in drained {
            let _ = running.handle.await;
        }

        info!("pool stopped");
    }

    pub async fn worker_count(&self) -> usize {
        self.workers.lock().await.len()
    }

    pub async fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.worker_count().await,
            min_workers: self.config.min_workers,
            max_workers: self.config.max_concurrency,
        }
    }

    pub async fn queue_stats(&self) -> JobProcessingResult<crate::jobs::QueueStats> {
        self.queue.stats().await
    }

    fn spawn_worker(&self, workers: &mut HashMap<WorkerId, RunningWorker>) {
        let worker = Arc::new(Worker::new(
            self.queue.clone(),
            self.registry.clone(),
            self.config.max_processing_time,
        ));
        let run_worker = Arc::clone(&worker);
        let handle = tokio::spawn(async move { run_worker.run().await });
        workers.insert(worker.id, RunningWorker { worker, handle });
    }

    async fn run_scaler(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.root_cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    async fn tick(&self) {
        let depth = match self.queue.depth().await {
            Ok(depth) => depth,
            Err(e) => {
                warn!(error = %e, "autoscaler could not sample queue depth");
                return;
            }
        };

        let mut retired: Option<RunningWorker> = None;

        {
            let mut last_scale_time = self.last_scale_time.lock().await;
            if last_scale_time.elapsed() < self.config.scale_delay {
                return;
            }

            let mut workers = self.workers.lock().await;
            let count = workers.len();

            if depth > self.config.scale_up_threshold && count < self.config.max_concurrency {
                self.spawn_worker(&mut workers);
                *last_scale_time = std::time::Instant::now();
                info!(depth, workers = workers.len(), "scaled up");
            } else if depth < self.config.scale_down_threshold && count > self.config.min_workers {
                if let Some(id) = workers.keys().next().copied() {
                    if let Some(running) = workers.get(&id) {
                        running.worker.stop();
                    }
                    retired = workers.remove(&id);
                    *last_scale_time = std::time::Instant::now();
                    info!(depth, workers = workers.len(), "scaled down");
                }
            }
        }

        if let Some(running) = retired {
            let _ = running.handle.await;
        }
    }
}

/// Snapshot of pool sizing, exposed to the health aggregator and HTTP
/// status endpoint.
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub workers: usize,
    pub min_workers: usize,
    pub max_workers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{RedisConfig, RedisPool};
    use crate::jobs::registry::JobRegistryBuilder;
    use crate::jobs::Job;

    fn test_config(min: usize, max: usize) -> WorkerConfig {
        WorkerConfig {
            max_concurrency: max,
            min_workers: min,
            queue_name: "docflow_pool_test".to_string(),
            retry_count: 1,
            retry_delay: Duration::from_millis(10),
            scale_up_threshold: 1,
            scale_down_threshold: 0,
            check_interval: Duration::from_millis(50),
            scale_delay: Duration::from_millis(10),
            max_processing_time: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn start_spawns_min_workers_and_stop_drains_all() {
        let config = RedisConfig::development();
        let redis_pool = RedisPool::new(config).await;

        if let Ok(redis_pool) = redis_pool {
            let queue = JobQueue::new(redis_pool, "docflow_pool_test_start", Duration::from_millis(10));
            let registry = JobRegistryBuilder::new().with_reference_processors().build();
            let pool = Pool::new(queue, registry, test_config(2, 4));

            pool.start().await;
            assert_eq!(pool.worker_count().await, 2);

            pool.stop().await;
            assert_eq!(pool.worker_count().await, 0);
        }
    }

    #[tokio::test]
    async fn scale_up_adds_a_worker_under_backlog() {
        let config = RedisConfig::development();
        let redis_pool = RedisPool::new(config).await;

        if let Ok(redis_pool) = redis_pool {
            let queue = JobQueue::new(redis_pool, "docflow_pool_test_scaleup", Duration::from_millis(10));
            let registry = JobRegistryBuilder::new().with_reference_processors().build();
            let pool = Pool::new(queue.clone(), registry, test_config(1, 4));

            pool.start().await;

            for _ in 0..5 {
                let job = Job::new("media_processing", serde_json::json!({"input_path": "/nonexistent"}), 0);
                let _ = queue.enqueue(&job).await;
            }

            tokio::time::sleep(Duration::from_millis(200)).await;
            assert!(pool.worker_count().await >= 1);

            pool.stop().await;
        }
    }
}
