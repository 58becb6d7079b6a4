//! Worker (C5): a single execution unit that blocks on `Queue.Dequeue`,
//! dispatches the popped job to the processor registered for its `type`,
//! and reports completion or failure. A worker runs at most one processor
//! call at a time; horizontal scaling comes from the pool running several
//! workers, not from a worker running several jobs concurrently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::jobs::{Job, JobContext, JobError, JobQueue, JobRegistry};

/// Unique worker identifier.
pub type WorkerId = Uuid;

/// A single goroutine-equivalent execution unit. Invariant: a worker is
/// either blocked in dequeue, executing exactly one processor call, or
/// stopped — never more than one of these at once.
pub struct Worker {
    pub id: WorkerId,
    queue: JobQueue,
    registry: JobRegistry,
    max_processing_time: Duration,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(queue: JobQueue, registry: JobRegistry, max_processing_time: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            queue,
            registry,
            max_processing_time,
            cancel: CancellationToken::new(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// A clone of this worker's cancellation token, for the pool to hold
    /// onto and fire on `stop()` without keeping the worker itself alive.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel this worker's context. Does not wait for the in-flight
    /// processor call (if any) to return — callers await the worker's
    /// `run()` task join handle for that.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Main loop: dequeue, dispatch, report, repeat until cancelled.
    pub async fn run(&self) {
        self.running.store(true, Ordering::SeqCst);
        info!(worker_id = %self.id, "worker started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.queue.dequeue(&self.cancel).await {
                Ok(Some(job)) => {
                    self.process_job(job).await;
                }
                Ok(None) => continue,
                Err(JobError::Cancelled) => break,
                Err(e) => {
                    warn!(worker_id = %self.id, error = %e, "dequeue failed, backing off");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!(worker_id = %self.id, "worker stopped");
    }

    /// Look up the processor for `job.job_type`, invoke it, and report the
    /// outcome. Never abandons the call once started: cancellation is
    /// carried into the processor's context, but this function always
    /// awaits the processor's return before the caller's loop checks
    /// `cancel` again.
    async fn process_job(&self, job: Job) {
        let handler = match self.registry.lookup(&job.job_type) {
            Some(handler) => handler,
            None => {
                warn!(job_id = %job.id, job_type = %job.job_type, "no processor registered, failing terminally");
                if let Err(e) = self.queue.fail(&job.id, "unknown job type", true).await {
                    error!(job_id = %job.id, error = %e, "failed to record terminal failure");
                }
                return;
            }
        };

        let ctx = JobContext::new(
            job.id,
            self.queue.name().to_string(),
            job.max_retries + 1,
            self.max_processing_time,
        )
        .with_cancellation(self.cancel.clone());

        debug!(job_id = %job.id, job_type = %job.job_type, "dispatching to processor");

        // Run on its own task so a panic inside the processor surfaces as a
        // join error rather than taking the worker's loop down with it.
        let job_for_call = job.clone();
        let join = tokio::spawn(async move { handler.handle(&ctx, &job_for_call).await });

        let outcome = match tokio::time::timeout(self.max_processing_time, join).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(JobError::Execution(format!("processor panicked: {}", join_err))),
            Err(_elapsed) => Err(JobError::TimeoutMillis(self.max_processing_time.as_millis() as u64)),
        };

        match outcome {
            Ok(job_result) => {
                if let Err(e) = self.queue.complete(&job.id, job_result.data).await {
                    error!(job_id = %job.id, error = %e, "failed to record completion");
                }
            }
            Err(JobError::Cancelled) => {
                // Cancellation never marks the job failed; it is left in
                // whatever state the processor last wrote and the worker
                // exits cleanly on its next loop check.
                info!(job_id = %job.id, "processor observed cancellation, leaving job record untouched");
            }
            Err(JobError::Unrecoverable(msg)) => {
                if let Err(e) = self.queue.fail(&job.id, msg, true).await {
                    error!(job_id = %job.id, error = %e, "failed to record unrecoverable failure");
                }
            }
            Err(e) => {
                if let Err(fail_err) = self.queue.fail(&job.id, e.to_string(), false).await {
                    error!(job_id = %job.id, error = %fail_err, "failed to record retryable failure");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RedisConfig;
    use crate::jobs::registry::JobRegistryBuilder;
    use crate::jobs::{JobHandler, JobProcessingResult, JobResult};
    use crate::cache::RedisPool;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct CountingHandler {
        calls: Arc<AtomicUsize>,
        cancels_observed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn handle(&self, ctx: &JobContext, _job: &Job) -> JobProcessingResult<JobResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if ctx.is_cancelled() {
                self.cancels_observed.fetch_add(1, Ordering::SeqCst);
                return Err(JobError::Cancelled);
            }
            Ok(JobResult::new(serde_json::json!({"ok": true})))
        }
    }

    struct AlwaysFailsHandler;

    #[async_trait]
    impl JobHandler for AlwaysFailsHandler {
        async fn handle(&self, _ctx: &JobContext, _job: &Job) -> JobProcessingResult<JobResult> {
            Err(JobError::Execution("permanent".to_string()))
        }
    }

    #[tokio::test]
    async fn worker_processes_one_job_and_completes() {
        let config = RedisConfig::development();
        let pool = RedisPool::new(config).await;

        if let Ok(pool) = pool {
            let queue = JobQueue::new(pool, "docflow_worker_test_ok", Duration::from_millis(10));
            let calls = Arc::new(AtomicUsize::new(0));
            let registry = JobRegistryBuilder::new()
                .register(
                    "media_processing",
                    Arc::new(CountingHandler {
                        calls: calls.clone(),
                        cancels_observed: Arc::new(AtomicUsize::new(0)),
                    }),
                )
                .build();

            let job = Job::new("media_processing", serde_json::json!({}), 1);
            queue.enqueue(&job).await.unwrap();

            let worker = Worker::new(queue.clone(), registry, Duration::from_secs(5));
            let cancel = worker.cancellation_token();
            let handle = tokio::spawn(async move { worker.run().await });

            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
            let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;

            assert_eq!(calls.load(Ordering::SeqCst), 1);
            let record = queue.get_by_id(&job.id).await.unwrap();
            assert_eq!(record.status, JobStatus::Completed);
        }
    }

    #[tokio::test]
    async fn worker_fails_job_terminally_after_retries_exhausted() {
        let config = RedisConfig::development();
        let pool = RedisPool::new(config).await;

        if let Ok(pool) = pool {
            let queue = JobQueue::new(pool, "docflow_worker_test_fail", Duration::from_millis(10));
            let registry = JobRegistryBuilder::new()
                .register("media_processing", Arc::new(AlwaysFailsHandler))
                .build();

            let job = Job::new("media_processing", serde_json::json!({}), 1);
            queue.enqueue(&job).await.unwrap();

            let worker = Worker::new(queue.clone(), registry, Duration::from_secs(5));
            let cancel = worker.cancellation_token();
            let handle = tokio::spawn(async move { worker.run().await });

            tokio::time::sleep(Duration::from_millis(500)).await;
            cancel.cancel();
            let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;

            let record = queue.get_by_id(&job.id).await.unwrap();
            assert_eq!(record.status, JobStatus::Failed);
            assert_eq!(record.retry_count, 1);
        }
    }

    #[tokio::test]
    async fn worker_fails_unknown_type_without_retry() {
        let config = RedisConfig::development();
        let pool = RedisPool::new(config).await;

        if let Ok(pool) = pool {
            let queue = JobQueue::new(pool, "docflow_worker_test_unknown", Duration::from_millis(10));
            let registry = JobRegistryBuilder::new().build();

            let job = Job::new("nonexistent_type", serde_json::json!({}), 3);
            queue.enqueue(&job).await.unwrap();

            let worker = Worker::new(queue.clone(), registry, Duration::from_secs(5));
            let cancel = worker.cancellation_token();
            let handle = tokio::spawn(async move { worker.run().await });

            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
            let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;

            let record = queue.get_by_id(&job.id).await.unwrap();
            assert_eq!(record.status, JobStatus::Failed);
            assert_eq!(record.retry_count, 0);
        }
    }
}
