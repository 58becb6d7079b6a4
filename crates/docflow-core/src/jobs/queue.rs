//! Job queue: the durable FIFO in the coordination store plus the typed
//! wrapper around it (C2).

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::RedisPool;
use crate::jobs::retry::ExponentialBackoff;
use crate::jobs::{Job, JobError, JobId, JobProcessingResult, JobQuery, JobStatus};

const JOB_RECORD_TTL_SECS: u64 = 24 * 3600;
const DEQUEUE_POLL_SECS: u64 = 5;

/// Job queue backed by Redis. One `JobQueue` corresponds to one queue name
/// (`QUEUE_NAME`); there is no priority fan-out across multiple lists.
#[derive(Clone)]
pub struct JobQueue {
    pool: RedisPool,
    name: String,
    backoff: ExponentialBackoff,
}

impl JobQueue {
    /// `base_delay` seeds the exponential backoff's initial delay; the
    /// multiplier, cap, and jitter come from `ExponentialBackoff::default`.
    pub fn new(pool: RedisPool, name: impl Into<String>, base_delay: Duration) -> Self {
        Self {
            pool,
            name: name.into(),
            backoff: ExponentialBackoff::new(base_delay, Duration::from_secs(3600), 2.0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn job_key(&self, job_id: &JobId) -> String {
        format!("job:{}", job_id)
    }

    /// Enqueue a job: stamp `pending`, write the record, push the id onto
    /// the list. Duplicate ids are accepted — uniqueness is the caller's
    /// responsibility via UUIDv4.
    pub async fn enqueue(&self, job: &Job) -> JobProcessingResult<()> {
        let mut conn = self.pool.get().await?;

        let job_data = serde_json::to_vec(job)
            .map_err(|e| JobError::Serialization(e.to_string()))?;

        conn.setex(&self.job_key(&job.id), JOB_RECORD_TTL_SECS, &job_data)
            .await?;
        conn.lpush(&self.name, job.id.to_string().as_bytes()).await?;

        debug!(job_id = %job.id, job_type = %job.job_type, queue = %self.name, "job enqueued");
        Ok(())
    }

    /// `BRPOP`s in a loop with a short internal timeout so the loop stays
    /// responsive to `cancel`. Returns `None` on a poll with no work;
    /// returns `Err(JobError::Cancelled)` only once `cancel` fires.
    pub async fn dequeue(&self, cancel: &CancellationToken) -> JobProcessingResult<Option<Job>> {
        if cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let mut conn = self.pool.get().await?;

        let popped = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(JobError::Cancelled),
            result = conn.brpop(&self.name, DEQUEUE_POLL_SECS) => result?,
        };

        let Some(id_bytes) = popped else {
            return Ok(None);
        };

        let id_str = String::from_utf8(id_bytes)
            .map_err(|e| JobError::Deserialization(e.to_string()))?;
        let job_id: JobId = id_str
            .parse()
            .map_err(|e| JobError::Deserialization(format!("invalid job id {}: {}", id_str, e)))?;

        let Some(mut job) = self.get_job(&job_id).await? else {
            warn!(job_id = %job_id, "dequeued id with no matching record, dropping");
            return Ok(None);
        };

        job.mark_processing();
        self.save_job(&job).await?;

        Ok(Some(job))
    }

    pub async fn get_job(&self, job_id: &JobId) -> JobProcessingResult<Option<Job>> {
        let mut conn = self.pool.get().await?;
        match conn.get(&self.job_key(job_id)).await? {
            Some(data) => {
                let job: Job = serde_json::from_slice(&data)
                    .map_err(|e| JobError::Deserialization(e.to_string()))?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    /// `GetByID` as named in the component design; an alias kept for
    /// readability at call sites that want the spec's vocabulary.
    pub async fn get_by_id(&self, job_id: &JobId) -> JobProcessingResult<Job> {
        self.get_job(job_id)
            .await?
            .ok_or(JobError::NotFound(*job_id))
    }

    async fn save_job(&self, job: &Job) -> JobProcessingResult<()> {
        let mut conn = self.pool.get().await?;
        let job_data = serde_json::to_vec(job).map_err(|e| JobError::Serialization(e.to_string()))?;
        conn.setex(&self.job_key(&job.id), JOB_RECORD_TTL_SECS, &job_data)
            .await?;
        Ok(())
    }

    /// Load the record, set `status=completed`, `result`, `completed_at`.
    pub async fn complete(&self, job_id: &JobId, result: serde_json::Value) -> JobProcessingResult<()> {
        let mut job = self.get_by_id(job_id).await?;
        job.mark_completed(result);
        self.save_job(&job).await?;
        info!(job_id = %job_id, "job completed");
        Ok(())
    }

    /// Load the record, increment `retry_count` (unless `unrecoverable`),
    /// and either write `status=failed` or re-enqueue after an exponential
    /// backoff delay (jittered, keyed off `retry_count`). The re-enqueue is
    /// asynchronous: it never blocks the caller, and if the store is
    /// unreachable when the timer fires the retry is dropped (the record
    /// stays `pending` but the list entry is never restored — the job is
    /// lost, per the design notes on at-least-once semantics).
    pub async fn fail(
        &self,
        job_id: &JobId,
        error_msg: impl Into<String>,
        unrecoverable: bool,
    ) -> JobProcessingResult<()> {
        let mut job = self.get_by_id(job_id).await?;
        let terminal = job.mark_failed(error_msg, unrecoverable);
        self.save_job(&job).await?;

        if terminal {
            error!(job_id = %job_id, error = ?job.error, "job failed terminally");
            return Ok(());
        }

        warn!(job_id = %job_id, retry_count = job.retry_count, "job will retry");

        let queue = self.clone();
        let job_id = *job_id;
        let delay = self
            .backoff
            .calculate_delay(job.retry_count)
            .unwrap_or(self.backoff.initial_delay);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut conn = match queue.pool.get().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "retry re-enqueue dropped: store unavailable");
                    return;
                }
            };
            if let Err(e) = conn.lpush(&queue.name, job_id.to_string().as_bytes()).await {
                error!(job_id = %job_id, error = %e, "retry re-enqueue dropped: lpush failed");
            }
        });

        Ok(())
    }

    /// `{pending: LLEN(queue_name)}`. Processing/completed/failed counts
    /// are intentionally not maintained here.
    pub async fn stats(&self) -> JobProcessingResult<QueueStats> {
        let mut conn = self.pool.get().await?;
        let pending = conn.llen(&self.name).await?;
        Ok(QueueStats {
            name: self.name.clone(),
            pending,
        })
    }

    /// Queue depth alone, as sampled by the autoscaler on each tick.
    pub async fn depth(&self) -> JobProcessingResult<u64> {
        let mut conn = self.pool.get().await?;
        Ok(conn.llen(&self.name).await?)
    }

    /// List jobs matching a query. Scans `job:*` keys; acceptable for the
    /// small-volume HTTP/CLI introspection paths this serves, not a hot
    /// path.
    pub async fn list_jobs(&self, query: &JobQuery) -> JobProcessingResult<Vec<Job>> {
        let mut conn = self.pool.get().await?;
        let keys = conn.keys("job:*").await?;

        let mut jobs = Vec::new();
        for key in keys {
            if let Some(data) = conn.get(&key).await? {
                let job: Job = match serde_json::from_slice(&data) {
                    Ok(job) => job,
                    Err(_) => continue,
                };

                if let Some(status) = query.status {
                    if job.status != status {
                        continue;
                    }
                }
                if let Some(ref job_type) = query.job_type {
                    if &job.job_type != job_type {
                        continue;
                    }
                }
                jobs.push(job);
            }
        }

        if let Some(offset) = query.offset {
            jobs = jobs.into_iter().skip(offset).collect();
        }
        if let Some(limit) = query.limit {
            jobs.truncate(limit);
        }

        Ok(jobs)
    }

    pub async fn delete_job(&self, job_id: &JobId) -> JobProcessingResult<bool> {
        let mut conn = self.pool.get().await?;
        Ok(conn.del(&self.job_key(job_id)).await?)
    }

    pub async fn close(&self) -> JobProcessingResult<()> {
        self.pool.close().await?;
        Ok(())
    }
}

/// Queue depth, as consumed by the autoscaler and the health aggregator.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct QueueStats {
    pub name: String,
    pub pending: u64,
}

impl QueueStats {
    pub fn format(&self) -> String {
        format!("Queue '{}': pending={}", self.name, self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RedisConfig;

    #[tokio::test]
    async fn test_enqueue_dequeue() {
        let config = RedisConfig::development();
        let pool = RedisPool::new(config).await;

        if let Ok(pool) = pool {
            let queue = JobQueue::new(pool, "docflow_test_queue", Duration::from_secs(1));
            let _ = queue.list_jobs(&JobQuery::new()).await;

            let payload = serde_json::json!({"input_path": "/tmp/a.png"});
            let job = Job::new("media_processing", payload, 3);
            queue.enqueue(&job).await.unwrap();

            let cancel = CancellationToken::new();
            let dequeued = queue.dequeue(&cancel).await.unwrap();
            assert!(dequeued.is_some());

            let dequeued_job = dequeued.unwrap();
            assert_eq!(dequeued_job.id, job.id);
            assert_eq!(dequeued_job.status, JobStatus::Processing);
        }
    }

    #[tokio::test]
    async fn test_dequeue_honors_cancellation() {
        let config = RedisConfig::development();
        let pool = RedisPool::new(config).await;

        if let Ok(pool) = pool {
            let queue = JobQueue::new(pool, "docflow_test_queue_empty", Duration::from_secs(1));
            let cancel = CancellationToken::new();
            cancel.cancel();

            let result = queue.dequeue(&cancel).await;
            assert!(matches!(result, Err(JobError::Cancelled)));
        }
    }

    #[tokio::test]
    async fn test_complete_and_fail() {
        let config = RedisConfig::development();
        let pool = RedisPool::new(config).await;

        if let Ok(pool) = pool {
            let queue = JobQueue::new(pool, "docflow_test_queue_cf", Duration::from_millis(10));

            let job = Job::new("text_extraction", serde_json::json!({}), 1);
            queue.enqueue(&job).await.unwrap();

            let cancel = CancellationToken::new();
            let dequeued = queue.dequeue(&cancel).await.unwrap().unwrap();

            queue
                .complete(&dequeued.id, serde_json::json!({"pages": 3}))
                .await
                .unwrap();

            let record = queue.get_by_id(&dequeued.id).await.unwrap();
            assert_eq!(record.status, JobStatus::Completed);
        }
    }
}
