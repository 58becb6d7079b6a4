//! Asynchronous document-processing job pipeline.
//!
//! ## Architecture
//!
//! Redis is the coordination substrate: a list holds queued job ids
//! (`LPUSH`/`BRPOP`), and a string key per job id holds its JSON record
//! (`SET`/`GET`). Workers pop one job at a time, invoke the handler
//! registered for its `type`, and write the outcome back.
//!
//! ## Features
//!
//! - At-least-once delivery via a single blocking FIFO, no priority queues
//! - Bounded retries with exponential backoff and jitter
//! - A depth-sampling autoscaler that grows and shrinks the worker pool
//!   between configured bounds, with a cooldown between scaling actions
//! - A type-to-handler registry so unknown job types fail terminally
//!   without consuming a retry

pub mod job;
pub mod pool;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod worker;

pub use job::{Job, JobId, JobQuery, JobResult, JobStatus};
pub use pool::{Pool, PoolStats};
pub use queue::{JobQueue, QueueStats};
pub use registry::JobRegistry;
pub use retry::ExponentialBackoff;
pub use worker::{Worker, WorkerId};

use std::time::Duration;
use serde::{Deserialize, Serialize};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

/// Job processing result type
pub type JobProcessingResult<T> = Result<T, JobError>;

/// Error types for job processing
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum JobError {
    #[error("Job serialization error: {0}")]
    Serialization(String),

    #[error("Job deserialization error: {0}")]
    Deserialization(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Worker error: {0}")]
    Worker(String),

    /// A processor-reported failure classified as retryable.
    #[error("Job execution failed: {0}")]
    Execution(String),

    /// Malformed payload, invalid parameters, or an unknown job type.
    /// Never retried (see `should_retry`).
    #[error("Job rejected: {0}")]
    Unrecoverable(String),

    #[error("Job timeout after {0}ms")]
    TimeoutMillis(u64),

    #[error("Job cancelled")]
    Cancelled,

    #[error("Job not found: {0}")]
    NotFound(JobId),
}

impl From<JobError> for crate::Error {
    fn from(err: JobError) -> Self {
        crate::Error::Other(err.to_string())
    }
}

impl From<crate::cache::CacheError> for JobError {
    fn from(err: crate::cache::CacheError) -> Self {
        JobError::Queue(format!("store error: {}", err))
    }
}

/// Job handler trait for executing jobs of a particular `type`.
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync {
    /// Execute the job, honoring `ctx` cancellation.
    async fn handle(&self, ctx: &JobContext, job: &Job) -> JobProcessingResult<JobResult>;

    /// Cheap probe for the health aggregator: can this processor currently
    /// do its work (required binaries present, credentials configured)?
    /// Reference handlers need nothing external, so they default to `true`.
    async fn available(&self) -> bool {
        true
    }
}

/// Job middleware trait for cross-cutting concerns around execution.
#[async_trait::async_trait]
pub trait JobMiddleware: Send + Sync {
    async fn before_execution(&self, job: &Job) -> JobProcessingResult<()>;
    async fn after_execution(&self, job: &Job, result: &JobResult) -> JobProcessingResult<()>;
    async fn on_failure(&self, job: &Job, error: &JobError) -> JobProcessingResult<()>;
}

/// Job context passed to handlers. Carries the worker's cancellation token
/// so a long-running processor can observe a shutdown request and return
/// `Err(JobError::Cancelled)` promptly instead of being forcibly aborted.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub queue: String,
    pub attempt: u32,
    pub max_attempts: u32,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

impl JobContext {
    pub fn new(job_id: JobId, queue: String, max_attempts: u32, timeout: Duration) -> Self {
        Self {
            job_id,
            queue,
            attempt: 1,
            max_attempts,
            started_at: chrono::Utc::now(),
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn elapsed(&self) -> Duration {
        let now = Utc::now();
        let duration_ms = (now - self.started_at).num_milliseconds();
        if duration_ms > 0 {
            Duration::from_millis(duration_ms as u64)
        } else {
            Duration::from_millis(0)
        }
    }

    pub fn has_timed_out(&self) -> bool {
        self.elapsed() > self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_context() {
        let context = JobContext::new(
            JobId::new_v4(),
            "documents_queue".to_string(),
            3,
            Duration::from_secs(300),
        );

        assert_eq!(context.attempt, 1);
        assert_eq!(context.max_attempts, 3);
        assert!(!context.is_last_attempt());
        assert!(!context.has_timed_out());
        assert!(!context.is_cancelled());
    }

    #[test]
    fn test_job_error_display() {
        let error = JobError::Execution("tool busy".to_string());
        assert!(error.to_string().contains("tool busy"));

        let error = JobError::TimeoutMillis(30000);
        assert!(error.to_string().contains("timeout"));
    }
}
