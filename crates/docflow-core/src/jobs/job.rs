//! Job types and definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique job identifier
pub type JobId = Uuid;

/// Job execution status. Serializes to the lowercase wire form used in
/// `Job`'s JSON record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl Default for JobStatus {
    fn default() -> Self {
        JobStatus::Pending
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl JobStatus {
    /// `completed` and `failed` are terminal; no further transition is legal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }
}

/// Outcome of a successful processor invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub data: serde_json::Value,
}

impl JobResult {
    pub fn new(data: serde_json::Value) -> Self {
        Self { data }
    }
}

/// A unit of asynchronous document-processing work, and the record stored
/// under `job:<id>` in the coordination store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,

    #[serde(rename = "type")]
    pub job_type: String,

    pub status: JobStatus,

    pub payload: serde_json::Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub retry_count: u32,

    pub max_retries: u32,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new job for submission. `max_retries` is stamped from the
    /// caller's worker configuration.
    pub fn new(job_type: impl Into<String>, payload: serde_json::Value, max_retries: u32) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new_v4(),
            job_type: job_type.into(),
            status: JobStatus::Pending,
            payload,
            result: None,
            error: None,
            retry_count: 0,
            max_retries,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Transition to `processing`, bumping `updated_at`. Called by the
    /// queue on dequeue, not by the caller.
    pub fn mark_processing(&mut self) {
        self.status = JobStatus::Processing;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self, result: serde_json::Value) {
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.error = None;
        let now = Utc::now();
        self.updated_at = now;
        self.completed_at = Some(now);
    }

    /// Record a failed attempt. Increments `retry_count` unless
    /// `unrecoverable` is set (unknown type / malformed input never
    /// consumes a retry — see the root error taxonomy). Returns `true`
    /// if the job is now terminally failed.
    pub fn mark_failed(&mut self, error_msg: impl Into<String>, unrecoverable: bool) -> bool {
        self.error = Some(error_msg.into());
        self.updated_at = Utc::now();

        if !unrecoverable {
            self.retry_count += 1;
        }

        if unrecoverable || self.retry_count >= self.max_retries {
            self.status = JobStatus::Failed;
            self.completed_at = Some(self.updated_at);
            true
        } else {
            self.status = JobStatus::Pending;
            false
        }
    }

    pub fn can_retry(&self) -> bool {
        self.status == JobStatus::Pending && self.retry_count < self.max_retries
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    pub fn from_json(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

/// Filters for listing/searching jobs (used by the HTTP and CLI surfaces).
#[derive(Debug, Default, Clone)]
pub struct JobQuery {
    pub status: Option<JobStatus>,
    pub job_type: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl JobQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_job_type(mut self, job_type: impl Into<String>) -> Self {
        self.job_type = Some(job_type.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_wire_form() {
        assert_eq!(serde_json::to_value(JobStatus::Pending).unwrap(), "pending");
        assert_eq!(
            serde_json::to_value(JobStatus::Processing).unwrap(),
            "processing"
        );
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
    }

    #[test]
    fn test_job_creation() {
        let payload = serde_json::json!({"input_path": "/tmp/a.png"});
        let job = Job::new("media_processing", payload, 3);

        assert_eq!(job.job_type, "media_processing");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.max_retries, 3);
    }

    #[test]
    fn test_job_lifecycle_success() {
        let mut job = Job::new("text_extraction", serde_json::json!({}), 3);
        job.mark_processing();
        assert_eq!(job.status, JobStatus::Processing);

        job.mark_completed(serde_json::json!({"output_path": "/tmp/out"}));
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.completed_at.is_some());
        assert!(job.result.is_some());
    }

    #[test]
    fn test_job_retry_then_terminal_failure() {
        let mut job = Job::new("text_extraction", serde_json::json!({}), 1);
        job.mark_processing();

        let terminal = job.mark_failed("tool busy", false);
        assert!(!terminal);
        assert_eq!(job.retry_count, 1);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.can_retry() == false, "retry_count == max_retries");

        let terminal = job.mark_failed("tool busy again", false);
        assert!(terminal);
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn test_unrecoverable_failure_skips_retry_count() {
        let mut job = Job::new("unknown_type", serde_json::json!({}), 3);
        let terminal = job.mark_failed("unknown type", true);
        assert!(terminal);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn test_wire_format_round_trip() {
        let job = Job::new("ocr_processing", serde_json::json!({"input_path": "x"}), 3);
        let value = job.to_json().unwrap();
        assert_eq!(value["type"], "ocr_processing");
        assert_eq!(value["retry_count"], 0);
        assert!(value.get("result").is_none());

        let decoded = Job::from_json(value).unwrap();
        assert_eq!(decoded.id, job.id);
        assert_eq!(decoded.job_type, job.job_type);
    }
}
