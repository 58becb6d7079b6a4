pub mod artifact_cache;
pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod jobs;

pub use artifact_cache::{ArtifactCache, ArtifactCacheError, CacheEntry};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use health::{FullStatus, HealthAggregator, Liveness, Readiness};
pub use jobs::{Job, JobContext, JobError, JobHandler, JobId, JobQueue, JobQuery, JobRegistry, JobResult, JobStatus, Pool, PoolStats};

/// Current version of docflow-core.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_error_creation() {
        let err = Error::validation("Test validation error");
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.category(), "validation");
    }
}
