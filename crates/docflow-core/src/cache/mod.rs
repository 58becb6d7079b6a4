//! Coordination store client (C1): the Redis-backed substrate the job queue
//! builds on.
//!
//! Five primitives are used by the rest of the crate: `LPUSH`/`BRPOP` (the
//! queue's FIFO), `SET`/`GET`/`DEL` (job records), and `LLEN` (depth sampling
//! for the autoscaler and health reporting).

pub mod config;
pub mod connection;

pub use config::RedisConfig;
pub use connection::{RedisConnection, RedisPool};

/// Cache result type alias
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific error types
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis connection error: {0}")]
    ConnectionError(String),

    #[error("Operation failed: {0}")]
    OperationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Key not found: {0}")]
    NotFound(String),
}

impl From<CacheError> for crate::Error {
    fn from(err: CacheError) -> Self {
        crate::Error::Cache(err.to_string())
    }
}
