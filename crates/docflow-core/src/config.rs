use std::time::Duration;

use crate::Error;

fn env_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_secs(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_var(key, default_secs))
}

/// Worker pool sizing, retry, and autoscaler settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub max_concurrency: usize,
    pub min_workers: usize,
    pub queue_name: String,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub scale_up_threshold: u64,
    pub scale_down_threshold: u64,
    pub check_interval: Duration,
    pub scale_delay: Duration,
    /// Per-processor deadline, carried into the job's cancellation context.
    pub max_processing_time: Duration,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        Self {
            max_concurrency: env_var("MAX_CONCURRENCY", 10),
            min_workers: env_var("MIN_WORKERS", 1),
            queue_name: env_string("QUEUE_NAME", "documents_queue"),
            retry_count: env_var("RETRY_COUNT", 3),
            retry_delay: env_secs("RETRY_DELAY", 5),
            scale_up_threshold: env_var("SCALE_UP_THRESHOLD", 10),
            scale_down_threshold: env_var("SCALE_DOWN_THRESHOLD", 2),
            check_interval: env_secs("CHECK_INTERVAL", 10),
            scale_delay: env_secs("SCALE_DELAY", 30),
            max_processing_time: env_secs("MAX_PROCESSING_TIME", 300),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.min_workers == 0 {
            return Err(Error::config("MIN_WORKERS must be >= 1"));
        }
        if self.min_workers > self.max_concurrency {
            return Err(Error::config("MIN_WORKERS must be <= MAX_CONCURRENCY"));
        }
        if self.check_interval.is_zero() {
            return Err(Error::config("CHECK_INTERVAL must be > 0"));
        }
        Ok(())
    }
}

/// Content-addressed artifact cache settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl: Duration,
    pub max_size_bytes: u64,
    pub cleanup_age: Duration,
    pub directory: String,
}

impl CacheConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: env_var("ENABLED", true),
            ttl: env_secs("TTL", 24 * 3600),
            max_size_bytes: env_var("MAX_SIZE", 1024 * 1024 * 1024),
            cleanup_age: env_secs("CLEANUP_AGE", 7 * 24 * 3600),
            directory: env_string("DIRECTORY", "./cache"),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.max_size_bytes == 0 {
            return Err(Error::config("MAX_SIZE must be > 0"));
        }
        Ok(())
    }
}

/// Coordination store connection settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub redis_url: String,
}

impl StoreConfig {
    pub fn from_env() -> Self {
        Self {
            redis_url: env_string("REDIS_URL", "redis://127.0.0.1:6379"),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.redis_url.is_empty() {
            return Err(Error::config("REDIS_URL must not be empty"));
        }
        Ok(())
    }
}

/// HTTP front-end bind settings.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl HttpConfig {
    pub fn from_env() -> Self {
        Self {
            host: env_string("HTTP_HOST", "0.0.0.0"),
            port: env_var("HTTP_PORT", 8080),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.port == 0 {
            return Err(Error::config("HTTP_PORT must be > 0"));
        }
        Ok(())
    }
}

/// Logging settings; `directive` is fed straight into `tracing_subscriber::EnvFilter`.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub directive: String,
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self {
            directive: env_string("RUST_LOG", "info"),
        }
    }
}

/// Top-level process configuration, composed from per-concern groups.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub worker: WorkerConfig,
    pub cache: CacheConfig,
    pub store: StoreConfig,
    pub http: HttpConfig,
    pub log: LogConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, Error> {
        let config = Self {
            worker: WorkerConfig::from_env(),
            cache: CacheConfig::from_env(),
            store: StoreConfig::from_env(),
            http: HttpConfig::from_env(),
            log: LogConfig::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.worker.validate()?;
        self.cache.validate()?;
        self.store.validate()?;
        self.http.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_config_defaults_are_valid() {
        let config = WorkerConfig {
            max_concurrency: 10,
            min_workers: 1,
            queue_name: "documents_queue".to_string(),
            retry_count: 3,
            retry_delay: Duration::from_secs(5),
            scale_up_threshold: 10,
            scale_down_threshold: 2,
            check_interval: Duration::from_secs(10),
            scale_delay: Duration::from_secs(30),
            max_processing_time: Duration::from_secs(300),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn worker_config_rejects_min_above_max() {
        let config = WorkerConfig {
            max_concurrency: 2,
            min_workers: 5,
            queue_name: "q".to_string(),
            retry_count: 0,
            retry_delay: Duration::from_secs(1),
            scale_up_threshold: 1,
            scale_down_threshold: 0,
            check_interval: Duration::from_secs(1),
            scale_delay: Duration::from_secs(1),
            max_processing_time: Duration::from_secs(300),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn cache_config_rejects_zero_size() {
        let config = CacheConfig {
            enabled: true,
            ttl: Duration::from_secs(1),
            max_size_bytes: 0,
            cleanup_age: Duration::from_secs(1),
            directory: "./cache".to_string(),
        };
        assert!(config.validate().is_err());
    }
}
