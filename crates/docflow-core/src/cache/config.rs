//! Coordination store connection configuration

use std::time::Duration;

/// Redis connection configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis server URL (redis://host:port/db)
    pub url: String,

    /// Connection pool size
    pub pool_size: usize,

    /// Connection timeout
    pub connect_timeout_ms: u64,

    /// Max reconnect attempts before giving up
    pub max_retries: u32,

    /// Delay between reconnect attempts
    pub retry_delay_ms: u64,

    /// Key prefix to avoid collisions with other users of the store
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            pool_size: 10,
            connect_timeout_ms: 5000,
            max_retries: 3,
            retry_delay_ms: 1000,
            key_prefix: "docflow".to_string(),
        }
    }
}

impl RedisConfig {
    /// Build from the `store` group of the process configuration.
    pub fn from_store_config(store: &crate::config::StoreConfig) -> Self {
        Self {
            url: store.redis_url.clone(),
            ..Self::default()
        }
    }

    pub fn development() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            pool_size: 5,
            connect_timeout_ms: 2000,
            ..Self::default()
        }
    }

    /// Get connect timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Get retry delay as Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_store_config_carries_url() {
        let store = crate::config::StoreConfig {
            redis_url: "redis://example:6380".to_string(),
        };
        let redis = RedisConfig::from_store_config(&store);
        assert_eq!(redis.url, "redis://example:6380");
    }
}
