//! Configuration types

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default deadline attached to every retrieval.
pub const DEFAULT_RETRIEVAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default upper bound on ids per batch retrieval.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Default upper bound on results per prefix retrieval.
pub const DEFAULT_MAX_PREFIX_LIMIT: usize = 100;

/// Cache and retrieval configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Deadline for a retrieval task, measured from its creation.
    pub retrieval_timeout: Duration,
    /// Maximum distinct ids accepted by one batch retrieval.
    pub max_batch_size: usize,
    /// Maximum `limit` accepted by one prefix retrieval.
    pub max_prefix_limit: usize,
    /// Number of shards the gateway splits guilds across.
    pub shard_total: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            retrieval_timeout: DEFAULT_RETRIEVAL_TIMEOUT,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_prefix_limit: DEFAULT_MAX_PREFIX_LIMIT,
            shard_total: 1,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create CacheConfig from environment variables.
    ///
    /// Environment variables:
    /// - `SHARDCACHE_RETRIEVAL_TIMEOUT_MS`: Retrieval deadline in milliseconds (default: 10000)
    /// - `SHARDCACHE_MAX_BATCH_SIZE`: Maximum ids per batch retrieval (default: 100)
    /// - `SHARDCACHE_MAX_PREFIX_LIMIT`: Maximum results per prefix retrieval (default: 100)
    /// - `SHARDCACHE_SHARD_TOTAL`: Number of shards (default: 1)
    ///
    /// Values that fail to parse fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let retrieval_timeout = std::env::var("SHARDCACHE_RETRIEVAL_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.retrieval_timeout);

        let max_batch_size = std::env::var("SHARDCACHE_MAX_BATCH_SIZE")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.max_batch_size);

        let max_prefix_limit = std::env::var("SHARDCACHE_MAX_PREFIX_LIMIT")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.max_prefix_limit);

        let shard_total = std::env::var("SHARDCACHE_SHARD_TOTAL")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.shard_total);

        Self {
            retrieval_timeout,
            max_batch_size,
            max_prefix_limit,
            shard_total,
        }
    }

    /// Set the retrieval deadline.
    pub fn with_retrieval_timeout(mut self, timeout: Duration) -> Self {
        self.retrieval_timeout = timeout;
        self
    }

    /// Set the maximum batch size.
    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max;
        self
    }

    /// Set the maximum prefix limit.
    pub fn with_max_prefix_limit(mut self, max: usize) -> Self {
        self.max_prefix_limit = max;
        self
    }

    /// Set the shard total.
    pub fn with_shard_total(mut self, total: u32) -> Self {
        self.shard_total = total;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retrieval_timeout.is_zero() {
            return Err(invalid("retrieval_timeout", format!("{:?}", self.retrieval_timeout)));
        }
        if self.max_batch_size == 0 {
            return Err(invalid("max_batch_size", self.max_batch_size.to_string()));
        }
        if self.max_prefix_limit == 0 {
            return Err(invalid("max_prefix_limit", self.max_prefix_limit.to_string()));
        }
        if self.shard_total == 0 {
            return Err(invalid("shard_total", self.shard_total.to_string()));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: String) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value,
        reason: "must be greater than zero".to_string(),
    }
}
