//! # tokenline-auth-redis
//!
//! Redis-backed [`RevocationCache`] for deployments with more than one
//! instance. Entries are written with `SET .. EX` so Redis expires them
//! natively and no sweep is needed.
//!
//! Use [`create_revocation_cache`] at startup: it probes Redis once and falls
//! back to the in-process cache when Redis is disabled or unreachable.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use time::Duration;
use tokenline_auth::revocation::revocation_key;
use tokenline_auth::{
    AuthError, AuthResult, DynClock, DynRevocationCache, InMemoryRevocationCache, RevocationCache,
};

/// Redis connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Enable Redis (gracefully degrades without it)
    /// Default: false (single-instance deployments)
    #[serde(default)]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connection timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,

    /// Prefix prepended to every denylist key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

fn default_key_prefix() -> String {
    "tokenline:revoked:".to_string()
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
            key_prefix: default_key_prefix(),
        }
    }
}

/// Errors raised by the Redis denylist.
#[derive(Debug, thiserror::Error)]
pub enum RedisCacheError {
    #[error("Failed to create Redis pool: {0}")]
    CreatePool(#[from] deadpool_redis::CreatePoolError),

    #[error("Failed to get Redis connection: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("Redis command failed: {0}")]
    Command(#[from] redis::RedisError),
}

impl From<RedisCacheError> for AuthError {
    fn from(err: RedisCacheError) -> Self {
        AuthError::store_unavailable(err.to_string())
    }
}

/// Denylist stored in Redis with native key expiry.
#[derive(Clone)]
pub struct RedisRevocationCache {
    pool: Pool,
    key_prefix: String,
}

impl RedisRevocationCache {
    /// Wraps an existing pool.
    pub fn new(pool: Pool, key_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            key_prefix: key_prefix.into(),
        }
    }

    /// Builds a pool from `config` without connecting.
    pub fn from_config(config: &RedisConfig) -> Result<Self, RedisCacheError> {
        Ok(Self::new(build_pool(config)?, config.key_prefix.clone()))
    }

    fn key(&self, raw_access: &str) -> String {
        format!("{}{}", self.key_prefix, revocation_key(raw_access))
    }

    async fn set_entry(&self, key: &str, seconds: u64) -> Result<(), RedisCacheError> {
        let mut conn = self.pool.get().await?;
        conn.set_ex::<_, _, ()>(key, "1", seconds).await?;
        Ok(())
    }

    async fn has_entry(&self, key: &str) -> Result<bool, RedisCacheError> {
        let mut conn = self.pool.get().await?;
        Ok(conn.exists::<_, bool>(key).await?)
    }
}

impl std::fmt::Debug for RedisRevocationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRevocationCache")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

/// Converts a TTL to whole seconds for `EX`, rounding up.
///
/// Returns `None` when the TTL is not positive.
fn ttl_seconds(ttl: Duration) -> Option<u64> {
    if !ttl.is_positive() {
        return None;
    }
    let mut secs = ttl.whole_seconds();
    if ttl.subsec_nanoseconds() > 0 {
        secs += 1;
    }
    u64::try_from(secs.max(1)).ok()
}

#[async_trait]
impl RevocationCache for RedisRevocationCache {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn add(&self, raw_access: &str, ttl: Duration) -> AuthResult<()> {
        let Some(seconds) = ttl_seconds(ttl) else {
            return Ok(());
        };
        let key = self.key(raw_access);
        self.set_entry(&key, seconds).await.map_err(|e| {
            tracing::warn!(error = %e, "Redis denylist SET failed");
            AuthError::from(e)
        })?;
        tracing::debug!(ttl_secs = seconds, "Access credential denylisted (redis)");
        Ok(())
    }

    async fn contains(&self, raw_access: &str) -> AuthResult<bool> {
        let key = self.key(raw_access);
        self.has_entry(&key).await.map_err(|e| {
            tracing::warn!(error = %e, "Redis denylist EXISTS failed");
            AuthError::from(e)
        })
    }
}

fn build_pool(config: &RedisConfig) -> Result<Pool, RedisCacheError> {
    let timeout = StdDuration::from_millis(config.timeout_ms);
    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let mut pool_config = redis_config.pool.unwrap_or_default();
    pool_config.max_size = config.pool_size;
    pool_config.timeouts.wait = Some(timeout);
    pool_config.timeouts.create = Some(timeout);
    pool_config.timeouts.recycle = Some(timeout);
    redis_config.pool = Some(pool_config);

    Ok(redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1))?)
}

/// Selects the denylist backend for this process.
///
/// Uses Redis when it is enabled and answers a connection probe, otherwise
/// the in-process cache (which needs the periodic sweeper).
pub async fn create_revocation_cache(config: &RedisConfig, clock: DynClock) -> DynRevocationCache {
    if !config.enabled {
        tracing::info!("Redis disabled, using in-memory revocation cache");
        return Arc::new(InMemoryRevocationCache::new(clock));
    }

    tracing::info!(url = %config.url, "Connecting to Redis");

    let pool = match build_pool(config) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to create Redis pool. Falling back to in-memory revocation cache."
            );
            return Arc::new(InMemoryRevocationCache::new(clock));
        }
    };

    match pool.get().await {
        Ok(_) => {
            tracing::info!("Connected to Redis, using shared revocation cache");
            Arc::new(RedisRevocationCache::new(pool, config.key_prefix.clone()))
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to connect to Redis. Falling back to in-memory revocation cache."
            );
            Arc::new(InMemoryRevocationCache::new(clock))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_rounds_up_to_whole_seconds() {
        assert_eq!(ttl_seconds(Duration::seconds(30)), Some(30));
        assert_eq!(ttl_seconds(Duration::milliseconds(1500)), Some(2));
        assert_eq!(ttl_seconds(Duration::milliseconds(1)), Some(1));
        assert_eq!(ttl_seconds(Duration::ZERO), None);
        assert_eq!(ttl_seconds(Duration::seconds(-5)), None);
    }

    #[test]
    fn test_config_defaults() {
        let config = RedisConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.url, "redis://localhost:6379");
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.key_prefix, "tokenline:revoked:");
    }

    #[test]
    fn test_keys_are_prefixed_hashes() {
        let cache = RedisRevocationCache::from_config(&RedisConfig::default()).unwrap();
        let key = cache.key("header.payload.signature");
        assert!(key.starts_with("tokenline:revoked:"));
        assert!(!key.contains("payload"));
        assert_eq!(key.len(), "tokenline:revoked:".len() + 64);
    }

    #[test]
    fn test_error_maps_to_store_unavailable() {
        let err = RedisCacheError::Command(redis::RedisError::from((
            redis::ErrorKind::IoError,
            "connection reset",
        )));
        let auth: AuthError = err.into();
        assert!(auth.is_retryable());
    }
}
