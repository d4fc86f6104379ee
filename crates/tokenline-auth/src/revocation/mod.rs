//! Access credential denylist.
//!
//! Access credentials are stateless, so logout cannot invalidate them at the
//! source. Instead their hash is written to a [`RevocationCache`] with a TTL
//! equal to the credential's remaining lifetime; past that point the
//! credential would be rejected as expired anyway.
//!
//! # Backends
//!
//! One interface, selected once at startup by capability probing:
//!
//! - Shared TTL-native cache (`tokenline-auth-redis`): visible to every
//!   instance, entries expire natively
//! - [`InMemoryRevocationCache`]: single instance, lost on restart, needs a
//!   periodic sweep ([`spawn_sweeper`])

pub mod memory;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::AuthResult;
use crate::token::hash_token;

pub use memory::InMemoryRevocationCache;

/// TTL-bounded set of revoked access credentials.
#[async_trait]
pub trait RevocationCache: Send + Sync {
    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Whether expired entries must be removed by [`purge_expired`](Self::purge_expired).
    fn needs_sweep(&self) -> bool {
        false
    }

    /// Denylists a raw access credential for `ttl`.
    ///
    /// A non-positive `ttl` is a no-op: the credential has already expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store is unavailable.
    async fn add(&self, raw_access: &str, ttl: Duration) -> AuthResult<()>;

    /// Returns `true` if the raw access credential is denylisted and its
    /// entry has not expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store is unavailable.
    async fn contains(&self, raw_access: &str) -> AuthResult<bool>;

    /// Removes expired entries. Returns the number removed.
    ///
    /// Backends with native expiry return `0`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store is unavailable.
    async fn purge_expired(&self) -> AuthResult<u64> {
        Ok(0)
    }
}

/// Shared, dynamically dispatched revocation cache.
pub type DynRevocationCache = Arc<dyn RevocationCache>;

/// Derives the denylist key for a raw access credential.
///
/// Raw credentials are never used as keys.
#[must_use]
pub fn revocation_key(raw_access: &str) -> String {
    hash_token(raw_access)
}

/// Spawns the periodic sweep of a cache without native expiry.
///
/// Failures are logged and retried on the next tick. The task exits when
/// `shutdown` is cancelled.
pub fn spawn_sweeper(
    cache: DynRevocationCache,
    interval: StdDuration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(backend = cache.backend_name(), "Revocation sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {}
            }

            match cache.purge_expired().await {
                Ok(removed) if removed > 0 => {
                    tracing::debug!(removed, "Revocation cache sweep completed");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Revocation cache sweep failed");
                }
                _ => {}
            }
        }
    })
}
