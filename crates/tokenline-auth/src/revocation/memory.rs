//! In-process revocation cache.
//!
//! Entries are keyed by credential hash and hold their expiry instant, read
//! through the injected [`Clock`]. Expired entries are invisible to
//! [`contains`](RevocationCache::contains) immediately and physically removed
//! by the sweeper.
//!
//! This backend is strictly single-instance and does not survive a restart.

use async_trait::async_trait;
use dashmap::DashMap;
use time::{Duration, OffsetDateTime};

use crate::AuthResult;
use crate::clock::DynClock;
use crate::revocation::{RevocationCache, revocation_key};

/// Denylist backed by a `DashMap`.
pub struct InMemoryRevocationCache {
    entries: DashMap<String, OffsetDateTime>,
    clock: DynClock,
}

impl InMemoryRevocationCache {
    /// Creates an empty cache reading time from `clock`.
    #[must_use]
    pub fn new(clock: DynClock) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Number of physically stored entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RevocationCache for InMemoryRevocationCache {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn needs_sweep(&self) -> bool {
        true
    }

    async fn add(&self, raw_access: &str, ttl: Duration) -> AuthResult<()> {
        if !ttl.is_positive() {
            return Ok(());
        }

        let expires_at = self.clock.now().saturating_add(ttl);
        self.entries
            .entry(revocation_key(raw_access))
            .and_modify(|existing| {
                if expires_at > *existing {
                    *existing = expires_at;
                }
            })
            .or_insert(expires_at);
        Ok(())
    }

    async fn contains(&self, raw_access: &str) -> AuthResult<bool> {
        let now = self.clock.now();
        Ok(self
            .entries
            .get(&revocation_key(raw_access))
            .is_some_and(|expires_at| now < *expires_at))
    }

    async fn purge_expired(&self) -> AuthResult<u64> {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| now < *expires_at);
        Ok(before.saturating_sub(self.entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn cache() -> (Arc<ManualClock>, InMemoryRevocationCache) {
        let clock = Arc::new(ManualClock::starting_now());
        let cache = InMemoryRevocationCache::new(clock.clone());
        (clock, cache)
    }

    #[tokio::test]
    async fn test_add_then_contains() {
        let (_, cache) = cache();
        cache.add("access-1", Duration::minutes(10)).await.unwrap();

        assert!(cache.contains("access-1").await.unwrap());
        assert!(!cache.contains("access-2").await.unwrap());
    }

    #[tokio::test]
    async fn test_entry_expires_with_clock() {
        let (clock, cache) = cache();
        cache.add("access-1", Duration::minutes(10)).await.unwrap();

        clock.advance(Duration::minutes(9));
        assert!(cache.contains("access-1").await.unwrap());

        clock.advance(Duration::minutes(1));
        assert!(!cache.contains("access-1").await.unwrap());

        // Still physically present until swept.
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.purge_expired().await.unwrap(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_non_positive_ttl_is_noop() {
        let (_, cache) = cache();
        cache.add("access-1", Duration::ZERO).await.unwrap();
        cache.add("access-2", Duration::seconds(-5)).await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_re_adding_keeps_longest_ttl() {
        let (clock, cache) = cache();
        cache.add("access-1", Duration::minutes(10)).await.unwrap();
        cache.add("access-1", Duration::minutes(1)).await.unwrap();

        clock.advance(Duration::minutes(5));
        assert!(cache.contains("access-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_keeps_live_entries() {
        let (clock, cache) = cache();
        cache.add("short", Duration::minutes(1)).await.unwrap();
        cache.add("long", Duration::minutes(30)).await.unwrap();

        clock.advance(Duration::minutes(2));
        assert_eq!(cache.purge_expired().await.unwrap(), 1);
        assert!(cache.contains("long").await.unwrap());
    }

    #[test]
    fn test_backend_flags() {
        let (_, cache) = cache();
        assert_eq!(cache.backend_name(), "memory");
        assert!(cache.needs_sweep());
    }
}
