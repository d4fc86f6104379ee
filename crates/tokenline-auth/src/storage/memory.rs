//! In-process refresh token store.
//!
//! Single-instance and not durable. Every mutation runs under one write lock,
//! which gives `rotate` the same check-and-set semantics as the conditional
//! update used by the PostgreSQL backend.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::refresh_token::{RefreshTokenStorage, RotationOutcome};
use crate::types::RefreshTokenRecord;

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<Uuid, RefreshTokenRecord>,
    by_hash: HashMap<String, Uuid>,
}

impl Inner {
    fn insert(&mut self, record: &RefreshTokenRecord) -> AuthResult<()> {
        if self.by_hash.contains_key(&record.token_hash) {
            return Err(AuthError::internal("duplicate refresh token hash"));
        }
        if self.records.contains_key(&record.id) {
            return Err(AuthError::internal("duplicate refresh token id"));
        }
        self.by_hash.insert(record.token_hash.clone(), record.id);
        self.records.insert(record.id, record.clone());
        Ok(())
    }

    fn by_hash(&self, token_hash: &str) -> Option<&RefreshTokenRecord> {
        self.by_hash
            .get(token_hash)
            .and_then(|id| self.records.get(id))
    }

    fn revoke_where<F>(&mut self, now: OffsetDateTime, predicate: F) -> u64
    where
        F: Fn(&RefreshTokenRecord) -> bool,
    {
        let mut count = 0;
        for record in self.records.values_mut() {
            if !record.revoked && predicate(record) {
                record.revoked = true;
                record.updated_at = now;
                count += 1;
            }
        }
        count
    }
}

/// Refresh token store backed by a locked `HashMap`.
#[derive(Debug, Default)]
pub struct InMemoryRefreshTokenStorage {
    inner: RwLock<Inner>,
}

impl InMemoryRefreshTokenStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records, revoked ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Returns `true` if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns every record of a family, oldest first.
    #[must_use]
    pub fn family(&self, family_id: Uuid) -> Vec<RefreshTokenRecord> {
        let mut records: Vec<_> = self
            .inner
            .read()
            .records
            .values()
            .filter(|r| r.family_id == family_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.issued_at);
        records
    }

    /// Overwrites the timestamps of a stored record so tests can age rows.
    ///
    /// Revocation, chain linkage and the hash are kept from the stored
    /// record. Returns `false` if no record has that id.
    #[cfg(any(test, feature = "test-util"))]
    pub fn replace(&self, record: RefreshTokenRecord) -> bool {
        let mut inner = self.inner.write();
        let Some(stored) = inner.records.get_mut(&record.id) else {
            return false;
        };
        stored.issued_at = record.issued_at;
        stored.sliding_expires_at = record.sliding_expires_at;
        stored.absolute_expires_at = record.absolute_expires_at;
        stored.created_at = record.created_at;
        stored.updated_at = record.updated_at;
        true
    }
}

#[async_trait]
impl RefreshTokenStorage for InMemoryRefreshTokenStorage {
    async fn insert(&self, record: &RefreshTokenRecord) -> AuthResult<()> {
        self.inner.write().insert(record)
    }

    async fn find_live_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshTokenRecord>> {
        Ok(self
            .inner
            .read()
            .by_hash(token_hash)
            .filter(|r| !r.revoked)
            .cloned())
    }

    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshTokenRecord>> {
        Ok(self.inner.read().by_hash(token_hash).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<RefreshTokenRecord>> {
        Ok(self.inner.read().records.get(&id).cloned())
    }

    async fn mark_revoked(
        &self,
        id: Uuid,
        replaced_by: Option<Uuid>,
        now: OffsetDateTime,
    ) -> AuthResult<bool> {
        let mut inner = self.inner.write();
        match inner.records.get_mut(&id) {
            Some(record) if !record.revoked => {
                record.revoked = true;
                record.replaced_by = replaced_by;
                record.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn rotate(
        &self,
        old_id: Uuid,
        successor: &RefreshTokenRecord,
        now: OffsetDateTime,
    ) -> AuthResult<RotationOutcome> {
        let mut inner = self.inner.write();

        match inner.records.get(&old_id) {
            Some(old) if !old.revoked => {}
            _ => return Ok(RotationOutcome::Superseded),
        }

        // Insert first so a duplicate hash leaves the old record untouched.
        inner.insert(successor)?;

        if let Some(old) = inner.records.get_mut(&old_id) {
            old.revoked = true;
            old.replaced_by = Some(successor.id);
            old.updated_at = now;
        }

        Ok(RotationOutcome::Rotated)
    }

    async fn revoke_all_for_subject(
        &self,
        subject_id: &str,
        now: OffsetDateTime,
    ) -> AuthResult<u64> {
        Ok(self
            .inner
            .write()
            .revoke_where(now, |r| r.subject_id == subject_id))
    }

    async fn revoke_family(&self, family_id: Uuid, now: OffsetDateTime) -> AuthResult<u64> {
        Ok(self
            .inner
            .write()
            .revoke_where(now, |r| r.family_id == family_id))
    }

    async fn find_expired_or_stale_revoked_ids(
        &self,
        now: OffsetDateTime,
        revocation_cutoff: OffsetDateTime,
        limit: usize,
    ) -> AuthResult<Vec<Uuid>> {
        Ok(self
            .inner
            .read()
            .records
            .values()
            .filter(|r| r.is_collectable(now, revocation_cutoff))
            .take(limit)
            .map(|r| r.id)
            .collect())
    }

    async fn delete_by_ids(&self, ids: &[Uuid]) -> AuthResult<u64> {
        let mut inner = self.inner.write();
        let mut deleted = 0;
        for id in ids {
            if let Some(record) = inner.records.remove(id) {
                inner.by_hash.remove(&record.token_hash);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn list_active_for_subject(
        &self,
        subject_id: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Vec<RefreshTokenRecord>> {
        let mut records: Vec<_> = self
            .inner
            .read()
            .records
            .values()
            .filter(|r| r.subject_id == subject_id && r.is_live(now))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClientContext;
    use time::Duration;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2025-01-01 00:00 UTC);

    fn record(subject: &str, hash: &str) -> RefreshTokenRecord {
        RefreshTokenRecord::new_family(
            subject,
            hash,
            NOW,
            Duration::days(30),
            Duration::days(90),
            ClientContext::default(),
        )
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = InMemoryRefreshTokenStorage::new();
        let r = record("alice", "h1");
        store.insert(&r).await.unwrap();

        assert_eq!(store.find_live_by_hash("h1").await.unwrap(), Some(r.clone()));
        assert_eq!(store.find_by_id(r.id).await.unwrap(), Some(r));
        assert!(store.find_live_by_hash("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_hash_rejected() {
        let store = InMemoryRefreshTokenStorage::new();
        store.insert(&record("alice", "h1")).await.unwrap();
        assert!(store.insert(&record("bob", "h1")).await.is_err());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_live_lookup_excludes_revoked() {
        let store = InMemoryRefreshTokenStorage::new();
        let r = record("alice", "h1");
        store.insert(&r).await.unwrap();

        assert!(store.mark_revoked(r.id, None, NOW).await.unwrap());
        assert!(store.find_live_by_hash("h1").await.unwrap().is_none());

        let stored = store.find_by_hash("h1").await.unwrap().unwrap();
        assert!(stored.revoked);
        assert!(stored.replaced_by.is_none());

        // One-way and idempotent.
        assert!(!store.mark_revoked(r.id, Some(Uuid::new_v4()), NOW).await.unwrap());
        assert!(store.find_by_id(r.id).await.unwrap().unwrap().replaced_by.is_none());
    }

    #[tokio::test]
    async fn test_rotate_links_and_inserts() {
        let store = InMemoryRefreshTokenStorage::new();
        let old = record("alice", "h1");
        store.insert(&old).await.unwrap();

        let at = NOW + Duration::days(1);
        let next = old.successor("h2", at, Duration::days(30), ClientContext::default());
        assert_eq!(
            store.rotate(old.id, &next, at).await.unwrap(),
            RotationOutcome::Rotated
        );

        let old_stored = store.find_by_id(old.id).await.unwrap().unwrap();
        assert!(old_stored.was_rotated());
        assert_eq!(old_stored.replaced_by, Some(next.id));
        assert_eq!(old_stored.updated_at, at);
        assert!(store.find_live_by_hash("h2").await.unwrap().is_some());

        // A second rotation of the same record loses.
        let other = old.successor("h3", at, Duration::days(30), ClientContext::default());
        assert_eq!(
            store.rotate(old.id, &other, at).await.unwrap(),
            RotationOutcome::Superseded
        );
        assert!(store.find_by_hash("h3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rotate_with_duplicate_hash_writes_nothing() {
        let store = InMemoryRefreshTokenStorage::new();
        let old = record("alice", "h1");
        store.insert(&old).await.unwrap();
        store.insert(&record("bob", "taken")).await.unwrap();

        let next = old.successor("taken", NOW, Duration::days(30), ClientContext::default());
        assert!(store.rotate(old.id, &next, NOW).await.is_err());
        assert!(store.find_live_by_hash("h1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_bulk_revocation() {
        let store = InMemoryRefreshTokenStorage::new();
        let a1 = record("alice", "a1");
        let a2 = record("alice", "a2");
        let b1 = record("bob", "b1");
        for r in [&a1, &a2, &b1] {
            store.insert(r).await.unwrap();
        }

        assert_eq!(store.revoke_all_for_subject("alice", NOW).await.unwrap(), 2);
        assert_eq!(store.revoke_all_for_subject("alice", NOW).await.unwrap(), 0);
        assert!(store.find_live_by_hash("b1").await.unwrap().is_some());

        assert_eq!(store.revoke_family(b1.family_id, NOW).await.unwrap(), 1);
        assert!(store.find_live_by_hash("b1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_queries() {
        let store = InMemoryRefreshTokenStorage::new();
        let now = NOW + Duration::days(10);
        let cutoff = now - Duration::days(7);

        let live = record("alice", "live");
        let mut fresh_revoked = record("alice", "fresh");
        fresh_revoked.revoked = true;
        fresh_revoked.updated_at = NOW + Duration::days(5);
        let mut stale_revoked = record("alice", "stale");
        stale_revoked.revoked = true;
        stale_revoked.updated_at = NOW + Duration::days(1);
        let mut expired = record("alice", "expired");
        expired.sliding_expires_at = NOW + Duration::days(2);

        for r in [&live, &fresh_revoked, &stale_revoked, &expired] {
            store.insert(r).await.unwrap();
        }

        let mut ids = store
            .find_expired_or_stale_revoked_ids(now, cutoff, 10)
            .await
            .unwrap();
        ids.sort();
        let mut expected = vec![stale_revoked.id, expired.id];
        expected.sort();
        assert_eq!(ids, expected);

        let limited = store
            .find_expired_or_stale_revoked_ids(now, cutoff, 1)
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);

        assert_eq!(store.delete_by_ids(&ids).await.unwrap(), 2);
        assert_eq!(store.delete_by_ids(&ids).await.unwrap(), 0);
        assert_eq!(store.len(), 2);
        assert!(store.find_by_hash("stale").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_active_for_subject() {
        let store = InMemoryRefreshTokenStorage::new();
        let first = record("alice", "a1");
        let mut second = record("alice", "a2");
        second.issued_at = NOW + Duration::hours(1);
        let revoked = record("alice", "a3");
        store.insert(&first).await.unwrap();
        store.insert(&second).await.unwrap();
        store.insert(&revoked).await.unwrap();
        store.insert(&record("bob", "b1")).await.unwrap();
        store.mark_revoked(revoked.id, None, NOW).await.unwrap();

        let active = store
            .list_active_for_subject("alice", NOW + Duration::days(1))
            .await
            .unwrap();
        let ids: Vec<_> = active.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);

        let later = store
            .list_active_for_subject("alice", NOW + Duration::days(31))
            .await
            .unwrap();
        assert!(later.is_empty());
    }

    #[tokio::test]
    async fn test_replace_only_moves_timestamps() {
        let store = InMemoryRefreshTokenStorage::new();
        let r = record("alice", "h1");
        store.insert(&r).await.unwrap();
        store.mark_revoked(r.id, None, NOW).await.unwrap();

        let mut aged = r.clone();
        aged.token_hash = "h2".to_string();
        aged.revoked = false;
        aged.sliding_expires_at = NOW + Duration::days(1);
        assert!(store.replace(aged));

        let stored = store.find_by_id(r.id).await.unwrap().unwrap();
        assert!(stored.revoked);
        assert_eq!(stored.token_hash, "h1");
        assert_eq!(stored.sliding_expires_at, NOW + Duration::days(1));
        assert!(store.find_by_hash("h2").await.unwrap().is_none());
        assert!(store.find_live_by_hash("h1").await.unwrap().is_none());

        assert!(!store.replace(record("bob", "b1")));
        assert_eq!(store.len(), 1);
    }
}
