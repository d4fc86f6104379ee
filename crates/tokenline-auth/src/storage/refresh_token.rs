//! Refresh token storage trait.
//!
//! This module defines the query contract the rotation engine depends on.
//!
//! # Security Considerations
//!
//! - Records are looked up by SHA-256 hash only; raw credentials never reach storage
//! - Rotation must be a single atomic unit: a conditional revoke of the old
//!   record plus the insert of its successor
//! - Revocation is one-way

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::types::RefreshTokenRecord;

/// Result of an atomic rotation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationOutcome {
    /// The old record was still unrevoked; it is now revoked and linked to
    /// the successor, which has been inserted.
    Rotated,

    /// The old record had already been revoked by a concurrent caller.
    /// Nothing was written.
    Superseded,
}

/// Storage trait for refresh token records.
///
/// # Implementations
///
/// - [`InMemoryRefreshTokenStorage`](crate::storage::InMemoryRefreshTokenStorage) - single-process
/// - `tokenline-auth-postgres` - PostgreSQL storage backend
///
/// # Atomicity
///
/// [`rotate`](Self::rotate) is the only operation with ordering requirements.
/// Two concurrent rotations of the same record must race to exactly one
/// [`RotationOutcome::Rotated`]. A timed-out or failed rotation must leave
/// either both writes or neither visible.
#[async_trait]
pub trait RefreshTokenStorage: Send + Sync {
    /// Stores a new record.
    ///
    /// # Errors
    ///
    /// Returns an error if the hash already exists or storage is unavailable.
    async fn insert(&self, record: &RefreshTokenRecord) -> AuthResult<()>;

    /// Finds an unrevoked record by hash.
    ///
    /// Revoked rows are never returned, even though they still exist.
    /// Expiry is not checked here.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_live_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshTokenRecord>>;

    /// Finds a record by hash regardless of revocation status.
    ///
    /// Used for replay detection after a live lookup misses.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshTokenRecord>>;

    /// Finds a record by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<RefreshTokenRecord>>;

    /// Revokes a record if it is still unrevoked.
    ///
    /// `replaced_by` is only passed by rotation; terminal revocation passes
    /// `None`. Returns `true` if this call flipped the flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn mark_revoked(
        &self,
        id: Uuid,
        replaced_by: Option<Uuid>,
        now: OffsetDateTime,
    ) -> AuthResult<bool>;

    /// Atomically revokes `old_id` (linking it to `successor`) and inserts
    /// `successor`, but only if `old_id` is still unrevoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails. On error nothing is
    /// written.
    async fn rotate(
        &self,
        old_id: Uuid,
        successor: &RefreshTokenRecord,
        now: OffsetDateTime,
    ) -> AuthResult<RotationOutcome>;

    /// Revokes every unrevoked record of a subject, without linkage.
    ///
    /// Returns the number of records revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation fails.
    async fn revoke_all_for_subject(&self, subject_id: &str, now: OffsetDateTime)
    -> AuthResult<u64>;

    /// Revokes every unrevoked record of a family, without linkage.
    ///
    /// Returns the number of records revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation fails.
    async fn revoke_family(&self, family_id: Uuid, now: OffsetDateTime) -> AuthResult<u64>;

    /// Returns up to `limit` IDs of records eligible for deletion.
    ///
    /// A record qualifies when it is unrevoked and past either horizon at
    /// `now`, or revoked with `updated_at < revocation_cutoff`.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation fails.
    async fn find_expired_or_stale_revoked_ids(
        &self,
        now: OffsetDateTime,
        revocation_cutoff: OffsetDateTime,
        limit: usize,
    ) -> AuthResult<Vec<Uuid>>;

    /// Deletes records by ID. Returns the number of rows deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation fails.
    async fn delete_by_ids(&self, ids: &[Uuid]) -> AuthResult<u64>;

    /// Lists unrevoked, unexpired records of a subject, newest first.
    ///
    /// Useful for session management UI.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation fails.
    async fn list_active_for_subject(
        &self,
        subject_id: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Vec<RefreshTokenRecord>>;
}
