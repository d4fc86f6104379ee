//! Refresh token storage.
//!
//! Records live in the `refresh_tokens` table, keyed by id with a unique
//! index on `token_hash`.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx_core::query::{Query, query};
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::{PgArguments, Postgres};
use time::OffsetDateTime;
use tokenline_auth::storage::{RefreshTokenStorage, RotationOutcome};
use tokenline_auth::{AuthResult, RefreshTokenRecord};
use tracing::instrument;
use uuid::Uuid;

use crate::{PgPool, StorageError, StorageResult};

// =============================================================================
// Types
// =============================================================================

type RecordRow = (
    Uuid,
    Uuid,
    String,
    String,
    OffsetDateTime,
    OffsetDateTime,
    OffsetDateTime,
    bool,
    Option<Uuid>,
    Option<String>,
    Option<String>,
    OffsetDateTime,
    OffsetDateTime,
);

/// Builds a `SELECT` of every record column with the given `WHERE` tail.
macro_rules! select_records {
    ($tail:literal) => {
        concat!(
            "SELECT id, family_id, subject_id, token_hash, issued_at, ",
            "sliding_expires_at, absolute_expires_at, revoked, replaced_by, ",
            "device_info, source_address, created_at, updated_at ",
            "FROM refresh_tokens ",
            $tail
        )
    };
}

fn from_row(row: RecordRow) -> RefreshTokenRecord {
    RefreshTokenRecord {
        id: row.0,
        family_id: row.1,
        subject_id: row.2,
        token_hash: row.3,
        issued_at: row.4,
        sliding_expires_at: row.5,
        absolute_expires_at: row.6,
        revoked: row.7,
        replaced_by: row.8,
        device_info: row.9,
        source_address: row.10,
        created_at: row.11,
        updated_at: row.12,
    }
}

fn insert_query(record: &RefreshTokenRecord) -> Query<'_, Postgres, PgArguments> {
    query(
        r#"
        INSERT INTO refresh_tokens (
            id, family_id, subject_id, token_hash, issued_at,
            sliding_expires_at, absolute_expires_at, revoked, replaced_by,
            device_info, source_address, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(record.id)
    .bind(record.family_id)
    .bind(&record.subject_id)
    .bind(&record.token_hash)
    .bind(record.issued_at)
    .bind(record.sliding_expires_at)
    .bind(record.absolute_expires_at)
    .bind(record.revoked)
    .bind(record.replaced_by)
    .bind(&record.device_info)
    .bind(&record.source_address)
    .bind(record.created_at)
    .bind(record.updated_at)
}

// =============================================================================
// Refresh Token Storage
// =============================================================================

/// PostgreSQL implementation of [`RefreshTokenStorage`].
#[derive(Debug, Clone)]
pub struct PostgresRefreshTokenStorage {
    pool: Arc<PgPool>,
}

impl PostgresRefreshTokenStorage {
    /// Create a new refresh token storage.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Inserts a record.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` on a duplicate id or hash.
    #[instrument(skip(self, record), fields(record_id = %record.id))]
    pub async fn insert_record(&self, record: &RefreshTokenRecord) -> StorageResult<()> {
        insert_query(record)
            .execute(&*self.pool)
            .await
            .map_err(|e| StorageError::from_insert(e, "Refresh token"))?;
        Ok(())
    }

    /// Conditionally revokes `old_id` and inserts `successor` in one transaction.
    ///
    /// The `revoked = FALSE` guard on the update serializes concurrent
    /// rotations: the loser's update matches no row once the winner commits.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; nothing is committed then.
    #[instrument(skip(self, successor), fields(new_record_id = %successor.id))]
    pub async fn rotate_record(
        &self,
        old_id: Uuid,
        successor: &RefreshTokenRecord,
        now: OffsetDateTime,
    ) -> StorageResult<RotationOutcome> {
        let mut tx = self.pool.begin().await?;

        let updated = query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE,
                replaced_by = $2,
                updated_at = $3
            WHERE id = $1
              AND revoked = FALSE
            "#,
        )
        .bind(old_id)
        .bind(successor.id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(RotationOutcome::Superseded);
        }

        insert_query(successor)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::from_insert(e, "Refresh token"))?;

        tx.commit().await?;
        Ok(RotationOutcome::Rotated)
    }

    /// Returns up to `limit` ids eligible for cleanup.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or `limit` does not fit in `BIGINT`.
    pub async fn collectable_ids(
        &self,
        now: OffsetDateTime,
        revocation_cutoff: OffsetDateTime,
        limit: usize,
    ) -> StorageResult<Vec<Uuid>> {
        let limit = i64::try_from(limit)
            .map_err(|_| StorageError::invalid_input(format!("limit {limit} out of range")))?;

        let ids: Vec<Uuid> = query_scalar(
            r#"
            SELECT id
            FROM refresh_tokens
            WHERE (revoked = FALSE AND (sliding_expires_at <= $1 OR absolute_expires_at <= $1))
               OR (revoked = TRUE AND updated_at < $2)
            LIMIT $3
            "#,
        )
        .bind(now)
        .bind(revocation_cutoff)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(ids)
    }
}

#[async_trait]
impl RefreshTokenStorage for PostgresRefreshTokenStorage {
    async fn insert(&self, record: &RefreshTokenRecord) -> AuthResult<()> {
        Ok(self.insert_record(record).await?)
    }

    async fn find_live_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshTokenRecord>> {
        let row: Option<RecordRow> =
            query_as(select_records!("WHERE token_hash = $1 AND revoked = FALSE"))
                .bind(token_hash)
                .fetch_optional(&*self.pool)
                .await
                .map_err(StorageError::from)?;

        Ok(row.map(from_row))
    }

    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshTokenRecord>> {
        let row: Option<RecordRow> = query_as(select_records!("WHERE token_hash = $1"))
            .bind(token_hash)
            .fetch_optional(&*self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(row.map(from_row))
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<RefreshTokenRecord>> {
        let row: Option<RecordRow> = query_as(select_records!("WHERE id = $1"))
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(row.map(from_row))
    }

    async fn mark_revoked(
        &self,
        id: Uuid,
        replaced_by: Option<Uuid>,
        now: OffsetDateTime,
    ) -> AuthResult<bool> {
        let result = query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE,
                replaced_by = $2,
                updated_at = $3
            WHERE id = $1
              AND revoked = FALSE
            "#,
        )
        .bind(id)
        .bind(replaced_by)
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(StorageError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn rotate(
        &self,
        old_id: Uuid,
        successor: &RefreshTokenRecord,
        now: OffsetDateTime,
    ) -> AuthResult<RotationOutcome> {
        Ok(self.rotate_record(old_id, successor, now).await?)
    }

    async fn revoke_all_for_subject(
        &self,
        subject_id: &str,
        now: OffsetDateTime,
    ) -> AuthResult<u64> {
        let result = query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE,
                updated_at = $2
            WHERE subject_id = $1
              AND revoked = FALSE
            "#,
        )
        .bind(subject_id)
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(StorageError::from)?;

        Ok(result.rows_affected())
    }

    async fn revoke_family(&self, family_id: Uuid, now: OffsetDateTime) -> AuthResult<u64> {
        let result = query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE,
                updated_at = $2
            WHERE family_id = $1
              AND revoked = FALSE
            "#,
        )
        .bind(family_id)
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(StorageError::from)?;

        Ok(result.rows_affected())
    }

    async fn find_expired_or_stale_revoked_ids(
        &self,
        now: OffsetDateTime,
        revocation_cutoff: OffsetDateTime,
        limit: usize,
    ) -> AuthResult<Vec<Uuid>> {
        Ok(self.collectable_ids(now, revocation_cutoff, limit).await?)
    }

    async fn delete_by_ids(&self, ids: &[Uuid]) -> AuthResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = query("DELETE FROM refresh_tokens WHERE id = ANY($1)")
            .bind(ids)
            .execute(&*self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(result.rows_affected())
    }

    async fn list_active_for_subject(
        &self,
        subject_id: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Vec<RefreshTokenRecord>> {
        let rows: Vec<RecordRow> = query_as(select_records!(
            "WHERE subject_id = $1 AND revoked = FALSE \
             AND sliding_expires_at > $2 AND absolute_expires_at > $2 \
             ORDER BY issued_at DESC"
        ))
            .bind(subject_id)
            .bind(now)
            .fetch_all(&*self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(rows.into_iter().map(from_row).collect())
    }
}
