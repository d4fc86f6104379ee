//! Subject directory backed by the `subjects` table.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use tokenline_auth::storage::SubjectDirectory;
use tokenline_auth::{AuthResult, SubjectClaims};

use crate::{PgPool, StorageError, StorageResult};

/// PostgreSQL implementation of [`SubjectDirectory`].
///
/// Every call reads the current row; nothing is cached.
#[derive(Debug, Clone)]
pub struct PostgresSubjectDirectory {
    pool: Arc<PgPool>,
}

impl PostgresSubjectDirectory {
    /// Create a new subject directory.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Inserts or replaces a subject.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn upsert(&self, subject_id: &str, claims: &SubjectClaims) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO subjects (id, roles, enabled, locked)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                roles = EXCLUDED.roles,
                enabled = EXCLUDED.enabled,
                locked = EXCLUDED.locked
            "#,
        )
        .bind(subject_id)
        .bind(&claims.roles)
        .bind(claims.enabled)
        .bind(claims.locked)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SubjectDirectory for PostgresSubjectDirectory {
    async fn subject_claims(&self, subject_id: &str) -> AuthResult<Option<SubjectClaims>> {
        let row: Option<(Vec<String>, bool, bool)> =
            query_as("SELECT roles, enabled, locked FROM subjects WHERE id = $1")
                .bind(subject_id)
                .fetch_optional(&*self.pool)
                .await
                .map_err(StorageError::from)?;

        Ok(row.map(|(roles, enabled, locked)| SubjectClaims {
            roles,
            enabled,
            locked,
        }))
    }
}
