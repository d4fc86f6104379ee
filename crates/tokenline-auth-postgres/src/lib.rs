//! PostgreSQL storage backend for tokenline-auth
//!
//! Provides persistent storage for:
//!
//! - Refresh token records ([`PostgresRefreshTokenStorage`])
//! - Subject identity lookups ([`PostgresSubjectDirectory`])
//!
//! Rotation runs as a conditional update plus insert inside one transaction,
//! so concurrent rotations of the same record race to exactly one winner.
//!
//! # Example
//!
//! ```ignore
//! use tokenline_auth_postgres::PostgresAuthStorage;
//!
//! let storage = PostgresAuthStorage::connect("postgres://localhost/tokenline", 10).await?;
//! storage.migrate().await?;
//!
//! let refresh_tokens = Arc::new(storage.refresh_tokens());
//! let subjects = Arc::new(storage.subjects());
//! ```

pub mod migrations;
pub mod refresh_token;
pub mod subject;

use std::sync::Arc;

use sqlx_core::pool::Pool;
use sqlx_postgres::Postgres;
use tokenline_auth::AuthError;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use refresh_token::PostgresRefreshTokenStorage;
pub use subject::PostgresSubjectDirectory;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// A unique constraint was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Schema migration failed.
    #[error("Migration failed: {0}")]
    Migration(String),
}

impl StorageError {
    // -------------------------------------------------------------------------
    // Constructor Methods
    // -------------------------------------------------------------------------

    /// Create a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create an `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a `Migration` error.
    #[must_use]
    pub fn migration(message: impl Into<String>) -> Self {
        Self::Migration(message.into())
    }

    /// Maps unique violations to `Conflict`, everything else to `Database`.
    pub(crate) fn from_insert(err: sqlx_core::Error, what: &str) -> Self {
        if let sqlx_core::Error::Database(ref db_err) = err
            && db_err.is_unique_violation()
        {
            return Self::conflict(format!("{what} already exists"));
        }
        Self::from(err)
    }

    // -------------------------------------------------------------------------
    // Predicate Methods
    // -------------------------------------------------------------------------

    /// Returns `true` if this is a `Conflict` error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns `true` if this is a database error.
    #[must_use]
    pub fn is_database_error(&self) -> bool {
        matches!(self, Self::Database(_))
    }

    /// Returns `true` if the failure is transient infrastructure trouble.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Database(_) => AuthError::store_unavailable(err.to_string()),
            StorageError::Conflict(_)
            | StorageError::InvalidInput(_)
            | StorageError::Migration(_) => AuthError::internal(err.to_string()),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// PostgreSQL Auth Storage
// =============================================================================

/// PostgreSQL storage backend.
///
/// Holds the connection pool and hands out the trait implementations.
#[derive(Debug, Clone)]
pub struct PostgresAuthStorage {
    pool: Arc<PgPool>,
}

impl PostgresAuthStorage {
    /// Create new storage with an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create new storage by connecting to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> StorageResult<Self> {
        use sqlx_core::pool::PoolOptions;
        let pool = PoolOptions::<Postgres>::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Applies pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> StorageResult<()> {
        migrations::run(&self.pool).await
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // -------------------------------------------------------------------------
    // Storage Accessors
    // -------------------------------------------------------------------------

    /// Get the refresh token store.
    #[must_use]
    pub fn refresh_tokens(&self) -> PostgresRefreshTokenStorage {
        PostgresRefreshTokenStorage::new(Arc::clone(&self.pool))
    }

    /// Get the subject directory.
    #[must_use]
    pub fn subjects(&self) -> PostgresSubjectDirectory {
        PostgresSubjectDirectory::new(Arc::clone(&self.pool))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_conflict() {
        let err = StorageError::conflict("Refresh token hash");
        assert!(err.is_conflict());
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "Conflict: Refresh token hash");

        let auth: AuthError = err.into();
        assert!(matches!(auth, AuthError::Internal { .. }));
    }

    #[test]
    fn test_database_error_is_store_unavailable() {
        let err = StorageError::from(sqlx_core::Error::PoolTimedOut);
        assert!(err.is_database_error());
        assert!(err.is_transient());

        let auth: AuthError = err.into();
        assert!(auth.is_retryable());
        assert!(!auth.requires_reauthentication());
    }

    #[test]
    fn test_migration_error() {
        let err = StorageError::migration("checksum mismatch");
        assert_eq!(err.to_string(), "Migration failed: checksum mismatch");
        assert!(matches!(AuthError::from(err), AuthError::Internal { .. }));
    }
}
