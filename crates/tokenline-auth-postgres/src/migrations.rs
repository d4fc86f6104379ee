//! Embedded schema migrations.

use std::borrow::Cow;

use sqlx_core::migrate::{Migration, MigrationType, Migrator};
use tracing::{info, instrument};

use crate::{PgPool, StorageError, StorageResult};

/// Migrations in chronological order: (version, description, sql).
const EMBEDDED: &[(i64, &str, &str)] = &[(
    20250101000001,
    "refresh_tokens",
    include_str!("../migrations/20250101000001_refresh_tokens.sql"),
)];

fn build_migrations() -> Vec<Migration> {
    EMBEDDED
        .iter()
        .map(|(version, description, sql)| Migration {
            version: *version,
            description: Cow::Borrowed(description),
            migration_type: MigrationType::Simple,
            sql: Cow::Borrowed(sql),
            checksum: Cow::Borrowed(&[]),
            no_tx: false,
        })
        .collect()
}

/// Applies all pending migrations.
///
/// Applied versions are tracked in `_sqlx_migrations`.
///
/// # Errors
///
/// Returns `StorageError::Migration` if a migration fails.
#[instrument(skip(pool))]
pub async fn run(pool: &PgPool) -> StorageResult<()> {
    let migrations = build_migrations();
    info!(count = migrations.len(), "Running refresh token migrations");

    let migrator = Migrator {
        migrations: Cow::Owned(migrations),
        ignore_missing: false,
        locking: true,
        no_tx: false,
    };

    migrator
        .run(pool)
        .await
        .map_err(|e| StorageError::migration(e.to_string()))?;

    info!("Refresh token migrations completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_migrations_are_ordered() {
        let migrations = build_migrations();
        assert!(!migrations.is_empty());
        assert!(
            migrations
                .windows(2)
                .all(|w| w[0].version < w[1].version)
        );
        assert!(migrations[0].sql.contains("CREATE TABLE IF NOT EXISTS refresh_tokens"));
    }
}
