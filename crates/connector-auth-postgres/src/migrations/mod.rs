//! Embedded schema migrations.
//!
//! Migrations are compiled into the binary with `include_str!` and applied
//! through the sqlx migrator, which records them in `_sqlx_migrations`.

use std::borrow::Cow;

use sqlx_core::migrate::{Migration, MigrationType, Migrator};
use tracing::{info, instrument};

use crate::{PgPool, StorageError, StorageResult};

/// Migrations in chronological order: (version, description, sql).
///
/// To add a migration, create the SQL file in `migrations/` and append an entry.
macro_rules! embedded_migrations {
    () => {
        &[(
            20261017000001i64,
            "oauth_schema",
            include_str!("../../migrations/20261017000001_oauth_schema.sql"),
        )]
    };
}

fn build_migrations() -> Vec<Migration> {
    let migrations: &[(i64, &'static str, &'static str)] = embedded_migrations!();
    migrations
        .iter()
        .map(|(version, description, sql)| {
            Migration::new(
                *version,
                Cow::Borrowed(*description),
                MigrationType::Simple,
                Cow::Borrowed(*sql),
                false,
            )
        })
        .collect()
}

/// Applies all pending migrations.
///
/// # Errors
///
/// Returns `StorageError::Migration` if a migration fails to apply.
#[instrument(skip(pool))]
pub async fn run(pool: &PgPool) -> StorageResult<()> {
    let migrations = build_migrations();
    info!(count = migrations.len(), "Running database migrations (embedded)");

    let migrator = Migrator {
        migrations: Cow::Owned(migrations),
        ignore_missing: false,
        locking: true,
        no_tx: false,
    };

    migrator
        .run(pool)
        .await
        .map_err(|e| StorageError::Migration(e.to_string()))?;

    info!("Database migrations completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_ordered_and_non_empty() {
        let migrations = build_migrations();
        assert!(!migrations.is_empty());
        assert!(migrations.windows(2).all(|w| w[0].version < w[1].version));
        assert!(migrations[0].sql.contains("oauth_refresh_token"));
        assert!(!migrations[0].checksum.is_empty());
    }
}
