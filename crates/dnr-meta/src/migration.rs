//! Schema migration runner for the warehouse.
//!
//! Tracks applied migration versions in `meta.schema_version` and runs any
//! unapplied migrations on each open.

use crate::ddl::MIGRATIONS;
use crate::error::{MetaError, MetaResult};
use dnr_db::{Database, SqlValue};

/// Ensure the `meta` schema and `schema_version` table exist.
async fn ensure_version_table(db: &dyn Database) -> MetaResult<()> {
    db.execute_batch(
        "CREATE SCHEMA IF NOT EXISTS meta;
         CREATE TABLE IF NOT EXISTS meta.schema_version (
             version    INTEGER NOT NULL,
             applied_at TIMESTAMP NOT NULL DEFAULT now()
         );",
    )
    .await
    .map_err(|e| MetaError::MigrationError(format!("failed to create schema_version table: {e}")))
}

/// Return the highest applied migration version, or 0 if none.
pub async fn current_version(db: &dyn Database) -> MetaResult<i32> {
    let result = db
        .query(
            "SELECT COALESCE(MAX(version), 0) FROM meta.schema_version",
            &[],
        )
        .await
        .map_err(|e| MetaError::MigrationError(format!("failed to read schema version: {e}")))?;
    Ok(result.scalar().as_i64().unwrap_or(0) as i32)
}

/// Run all unapplied migrations against `db`.
///
/// The version number is recorded in `schema_version` after each migration
/// succeeds, so a failed run resumes at the failed migration.
pub async fn run_migrations(db: &dyn Database) -> MetaResult<()> {
    ensure_version_table(db).await?;
    let current = current_version(db).await?;

    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        log::debug!("Applying warehouse migration v{:03}", migration.version);

        db.execute_batch(&migration.sql.render())
            .await
            .map_err(|e| {
                MetaError::MigrationError(format!(
                    "migration v{:03} failed: {e}",
                    migration.version
                ))
            })?;

        db.execute(
            "INSERT INTO meta.schema_version (version) VALUES (?)",
            &[SqlValue::from(migration.version)],
        )
        .await
        .map_err(|e| {
            MetaError::MigrationError(format!(
                "failed to record migration v{:03}: {e}",
                migration.version
            ))
        })?;
    }
    Ok(())
}
