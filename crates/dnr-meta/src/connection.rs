//! Warehouse handle.
//!
//! [`Warehouse`] owns the shared [`Database`] backend, applies migrations on
//! open, and keeps the source registry in `meta.source_system`.

use crate::error::{MetaError, MetaResult};
use crate::lineage::LineageTracker;
use crate::materialization::MaterializationStore;
use crate::migration::run_migrations;
use crate::pipeline_run::PipelineRunLog;
use dnr_core::SourceFile;
use dnr_db::{Database, DuckDbBackend, SqlValue, Timeouts};
use std::sync::Arc;

/// A registered source system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredSource {
    pub source_id: i32,
    pub name: String,
    pub format: String,
}

/// Migrated warehouse with metadata accessors
#[derive(Clone)]
pub struct Warehouse {
    db: Arc<dyn Database>,
}

impl Warehouse {
    /// Open (or create) the warehouse at `path` and run pending migrations.
    pub async fn open(path: &str, pool_size: usize, timeouts: Timeouts) -> MetaResult<Self> {
        let backend = DuckDbBackend::open(path, pool_size, timeouts)
            .map_err(|e| MetaError::ConnectionError(format!("{e}: {path}")))?;
        Self::from_database(Arc::new(backend)).await
    }

    /// In-memory warehouse with all migrations applied.
    ///
    /// Useful for unit tests that don't need persistence.
    pub async fn open_memory() -> MetaResult<Self> {
        let backend =
            DuckDbBackend::in_memory().map_err(|e| MetaError::ConnectionError(e.to_string()))?;
        Self::from_database(Arc::new(backend)).await
    }

    /// Wrap an existing backend, running pending migrations
    pub async fn from_database(db: Arc<dyn Database>) -> MetaResult<Self> {
        run_migrations(db.as_ref()).await?;
        Ok(Self { db })
    }

    /// Shared database backend
    pub fn db(&self) -> &Arc<dyn Database> {
        &self.db
    }

    pub fn lineage(&self) -> LineageTracker {
        LineageTracker::new(Arc::clone(&self.db))
    }

    pub fn materializations(&self) -> MaterializationStore {
        MaterializationStore::new(Arc::clone(&self.db))
    }

    pub fn pipeline_runs(&self) -> PipelineRunLog {
        PipelineRunLog::new(Arc::clone(&self.db))
    }

    /// Register source systems as immutable reference data.
    ///
    /// Already-registered sources are left untouched. A source whose id or
    /// name is already taken by a different source is a conflict. Returns the
    /// number of newly registered sources.
    pub async fn register_sources(&self, sources: &[SourceFile]) -> MetaResult<usize> {
        let existing = self.registered_sources().await?;
        let mut added = 0;

        for source in sources {
            let same_id = existing.iter().find(|r| r.source_id == source.id);
            let same_name = existing.iter().find(|r| r.name == source.name.as_str());

            match (same_id, same_name) {
                (Some(by_id), Some(by_name)) if by_id == by_name => continue,
                (None, None) => {}
                (Some(other), _) | (None, Some(other)) => {
                    return Err(MetaError::SourceConflict {
                        name: source.name.to_string(),
                        source_id: source.id,
                        existing_name: other.name.clone(),
                        existing_id: other.source_id,
                    })
                }
            }

            self.db
                .execute(
                    "INSERT INTO meta.source_system (source_id, name, format, description) \
                     VALUES (?, ?, ?, ?)",
                    &[
                        SqlValue::from(source.id),
                        SqlValue::from(source.name.as_str()),
                        SqlValue::from(source.format.as_str()),
                        SqlValue::opt_text(source.description.clone()),
                    ],
                )
                .await?;
            log::info!("Registered source {} (id {})", source.name, source.id);
            added += 1;
        }
        Ok(added)
    }

    /// All registered sources ordered by id
    pub async fn registered_sources(&self) -> MetaResult<Vec<RegisteredSource>> {
        let result = self
            .db
            .query(
                "SELECT source_id, name, format FROM meta.source_system ORDER BY source_id",
                &[],
            )
            .await?;
        Ok(result
            .rows
            .iter()
            .map(|row| RegisteredSource {
                source_id: row[0].as_i64().unwrap_or_default() as i32,
                name: row[1].to_text().unwrap_or_default(),
                format: row[2].to_text().unwrap_or_default(),
            })
            .collect())
    }

    /// Registered id of a source name
    pub async fn source_id(&self, name: &str) -> MetaResult<Option<i32>> {
        let result = self
            .db
            .query(
                "SELECT source_id FROM meta.source_system WHERE name = ?",
                &[SqlValue::from(name)],
            )
            .await?;
        Ok(result.scalar().as_i64().map(|id| id as i32))
    }
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;
