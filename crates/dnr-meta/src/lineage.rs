//! File lineage tracker.
//!
//! Every ingested blob gets one lineage row. The row starts `loading`, and
//! moves exactly once to `loaded` or `failed`. A row still `loading` after a
//! run is inconclusive: it is never mistaken for a completed load.

use crate::error::{MetaError, MetaResult};
use dnr_db::{Database, QueryResult, SqlStatement, SqlValue};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Lineage status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineageStatus {
    Loading,
    Loaded,
    Failed,
}

impl LineageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LineageStatus::Loading => "loading",
            LineageStatus::Loaded => "loaded",
            LineageStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for LineageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LineageStatus {
    type Err = MetaError;

    fn from_str(s: &str) -> MetaResult<Self> {
        match s {
            "loading" => Ok(LineageStatus::Loading),
            "loaded" => Ok(LineageStatus::Loaded),
            "failed" => Ok(LineageStatus::Failed),
            other => Err(MetaError::CorruptValue {
                table: "meta.file_lineage".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// A new file about to be loaded
#[derive(Debug, Clone)]
pub struct NewLineage {
    pub batch_id: String,
    pub source_id: i32,
    pub table_name: String,
    pub blob_path: String,
    pub content_hash: String,
    /// Expected data rows, when known before loading
    pub row_count: Option<i64>,
}

/// One row of `meta.file_lineage`
#[derive(Debug, Clone)]
pub struct LineageRecord {
    pub lineage_id: String,
    pub batch_id: String,
    pub source_id: i32,
    pub table_name: String,
    pub blob_path: String,
    pub content_hash: String,
    pub row_count: Option<i64>,
    pub status: LineageStatus,
    pub error: Option<String>,
    pub started_at: String,
    pub loaded_at: Option<String>,
}

const SELECT_LINEAGE: &str = "SELECT lineage_id, batch_id, source_id, table_name, blob_path, \
     content_hash, row_count, status, error, CAST(started_at AS VARCHAR), \
     CAST(loaded_at AS VARCHAR) FROM meta.file_lineage";

fn records_from(result: &QueryResult) -> MetaResult<Vec<LineageRecord>> {
    result
        .rows
        .iter()
        .map(|row| {
            Ok(LineageRecord {
                lineage_id: row[0].to_text().unwrap_or_default(),
                batch_id: row[1].to_text().unwrap_or_default(),
                source_id: row[2].as_i64().unwrap_or_default() as i32,
                table_name: row[3].to_text().unwrap_or_default(),
                blob_path: row[4].to_text().unwrap_or_default(),
                content_hash: row[5].to_text().unwrap_or_default(),
                row_count: row[6].as_i64(),
                status: row[7].as_str().unwrap_or_default().parse()?,
                error: row[8].to_text(),
                started_at: row[9].to_text().unwrap_or_default(),
                loaded_at: row[10].to_text(),
            })
        })
        .collect()
}

/// Reads and writes `meta.file_lineage`
#[derive(Clone)]
pub struct LineageTracker {
    db: Arc<dyn Database>,
}

impl LineageTracker {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Insert a `loading` row and return its lineage id
    pub async fn record_file_start(&self, new: &NewLineage) -> MetaResult<String> {
        let lineage_id = Uuid::new_v4().to_string();
        self.db
            .execute(
                "INSERT INTO meta.file_lineage \
                 (lineage_id, batch_id, source_id, table_name, blob_path, content_hash, row_count, status) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, 'loading')",
                &[
                    SqlValue::from(lineage_id.as_str()),
                    SqlValue::from(new.batch_id.as_str()),
                    SqlValue::from(new.source_id),
                    SqlValue::from(new.table_name.as_str()),
                    SqlValue::from(new.blob_path.as_str()),
                    SqlValue::from(new.content_hash.as_str()),
                    SqlValue::from(new.row_count),
                ],
            )
            .await?;
        log::debug!("Lineage {lineage_id} started for {}", new.blob_path);
        Ok(lineage_id)
    }

    /// `loading -> loaded`
    pub async fn mark_loaded(&self, lineage_id: &str, row_count: i64) -> MetaResult<()> {
        let affected = self
            .db
            .execute(
                "UPDATE meta.file_lineage \
                 SET status = 'loaded', row_count = ?, loaded_at = now(), error = NULL \
                 WHERE lineage_id = ? AND status = 'loading'",
                &[SqlValue::Int(row_count), SqlValue::from(lineage_id)],
            )
            .await?;
        if affected == 0 {
            return Err(self.transition_error(lineage_id, LineageStatus::Loaded).await);
        }
        Ok(())
    }

    /// `loading -> failed`
    pub async fn mark_failed(&self, lineage_id: &str, error: &str) -> MetaResult<()> {
        let affected = self
            .db
            .execute(
                "UPDATE meta.file_lineage SET status = 'failed', error = ? \
                 WHERE lineage_id = ? AND status = 'loading'",
                &[SqlValue::from(error), SqlValue::from(lineage_id)],
            )
            .await?;
        if affected == 0 {
            return Err(self.transition_error(lineage_id, LineageStatus::Failed).await);
        }
        Ok(())
    }

    async fn transition_error(&self, lineage_id: &str, to: LineageStatus) -> MetaError {
        match self.get(lineage_id).await {
            Ok(Some(record)) => MetaError::InvalidTransition {
                lineage_id: lineage_id.to_string(),
                from: record.status.to_string(),
                to: to.to_string(),
            },
            Ok(None) => MetaError::LineageNotFound {
                lineage_id: lineage_id.to_string(),
            },
            Err(e) => e,
        }
    }

    /// Whether this exact content was already loaded from this blob
    pub async fn is_already_loaded(&self, blob_path: &str, content_hash: &str) -> MetaResult<bool> {
        let result = self
            .db
            .query(
                "SELECT COUNT(*) FROM meta.file_lineage \
                 WHERE blob_path = ? AND content_hash = ? AND status = 'loaded'",
                &[SqlValue::from(blob_path), SqlValue::from(content_hash)],
            )
            .await?;
        Ok(result.scalar().as_i64().unwrap_or(0) > 0)
    }

    /// Rows for this blob that never reached a terminal status
    pub async fn find_inconclusive(&self, blob_path: &str) -> MetaResult<Vec<LineageRecord>> {
        let result = self
            .db
            .query(
                &format!("{SELECT_LINEAGE} WHERE blob_path = ? AND status = 'loading' ORDER BY started_at"),
                &[SqlValue::from(blob_path)],
            )
            .await?;
        records_from(&result)
    }

    /// Remove a non-loaded lineage row together with its raw records
    pub async fn discard(&self, lineage_id: &str) -> MetaResult<()> {
        let Some(record) = self.get(lineage_id).await? else {
            return Err(MetaError::LineageNotFound {
                lineage_id: lineage_id.to_string(),
            });
        };
        if record.status == LineageStatus::Loaded {
            return Err(MetaError::InvalidTransition {
                lineage_id: lineage_id.to_string(),
                from: record.status.to_string(),
                to: "discarded".to_string(),
            });
        }

        let id = SqlValue::from(lineage_id);
        self.db
            .transaction(vec![
                SqlStatement::new(
                    "DELETE FROM raw.record WHERE lineage_id = ?",
                    vec![id.clone()],
                ),
                SqlStatement::new(
                    "DELETE FROM meta.file_lineage WHERE lineage_id = ?",
                    vec![id],
                ),
            ])
            .await?;
        log::info!("Discarded inconclusive lineage {lineage_id} ({})", record.blob_path);
        Ok(())
    }

    pub async fn get(&self, lineage_id: &str) -> MetaResult<Option<LineageRecord>> {
        let result = self
            .db
            .query(
                &format!("{SELECT_LINEAGE} WHERE lineage_id = ?"),
                &[SqlValue::from(lineage_id)],
            )
            .await?;
        Ok(records_from(&result)?.into_iter().next())
    }

    /// Lineage rows, optionally for one source, oldest first
    pub async fn list(&self, source_id: Option<i32>) -> MetaResult<Vec<LineageRecord>> {
        let result = match source_id {
            Some(id) => {
                self.db
                    .query(
                        &format!("{SELECT_LINEAGE} WHERE source_id = ? ORDER BY started_at, blob_path"),
                        &[SqlValue::from(id)],
                    )
                    .await?
            }
            None => {
                self.db
                    .query(&format!("{SELECT_LINEAGE} ORDER BY started_at, blob_path"), &[])
                    .await?
            }
        };
        records_from(&result)
    }
}

#[cfg(test)]
#[path = "lineage_test.rs"]
mod tests;
