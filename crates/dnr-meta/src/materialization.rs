//! Persisted materialization state per serving view.

use crate::error::{MetaError, MetaResult};
use dnr_db::{Database, SqlValue};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Where a serving view stands on the way from logical view to indexed table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MaterializationState {
    ViewOnly,
    Copying,
    TableNoIndex,
    TableIndexed,
}

impl MaterializationState {
    pub fn as_str(self) -> &'static str {
        match self {
            MaterializationState::ViewOnly => "view_only",
            MaterializationState::Copying => "copying",
            MaterializationState::TableNoIndex => "table_no_index",
            MaterializationState::TableIndexed => "table_indexed",
        }
    }

    /// Whether the serving relation is a physical table
    pub fn is_table(self) -> bool {
        matches!(
            self,
            MaterializationState::TableNoIndex | MaterializationState::TableIndexed
        )
    }
}

impl fmt::Display for MaterializationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MaterializationState {
    type Err = MetaError;

    fn from_str(s: &str) -> MetaResult<Self> {
        match s {
            "view_only" => Ok(MaterializationState::ViewOnly),
            "copying" => Ok(MaterializationState::Copying),
            "table_no_index" => Ok(MaterializationState::TableNoIndex),
            "table_indexed" => Ok(MaterializationState::TableIndexed),
            other => Err(MetaError::CorruptValue {
                table: "meta.materialization_state".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// One row of `meta.materialization_state`
#[derive(Debug, Clone)]
pub struct MaterializationRecord {
    pub view_name: String,
    pub state: MaterializationState,
    pub row_count: Option<i64>,
    pub error: Option<String>,
    pub updated_at: String,
}

const SELECT_STATE: &str = "SELECT view_name, state, row_count, error, CAST(updated_at AS VARCHAR) \
     FROM meta.materialization_state";

/// Reads and writes `meta.materialization_state`
#[derive(Clone)]
pub struct MaterializationStore {
    db: Arc<dyn Database>,
}

impl MaterializationStore {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    pub async fn get(&self, view_name: &str) -> MetaResult<Option<MaterializationRecord>> {
        Ok(self
            .select(&format!("{SELECT_STATE} WHERE view_name = ?"), &[SqlValue::from(view_name)])
            .await?
            .into_iter()
            .next())
    }

    pub async fn list(&self) -> MetaResult<Vec<MaterializationRecord>> {
        self.select(&format!("{SELECT_STATE} ORDER BY view_name"), &[])
            .await
    }

    /// Record the state of a view (upsert)
    pub async fn set(
        &self,
        view_name: &str,
        state: MaterializationState,
        row_count: Option<i64>,
        error: Option<&str>,
    ) -> MetaResult<()> {
        self.db
            .execute(
                "INSERT INTO meta.materialization_state (view_name, state, row_count, error, updated_at) \
                 VALUES (?, ?, ?, ?, now()) \
                 ON CONFLICT (view_name) DO UPDATE SET \
                 state = EXCLUDED.state, row_count = EXCLUDED.row_count, \
                 error = EXCLUDED.error, updated_at = EXCLUDED.updated_at",
                &[
                    SqlValue::from(view_name),
                    SqlValue::from(state.as_str()),
                    SqlValue::from(row_count),
                    SqlValue::opt_text(error),
                ],
            )
            .await?;
        log::debug!("Materialization state of {view_name} -> {state}");
        Ok(())
    }

    async fn select(&self, sql: &str, params: &[SqlValue]) -> MetaResult<Vec<MaterializationRecord>> {
        let result = self.db.query(sql, params).await?;
        result
            .rows
            .iter()
            .map(|row| {
                Ok(MaterializationRecord {
                    view_name: row[0].to_text().unwrap_or_default(),
                    state: row[1].as_str().unwrap_or_default().parse()?,
                    row_count: row[2].as_i64(),
                    error: row[3].to_text(),
                    updated_at: row[4].to_text().unwrap_or_default(),
                })
            })
            .collect()
    }
}
