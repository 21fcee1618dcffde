//! Database trait definition

use crate::error::DbResult;
use crate::value::{QueryResult, SqlValue};
use async_trait::async_trait;
use std::time::Duration;

/// Timeouts applied to warehouse calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Lookups, single-row writes and metadata queries
    pub point: Duration,
    /// Batch inserts, copies and view materialization
    pub bulk: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            point: Duration::from_secs(30),
            bulk: Duration::from_secs(900),
        }
    }
}

/// Kind of a named relation in the warehouse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    Table,
    View,
}

/// One statement with its bound parameters
#[derive(Debug, Clone)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl SqlStatement {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Statement without parameters
    pub fn plain(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }
}

/// Database abstraction trait for Donorflow
///
/// Implementations must be Send + Sync for async operation. Every method runs
/// under either the point or the bulk timeout.
#[async_trait]
pub trait Database: Send + Sync {
    /// Execute one statement with bound parameters, returns affected rows
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> DbResult<usize>;

    /// Execute multiple parameterless statements under the bulk timeout
    async fn execute_batch(&self, sql: &str) -> DbResult<()>;

    /// Execute one prepared statement once per parameter row, in a single
    /// transaction. Returns the total affected row count.
    async fn execute_many(&self, sql: &str, rows: Vec<Vec<SqlValue>>) -> DbResult<usize>;

    /// Run statements in one transaction; any failure rolls back all of them
    async fn transaction(&self, statements: Vec<SqlStatement>) -> DbResult<()>;

    /// Run a query with an explicit timeout, stopping after `max_rows` rows
    async fn query_with_limits(
        &self,
        sql: &str,
        params: &[SqlValue],
        timeout: Duration,
        max_rows: Option<usize>,
    ) -> DbResult<QueryResult>;

    /// Timeouts this backend was configured with
    fn timeouts(&self) -> Timeouts;

    /// Database type identifier for logging
    fn db_type(&self) -> &'static str;

    /// Query under the point timeout
    async fn query(&self, sql: &str, params: &[SqlValue]) -> DbResult<QueryResult> {
        self.query_with_limits(sql, params, self.timeouts().point, None)
            .await
    }

    /// Query under the bulk timeout (full-table reads)
    async fn query_bulk(&self, sql: &str, params: &[SqlValue]) -> DbResult<QueryResult> {
        self.query_with_limits(sql, params, self.timeouts().bulk, None)
            .await
    }

    /// Execute query returning row count
    async fn query_count(&self, sql: &str) -> DbResult<usize> {
        let result = self
            .query(&format!("SELECT COUNT(*) FROM ({sql})"), &[])
            .await?;
        Ok(result.scalar().as_i64().unwrap_or(0).max(0) as usize)
    }

    /// Kind of the relation `schema.name`, or `None` when it does not exist
    async fn relation_kind(&self, name: &str) -> DbResult<Option<RelationKind>>;

    /// Check if a table or view exists
    async fn relation_exists(&self, name: &str) -> DbResult<bool> {
        Ok(self.relation_kind(name).await?.is_some())
    }

    /// Drop a table or view if it exists
    async fn drop_if_exists(&self, name: &str) -> DbResult<()>;

    /// Create a schema if it does not exist
    async fn create_schema_if_not_exists(&self, schema: &str) -> DbResult<()>;
}
