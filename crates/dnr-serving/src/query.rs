//! Guarded read-only queries against the serving layer.

use crate::error::ServingResult;
use dnr_core::config::QueryConfig;
use dnr_db::{Database, QueryResult};
use dnr_sql::{GuardPolicy, QueryGuard};
use std::sync::Arc;
use std::time::Duration;

/// Rows returned by a guarded query
#[derive(Debug, Clone)]
pub struct QueryOutput {
    pub sql: String,
    pub result: QueryResult,
    /// More rows matched than `max_rows`
    pub truncated: bool,
}

/// Runs ad-hoc SQL through a [`QueryGuard`] under the query timeout
pub struct QueryRunner {
    db: Arc<dyn Database>,
    guard: QueryGuard,
    max_rows: usize,
    timeout: Duration,
}

impl QueryRunner {
    pub fn new(db: Arc<dyn Database>, config: &QueryConfig) -> Self {
        // One extra row tells a truncated result from an exact fit
        let guard = QueryGuard::new(GuardPolicy {
            allowed_schemas: config.allowed_schemas.clone(),
            max_rows: config.max_rows + 1,
        });
        Self {
            db,
            guard,
            max_rows: config.max_rows,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub async fn run(&self, sql: &str) -> ServingResult<QueryOutput> {
        let guarded = self.guard.check(sql)?;
        log::debug!("Guarded query reads {}", guarded.relations.join(", "));

        let mut result = self
            .db
            .query_with_limits(&guarded.sql, &[], self.timeout, Some(guarded.max_rows))
            .await?;
        let truncated = result.rows.len() > self.max_rows;
        result.rows.truncate(self.max_rows);

        Ok(QueryOutput {
            sql: guarded.sql,
            result,
            truncated,
        })
    }
}

#[cfg(test)]
#[path = "query_test.rs"]
mod tests;
