//! DuckDB database backend implementation
//!
//! DuckDB connections are blocking, so every call runs on the blocking thread
//! pool. A semaphore bounds concurrent callers to the pool size and each call
//! is wrapped in its timeout. A call that times out interrupts the statement
//! still running on its connection, so the permit and the connection come
//! back to the pool.

use crate::error::{DbError, DbResult};
use crate::traits::{Database, RelationKind, SqlStatement, Timeouts};
use crate::value::{QueryResult, SqlValue};
use async_trait::async_trait;
use dnr_core::sql_utils::{quote_ident, quote_qualified, split_qualified_name};
use duckdb::types::Value;
use duckdb::{params_from_iter, Connection, InterruptHandle};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Idle connections sharing one database instance
struct ConnectionPool {
    /// Never handed out; cloned when the idle list runs dry
    origin: Mutex<Connection>,
    idle: Mutex<Vec<Connection>>,
    permits: Arc<Semaphore>,
}

impl ConnectionPool {
    fn new(origin: Connection, size: usize) -> DbResult<Self> {
        let size = size.max(1);
        let mut idle = Vec::with_capacity(size);
        for _ in 0..size {
            idle.push(
                origin
                    .try_clone()
                    .map_err(|e| DbError::ConnectionError(e.to_string()))?,
            );
        }
        Ok(Self {
            origin: Mutex::new(origin),
            idle: Mutex::new(idle),
            permits: Arc::new(Semaphore::new(size)),
        })
    }

    fn checkout(&self) -> DbResult<Connection> {
        let reused = self
            .idle
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))?
            .pop();
        match reused {
            Some(conn) => Ok(conn),
            None => self
                .origin
                .lock()
                .map_err(|e| DbError::MutexPoisoned(e.to_string()))?
                .try_clone()
                .map_err(|e| DbError::ConnectionError(e.to_string())),
        }
    }

    fn checkin(&self, conn: Connection) {
        if let Ok(mut idle) = self.idle.lock() {
            idle.push(conn);
        }
    }
}

/// Where one call stands, shared between the caller and the blocking task
#[derive(Default)]
enum CallState {
    #[default]
    Pending,
    Running(Arc<InterruptHandle>),
    TimedOut,
}

/// DuckDB database backend
pub struct DuckDbBackend {
    pool: Arc<ConnectionPool>,
    timeouts: Timeouts,
}

impl DuckDbBackend {
    /// Create a new in-memory DuckDB database with a single connection
    pub fn in_memory() -> DbResult<Self> {
        Self::open(":memory:", 1, Timeouts::default())
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        Self::open(path, 2, Timeouts::default())
    }

    /// Open a database with an explicit pool size and timeouts
    pub fn open(path: &str, pool_size: usize, timeouts: Timeouts) -> DbResult<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(Path::new(path))
        }
        .map_err(|e| DbError::ConnectionError(e.to_string()))?;

        log::debug!("Opened DuckDB at {path} with {} connection(s)", pool_size.max(1));
        Ok(Self {
            pool: Arc::new(ConnectionPool::new(conn, pool_size)?),
            timeouts,
        })
    }

    /// Run `op` on a pooled connection under `timeout`
    async fn run<T, F>(&self, timeout: Duration, op: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> DbResult<T> + Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        let state = Arc::new(Mutex::new(CallState::default()));
        let task_state = Arc::clone(&state);
        let work = async move {
            let permit = Arc::clone(&pool.permits)
                .acquire_owned()
                .await
                .map_err(|e| DbError::Internal(e.to_string()))?;
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let conn = pool.checkout()?;
                {
                    let mut state = task_state
                        .lock()
                        .map_err(|e| DbError::MutexPoisoned(e.to_string()))?;
                    if matches!(*state, CallState::TimedOut) {
                        drop(state);
                        pool.checkin(conn);
                        return Err(DbError::Timeout {
                            seconds: timeout.as_secs(),
                        });
                    }
                    *state = CallState::Running(conn.interrupt_handle());
                }
                let result = op(&conn);
                if let Ok(mut state) = task_state.lock() {
                    *state = CallState::Pending;
                }
                pool.checkin(conn);
                result
            })
            .await
            .map_err(|e| DbError::Internal(format!("database task failed: {e}")))?
        };

        match tokio::time::timeout(timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!("Database call exceeded {}s timeout", timeout.as_secs());
                if let Ok(mut state) = state.lock() {
                    if let CallState::Running(handle) = &*state {
                        handle.interrupt();
                    }
                    *state = CallState::TimedOut;
                }
                Err(DbError::Timeout {
                    seconds: timeout.as_secs(),
                })
            }
        }
    }
}

/// Run `body` inside BEGIN/COMMIT, rolling back on error
fn with_transaction<T>(
    conn: &Connection,
    body: impl FnOnce(&Connection) -> DbResult<T>,
) -> DbResult<T> {
    conn.execute_batch("BEGIN TRANSACTION")?;
    match body(conn) {
        Ok(value) => {
            conn.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                log::warn!("Rollback failed: {rollback}");
            }
            Err(e)
        }
    }
}

fn read_rows(
    conn: &Connection,
    sql: &str,
    params: &[SqlValue],
    max_rows: Option<usize>,
) -> DbResult<QueryResult> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = Vec::new();
    {
        let mut cursor = stmt.query(params_from_iter(params.iter()))?;
        while let Some(row) = cursor.next()? {
            if max_rows.is_some_and(|max| rows.len() >= max) {
                break;
            }
            let width = row.as_ref().column_count();
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                values.push(SqlValue::from(row.get::<_, Value>(idx)?));
            }
            rows.push(values);
        }
    }

    // Column names are only reliable after execution
    let columns = (0..stmt.column_count())
        .map(|idx| {
            stmt.column_name(idx)
                .map_or("?".to_string(), |name| name.to_string())
        })
        .collect();

    Ok(QueryResult { columns, rows })
}

#[async_trait]
impl Database for DuckDbBackend {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> DbResult<usize> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.run(self.timeouts.point, move |conn| {
            conn.execute(&sql, params_from_iter(params.iter()))
                .map_err(DbError::from)
        })
        .await
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        let sql = sql.to_string();
        self.run(self.timeouts.bulk, move |conn| {
            conn.execute_batch(&sql).map_err(DbError::from)
        })
        .await
    }

    async fn execute_many(&self, sql: &str, rows: Vec<Vec<SqlValue>>) -> DbResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let sql = sql.to_string();
        self.run(self.timeouts.bulk, move |conn| {
            with_transaction(conn, |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let mut affected = 0;
                for row in &rows {
                    affected += stmt.execute(params_from_iter(row.iter()))?;
                }
                Ok(affected)
            })
        })
        .await
    }

    async fn transaction(&self, statements: Vec<SqlStatement>) -> DbResult<()> {
        self.run(self.timeouts.bulk, move |conn| {
            with_transaction(conn, |conn| {
                for statement in &statements {
                    conn.execute(&statement.sql, params_from_iter(statement.params.iter()))?;
                }
                Ok(())
            })
        })
        .await
    }

    async fn query_with_limits(
        &self,
        sql: &str,
        params: &[SqlValue],
        timeout: Duration,
        max_rows: Option<usize>,
    ) -> DbResult<QueryResult> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.run(timeout, move |conn| read_rows(conn, &sql, &params, max_rows))
            .await
    }

    fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    fn db_type(&self) -> &'static str {
        "duckdb"
    }

    async fn relation_kind(&self, name: &str) -> DbResult<Option<RelationKind>> {
        let (schema, table) = split_qualified_name(name);
        let result = self
            .query(
                "SELECT table_type FROM information_schema.tables \
                 WHERE table_schema = ? AND table_name = ?",
                &[SqlValue::from(schema), SqlValue::from(table)],
            )
            .await?;
        Ok(match result.scalar().as_str() {
            None => None,
            Some("VIEW") => Some(RelationKind::View),
            Some(_) => Some(RelationKind::Table),
        })
    }

    async fn drop_if_exists(&self, name: &str) -> DbResult<()> {
        let quoted = quote_qualified(name);
        match self.relation_kind(name).await? {
            Some(RelationKind::View) => {
                self.execute(&format!("DROP VIEW IF EXISTS {quoted}"), &[])
                    .await?;
            }
            Some(RelationKind::Table) => {
                self.execute(&format!("DROP TABLE IF EXISTS {quoted}"), &[])
                    .await?;
            }
            None => {}
        }
        Ok(())
    }

    async fn create_schema_if_not_exists(&self, schema: &str) -> DbResult<()> {
        let sql = format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema));
        self.execute(&sql, &[]).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
