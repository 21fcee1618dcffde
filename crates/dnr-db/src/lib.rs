//! dnr-db - Warehouse access layer for Donorflow
//!
//! This crate provides the `Database` trait and a DuckDB implementation with
//! a small connection pool. Every call carries an explicit timeout: short for
//! point lookups, long for bulk copies and batch inserts.

pub mod duckdb;
pub mod error;
pub mod traits;
pub mod value;

pub use duckdb::DuckDbBackend;
pub use error::{DbError, DbResult};
pub use traits::{Database, RelationKind, SqlStatement, Timeouts};
pub use value::{QueryResult, SqlValue};
