//! dnr-sql - SQL parsing layer for Donorflow
//!
//! This crate provides SQL parsing using sqlparser-rs, relation extraction
//! via the AST visitor, and the guard that admits ad-hoc read-only queries.

pub mod dialect;
pub mod error;
pub mod extractor;
pub mod guard;
pub mod parser;

pub use dialect::{DuckDbDialect, SqlDialect};
pub use error::{SqlError, SqlResult};
pub use extractor::{extract_cte_names, extract_dependencies};
pub use guard::{GuardPolicy, GuardedQuery, QueryGuard};
pub use parser::SqlParser;
