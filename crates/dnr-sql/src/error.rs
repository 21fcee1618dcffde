//! Error types for dnr-sql

use thiserror::Error;

/// SQL parsing and guard errors
#[derive(Error, Debug)]
pub enum SqlError {
    /// SQL parse error (S001)
    #[error("[S001] SQL parse error at line {line}, column {column}: {message}")]
    ParseError {
        message: String,
        line: usize,
        column: usize,
    },

    /// Empty SQL (S002)
    #[error("[S002] SQL is empty")]
    EmptySql,

    /// Unsupported SQL statement (S003)
    #[error("[S003] Unsupported SQL statement type: {0}")]
    UnsupportedStatement(String),

    /// Write or administrative keyword in a read-only query (S004)
    #[error("[S004] Keyword '{keyword}' is not allowed in read-only queries")]
    ForbiddenKeyword { keyword: String },

    /// Comments are rejected outright (S005)
    #[error("[S005] SQL comments are not allowed in read-only queries")]
    CommentNotAllowed,

    /// More than one statement (S006)
    #[error("[S006] Only a single statement is allowed")]
    MultipleStatements,

    /// Relation outside the allowed schemas (S007)
    #[error("[S007] Relation '{relation}' is outside the allowed schemas ({allowed})")]
    SchemaNotAllowed { relation: String, allowed: String },

    /// File or environment access function (S008)
    #[error("[S008] Function '{name}' is not allowed in read-only queries")]
    ForbiddenFunction { name: String },
}

/// Result type alias for SqlError
pub type SqlResult<T> = Result<T, SqlError>;
