//! Error types for dnr-ingest

use dnr_db::DbError;
use dnr_meta::MetaError;
use std::path::PathBuf;
use thiserror::Error;

/// Raw ingestion errors.
///
/// Schema errors are contract violations for one file and are never retried.
/// Transient errors have already been retried up to the configured ceiling.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Source name not registered in the warehouse (I001)
    #[error("[I001] Source '{name}' is not registered; run `dnr setup` first")]
    UnknownSource { name: String },

    /// Blob name matches no table prefix of its source (I002)
    #[error("[I002] No table of source '{source_name}' matches file '{file}'")]
    NoMatchingTable { source_name: String, file: String },

    /// File contents violate the table contract (I003)
    #[error("[I003] Malformed file {blob}: {message}")]
    Schema { blob: String, message: String },

    /// Retries exhausted on a transient failure (I004)
    #[error("[I004] Loading {blob} failed after {attempts} attempts: {message}")]
    Transient {
        blob: String,
        attempts: u32,
        message: String,
    },

    /// Blob store I/O error (I005)
    #[error("[I005] Blob store error at {path}: {source}")]
    Blob {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Lineage bookkeeping failed (I006)
    #[error("[I006] {0}")]
    Meta(#[from] MetaError),

    /// Non-transient database error (I007)
    #[error("[I007] {0}")]
    Db(#[from] DbError),
}

impl IngestError {
    /// Contract errors that retrying cannot fix
    pub fn is_schema(&self) -> bool {
        matches!(
            self,
            IngestError::Schema { .. } | IngestError::NoMatchingTable { .. }
        )
    }
}

/// Result type alias for IngestError
pub type IngestResult<T> = Result<T, IngestError>;

/// Lexical errors from the export scanners
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("unterminated quoted field starting on line {line}")]
    UnterminatedQuote { line: usize },

    #[error("unterminated <row> element starting on line {line}")]
    UnterminatedRow { line: usize },

    #[error("malformed <field> tag on line {line}")]
    MalformedField { line: usize },
}
