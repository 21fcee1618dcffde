//! Error types for dnr-silver

use dnr_db::DbError;
use dnr_meta::MetaError;
use thiserror::Error;

/// Entity transformer errors.
///
/// Bad values are never errors: they become NULL and are counted.
#[derive(Error, Debug)]
pub enum TransformError {
    /// T001: Source not registered in the warehouse
    #[error("[T001] Source '{name}' is not registered; run `dnr setup` first")]
    UnknownSource { name: String },

    /// T002: Stored raw payload is not a JSON object of strings
    #[error("[T002] Corrupt raw payload in lineage {lineage_id} row {row_number}: {message}")]
    CorruptPayload {
        lineage_id: String,
        row_number: i64,
        message: String,
    },

    /// T003: Metadata error
    #[error("[T003] {0}")]
    Meta(#[from] MetaError),

    /// T004: Database error
    #[error("[T004] {0}")]
    Db(#[from] DbError),
}

/// Result type alias for TransformError
pub type TransformResult<T> = Result<T, TransformError>;
