//! Error types for the warehouse metadata layer.

use dnr_db::DbError;
use thiserror::Error;

/// Warehouse metadata errors.
#[derive(Error, Debug)]
pub enum MetaError {
    /// Failed to open or create the warehouse (M001).
    #[error("[M001] Warehouse connection failed: {0}")]
    ConnectionError(String),

    /// Schema migration failed (M002).
    #[error("[M002] Warehouse migration failed: {0}")]
    MigrationError(String),

    /// Source registry conflict (M003).
    #[error("[M003] Source '{name}' (id {source_id}) conflicts with registered source '{existing_name}' (id {existing_id})")]
    SourceConflict {
        name: String,
        source_id: i32,
        existing_name: String,
        existing_id: i32,
    },

    /// Lineage row not found (M004).
    #[error("[M004] Lineage record not found: {lineage_id}")]
    LineageNotFound { lineage_id: String },

    /// Lineage status transition not allowed (M005).
    #[error("[M005] Lineage {lineage_id} cannot move from '{from}' to '{to}'")]
    InvalidTransition {
        lineage_id: String,
        from: String,
        to: String,
    },

    /// Stored value could not be interpreted (M006).
    #[error("[M006] Unexpected stored value in {table}: {value}")]
    CorruptValue { table: String, value: String },

    /// Warehouse driver error with preserved source chain (M007).
    #[error("[M007] {0}")]
    Db(#[from] DbError),
}

impl MetaError {
    /// Whether retrying may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, MetaError::Db(e) if e.is_transient())
    }
}

/// Result type alias for [`MetaError`].
pub type MetaResult<T> = Result<T, MetaError>;
