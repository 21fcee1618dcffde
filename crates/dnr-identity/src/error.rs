//! Error types for dnr-identity

use dnr_db::DbError;
use thiserror::Error;

/// Identity resolution errors
#[derive(Error, Debug)]
pub enum IdentityError {
    /// X001: A computed map broke the one-primary-per-master rule
    #[error("[X001] Master id {master_id} has {primaries} primary rows, expected exactly 1")]
    PrimaryCount { master_id: String, primaries: usize },

    /// X002: Database error
    #[error("[X002] {0}")]
    Db(#[from] DbError),
}

/// Result type alias for IdentityError
pub type IdentityResult<T> = Result<T, IdentityError>;
