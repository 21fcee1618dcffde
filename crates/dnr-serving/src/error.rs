//! Error types for dnr-serving

use dnr_core::CoreError;
use dnr_db::DbError;
use dnr_identity::IdentityError;
use dnr_meta::MetaError;
use dnr_sql::SqlError;
use thiserror::Error;

/// Serving layer errors
#[derive(Error, Debug)]
pub enum ServingError {
    /// V001: View is not in the catalog
    #[error("[V001] Serving view '{name}' is not in the catalog")]
    ViewNotFound { name: String },

    /// V002: A view selects from a serving view that is still logical
    #[error("[V002] Cannot materialize '{view}': dependency '{dependency}' is not materialized yet")]
    DependencyNotMaterialized { view: String, dependency: String },

    /// V003: Warehouse object is not what the state machine expects
    #[error("[V003] Invariant violated for '{view}': {message}")]
    InvariantViolation { view: String, message: String },

    /// V004: Catalog definition is inconsistent
    #[error("[V004] Invalid catalog entry '{view}': {message}")]
    Catalog { view: String, message: String },

    /// V005: Core error (dependency cycle)
    #[error("[V005] {0}")]
    Core(#[from] CoreError),

    /// V006: Metadata error
    #[error("[V006] {0}")]
    Meta(#[from] MetaError),

    /// V007: Database error
    #[error("[V007] {0}")]
    Db(#[from] DbError),

    /// V008: SQL rejected or unparseable
    #[error("[V008] {0}")]
    Sql(#[from] SqlError),

    /// V009: Identity store could not be read
    #[error("[V009] {0}")]
    Identity(#[from] IdentityError),
}

/// Result type alias for ServingError
pub type ServingResult<T> = Result<T, ServingError>;
