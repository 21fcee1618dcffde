//! Error types for dnr-core

use thiserror::Error;

/// Core error type for Donorflow
#[derive(Error, Debug)]
pub enum CoreError {
    /// E001: Configuration file not found
    #[error("[E001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// E002: Failed to parse configuration file
    #[error("[E002] Failed to parse config: {message}")]
    ConfigParseError { message: String },

    /// E003: Invalid configuration value
    #[error("[E003] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// E004: Project directory not found
    #[error("[E004] Project directory not found: {path}")]
    ProjectNotFound { path: String },

    /// E005: Serving view not found
    #[error("[E005] Serving view not found: {name}")]
    ViewNotFound { name: String },

    /// E007: Circular dependency detected
    #[error("[E007] Circular dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    /// E008: Empty name where a name is required
    #[error("[E008] Empty name in {context}")]
    EmptyName { context: String },

    /// E009: Unknown entity kind
    #[error("[E009] Unknown entity kind '{kind}'")]
    UnknownEntityKind { kind: String },

    // Source error types (SRC001-SRC008)
    /// SRC001: Source file missing required 'kind' field
    #[error("[SRC001] Source file missing required 'kind' field: {path}. Add `kind: source`")]
    SourceMissingKind { path: String },

    /// SRC004: Source has no tables defined
    #[error("[SRC004] Source '{name}' has no tables defined in {path}")]
    SourceEmptyTables { name: String, path: String },

    /// SRC005: Failed to parse source file
    #[error("[SRC005] Failed to parse source file {path}: {details}")]
    SourceParseError { path: String, details: String },

    /// SRC006: Duplicate source name or id
    #[error("[SRC006] Duplicate source '{name}' in {path1} and {path2}")]
    SourceDuplicate {
        name: String,
        path1: String,
        path2: String,
    },

    /// SRC007: Duplicate table in source
    #[error("[SRC007] Duplicate table '{table}' in source '{source_name}'")]
    SourceDuplicateTable { table: String, source_name: String },

    /// SRC008: Entity mapping is missing a required column
    #[error("[SRC008] Table '{table}' in source '{source_name}' maps entity '{entity}' without a '{column}' column")]
    SourceMissingMapping {
        source_name: String,
        table: String,
        entity: String,
        column: String,
    },

    /// SRC009: Entity mapping names a column the entity does not have
    #[error("[SRC009] Table '{table}' in source '{source_name}' maps unknown column '{column}' for entity '{entity}'")]
    SourceUnknownColumn {
        source_name: String,
        table: String,
        entity: String,
        column: String,
    },

    /// E014: IO error
    #[error("[E014] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// E016: IO error with file path context
    #[error("[E016] Failed to read '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },

    /// E015: YAML parse error
    #[error("[E015] YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
