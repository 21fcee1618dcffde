//! dnr-core - Core library for Donorflow
//!
//! Shared types used by every pipeline stage: configuration, source system
//! definitions, silver entity layouts, hashing, SQL quoting, the serving view
//! DAG, and pipeline run state.

pub mod checksum;
pub mod config;
pub mod dag;
pub mod entity;
pub mod error;
pub mod names;
mod newtype_string;
pub mod project;
pub mod run_state;
pub mod source;
pub mod sql_utils;

pub use checksum::{compute_checksum, content_hash};
pub use config::{Config, InconclusivePolicy};
pub use dag::ViewDag;
pub use entity::{EntityKind, FieldSpec, FieldType};
pub use error::{CoreError, CoreResult};
pub use names::{SourceName, ViewName};
pub use project::Project;
pub use run_state::{RunState, RunStatus};
pub use source::{ColumnSource, EntityMapping, SourceFile, SourceFormat, SourceTable};
