//! Warehouse metadata for Donorflow.
//!
//! Owns the warehouse schema (`meta`, `raw`, `silver`, `serving`), applies
//! migrations on open, and provides the source registry, the file lineage
//! tracker, materialization state and pipeline stage history.

pub mod connection;
pub mod ddl;
pub mod error;
pub mod lineage;
pub mod materialization;
pub mod migration;
pub mod pipeline_run;

pub use connection::{RegisteredSource, Warehouse};
pub use error::{MetaError, MetaResult};
pub use lineage::{LineageRecord, LineageStatus, LineageTracker, NewLineage};
pub use materialization::{MaterializationRecord, MaterializationState, MaterializationStore};
pub use pipeline_run::{PipelineRunLog, StageRecord};
