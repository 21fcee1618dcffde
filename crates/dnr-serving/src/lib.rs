//! dnr-serving - Serving layer for Donorflow
//!
//! Declares the serving views over the silver layer and the identity map,
//! defines them in dependency order, materializes them into indexed tables,
//! and reports integrity figures for a finished run.

pub mod builder;
pub mod catalog;
pub mod error;
pub mod integrity;
pub mod materialize;
pub mod query;

pub use builder::{DefineResult, ViewBuilder};
pub use catalog::{Catalog, ViewDef, SERVING_SCHEMA};
pub use error::{ServingError, ServingResult};
pub use integrity::{CheckResult, IntegrityChecker, IntegrityReport, Linkage};
pub use materialize::{MaterializeOutcome, Materializer};
pub use query::{QueryOutput, QueryRunner};
