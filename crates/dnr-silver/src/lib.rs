//! dnr-silver - Entity transformer for Donorflow
//!
//! Turns schema-less `raw.record` payloads into the typed, per-source
//! `silver.*` entity tables.

pub mod coerce;
pub mod error;
pub mod transform;

pub use error::{TransformError, TransformResult};
pub use transform::{TransformCounts, Transformer};
