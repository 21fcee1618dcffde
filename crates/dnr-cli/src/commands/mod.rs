//! Command implementations

pub mod common;
pub mod ingest;
pub mod materialize;
pub mod pipeline;
pub mod query;
pub mod resolve;
pub mod setup;
pub mod status;
pub mod transform;
pub mod views;
