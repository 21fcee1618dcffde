//! dnr-ingest - Raw ingestion for Donorflow
//!
//! Lists export blobs per source, filters them through the source's
//! exclusion policy, scans CSV or tag-dump XML content into schema-less rows,
//! and loads those rows into `raw.record` under file lineage.

pub mod blob;
pub mod csv;
pub mod error;
pub mod exclusion;
pub mod loader;
pub mod rows;
pub mod xml;

pub use blob::{BlobRef, BlobStore, LocalBlobStore};
pub use error::{IngestError, IngestResult, ScanError};
pub use exclusion::{ExclusionPolicy, ExclusionReason};
pub use loader::{
    FileCallback, FileReport, IngestOptions, IngestOutcome, Loader, SkipReason, SourceReport,
};
pub use rows::{parse_export, ParsedFile, RawRow};
