//! Batched raw loader.
//!
//! One blob goes through: exclusion, table lookup, download, content hash,
//! lineage idempotence check, parse, then fixed-size insert batches into
//! `raw.record` with pacing and retry. Files of one source are loaded
//! concurrently up to the configured worker count.

use crate::blob::{BlobRef, BlobStore};
use crate::error::{IngestError, IngestResult};
use crate::exclusion::{ExclusionPolicy, ExclusionReason};
use crate::rows::{decode_content, parse_export, RawRow};
use dnr_core::config::IngestConfig;
use dnr_core::sql_utils::truncate_message;
use dnr_core::{content_hash, InconclusivePolicy, SourceFile, SourceTable};
use dnr_db::{DbError, SqlValue};
use dnr_meta::{NewLineage, Warehouse};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Semaphore;

const INSERT_RAW: &str = "INSERT INTO raw.record \
     (lineage_id, source_id, table_name, row_number, record_hash, payload) \
     VALUES (?, ?, ?, ?, ?, ?) ON CONFLICT DO NOTHING";

/// Longest error text stored on a lineage row
const LINEAGE_ERROR_LEN: usize = 500;

/// Why a blob produced no new rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Same blob path and content hash already loaded
    AlreadyLoaded,
    /// Filtered by the source's exclusion policy
    Excluded(ExclusionReason),
    /// An earlier load of this blob never finished and policy says review
    NeedsReview,
    /// No header record
    Empty,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyLoaded => f.write_str("already loaded"),
            SkipReason::Excluded(reason) => write!(f, "excluded: {reason}"),
            SkipReason::NeedsReview => f.write_str("inconclusive earlier load, needs review"),
            SkipReason::Empty => f.write_str("empty file"),
        }
    }
}

/// Result of ingesting one blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Loaded { rows: usize, lineage_id: String },
    Skipped(SkipReason),
}

/// Filters for one ingestion run
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Only this file name
    pub only: Option<String>,
    /// Skip the first N candidate files (resume offset)
    pub skip: usize,
}

/// Outcome of one file within a source run
#[derive(Debug)]
pub struct FileReport {
    pub blob: BlobRef,
    pub result: IngestResult<IngestOutcome>,
    pub duration_secs: f64,
}

impl FileReport {
    pub fn rows_loaded(&self) -> usize {
        match &self.result {
            Ok(IngestOutcome::Loaded { rows, .. }) => *rows,
            _ => 0,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.result.is_err()
    }
}

/// All file outcomes of one source, in blob name order
#[derive(Debug)]
pub struct SourceReport {
    pub source: String,
    pub files: Vec<FileReport>,
}

impl SourceReport {
    pub fn loaded_files(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.result, Ok(IngestOutcome::Loaded { .. })))
            .count()
    }

    pub fn skipped_files(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.result, Ok(IngestOutcome::Skipped(_))))
            .count()
    }

    pub fn failed_files(&self) -> usize {
        self.files.iter().filter(|f| f.is_failure()).count()
    }

    pub fn rows_loaded(&self) -> usize {
        self.files.iter().map(FileReport::rows_loaded).sum()
    }
}

/// Called as each file finishes, from the worker task
pub type FileCallback = Arc<dyn Fn(&FileReport) + Send + Sync>;

/// Loads export blobs into `raw.record`
#[derive(Clone)]
pub struct Loader {
    warehouse: Warehouse,
    store: Arc<dyn BlobStore>,
    config: IngestConfig,
    batch_id: String,
}

impl Loader {
    /// `batch_id` groups every lineage row written by this loader
    pub fn new(
        warehouse: Warehouse,
        store: Arc<dyn BlobStore>,
        config: IngestConfig,
        batch_id: impl Into<String>,
    ) -> Self {
        Self {
            warehouse,
            store,
            config,
            batch_id: batch_id.into(),
        }
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    /// Ingest a single blob of `source`
    pub async fn ingest(&self, source: &SourceFile, blob: &BlobRef) -> IngestResult<IngestOutcome> {
        let source_id = self.registered_id(source).await?;
        self.load_blob(source, source_id, blob).await
    }

    /// Ingest every candidate blob of `source`.
    ///
    /// Per-file failures are collected in the report; only an unknown source
    /// or a failed listing fails the whole call.
    pub async fn ingest_source(
        &self,
        source: &SourceFile,
        options: &IngestOptions,
        on_file: Option<FileCallback>,
    ) -> IngestResult<SourceReport> {
        let source_id = self.registered_id(source).await?;

        let mut blobs = self.store.list(source.name.as_str()).await?;
        if let Some(only) = &options.only {
            blobs.retain(|b| &b.name == only);
        }
        let blobs: Vec<BlobRef> = blobs.into_iter().skip(options.skip).collect();
        log::info!(
            "Ingesting {} file(s) for source {} with {} worker(s)",
            blobs.len(),
            source.name,
            self.config.workers
        );

        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let source = Arc::new(source.clone());
        let reports = Arc::new(Mutex::new(Vec::with_capacity(blobs.len())));
        let mut handles = Vec::with_capacity(blobs.len());

        for blob in blobs {
            let loader = self.clone();
            let source = Arc::clone(&source);
            let semaphore = Arc::clone(&semaphore);
            let reports = Arc::clone(&reports);
            let on_file = on_file.clone();

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return;
                };
                let started = Instant::now();
                let result = loader.load_blob(&source, source_id, &blob).await;
                let report = FileReport {
                    blob,
                    result,
                    duration_secs: started.elapsed().as_secs_f64(),
                };
                if let Some(callback) = &on_file {
                    callback(&report);
                }
                reports
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .push(report);
            }));
        }

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                log::warn!("Ingest task join error: {e}");
            }
        }

        let mut files = std::mem::take(&mut *reports.lock().unwrap_or_else(|p| p.into_inner()));
        files.sort_by(|a, b| a.blob.cmp(&b.blob));
        Ok(SourceReport {
            source: source.name.to_string(),
            files,
        })
    }

    async fn registered_id(&self, source: &SourceFile) -> IngestResult<i32> {
        match self.warehouse.source_id(source.name.as_str()).await? {
            Some(id) => Ok(id),
            None => Err(IngestError::UnknownSource {
                name: source.name.to_string(),
            }),
        }
    }

    async fn load_blob(
        &self,
        source: &SourceFile,
        source_id: i32,
        blob: &BlobRef,
    ) -> IngestResult<IngestOutcome> {
        if let Some(reason) = ExclusionPolicy::for_source(source).check(&blob.name) {
            log::debug!("Skipping {blob}: {reason}");
            return Ok(IngestOutcome::Skipped(SkipReason::Excluded(reason)));
        }
        let table = source
            .table_for_file(&blob.name)
            .ok_or_else(|| IngestError::NoMatchingTable {
                source_name: source.name.to_string(),
                file: blob.name.clone(),
            })?;

        let bytes = self.store.download(blob).await?;
        let (text, latin1) = decode_content(&bytes);
        if latin1 {
            log::warn!("{blob} is not valid UTF-8, read as Latin-1");
        }

        let blob_path = blob.key();
        let hash = content_hash(&text);
        let lineage = self.warehouse.lineage();
        if lineage.is_already_loaded(&blob_path, &hash).await? {
            log::info!("Skipping {blob}: already loaded");
            return Ok(IngestOutcome::Skipped(SkipReason::AlreadyLoaded));
        }

        let inconclusive = lineage.find_inconclusive(&blob_path).await?;
        if !inconclusive.is_empty() {
            match self.config.on_inconclusive {
                InconclusivePolicy::Review => {
                    log::warn!(
                        "Skipping {blob}: {} inconclusive load(s) need review",
                        inconclusive.len()
                    );
                    return Ok(IngestOutcome::Skipped(SkipReason::NeedsReview));
                }
                InconclusivePolicy::Reingest => {
                    for record in &inconclusive {
                        lineage.discard(&record.lineage_id).await?;
                    }
                }
            }
        }

        let parsed = parse_export(source.format, &text, source.delimiter, table.header_row)
            .map_err(|e| IngestError::Schema {
                blob: blob.key(),
                message: e.to_string(),
            })?;
        if !parsed.has_header() {
            log::info!("Skipping {blob}: no header record");
            return Ok(IngestOutcome::Skipped(SkipReason::Empty));
        }

        let row_count = parsed.rows.len() as i64;
        let lineage_id = lineage
            .record_file_start(&NewLineage {
                batch_id: self.batch_id.clone(),
                source_id,
                table_name: table.name.clone(),
                blob_path: blob_path.clone(),
                content_hash: hash,
                row_count: Some(row_count),
            })
            .await?;

        let inserted = match self
            .insert_rows(blob, &lineage_id, source_id, table, &parsed.rows)
            .await
        {
            Ok(inserted) => inserted,
            Err(e) => {
                let message = truncate_message(&e.to_string(), LINEAGE_ERROR_LEN);
                if let Err(mark_err) = lineage.mark_failed(&lineage_id, &message).await {
                    log::warn!("Could not mark lineage {lineage_id} failed: {mark_err}");
                }
                return Err(e);
            }
        };

        lineage.mark_loaded(&lineage_id, row_count).await?;
        log::info!("Loaded {blob}: {inserted} row(s) into raw.record");
        Ok(IngestOutcome::Loaded {
            rows: inserted,
            lineage_id,
        })
    }

    async fn insert_rows(
        &self,
        blob: &BlobRef,
        lineage_id: &str,
        source_id: i32,
        table: &SourceTable,
        rows: &[RawRow],
    ) -> IngestResult<usize> {
        let mut inserted = 0;
        for (index, chunk) in rows.chunks(self.config.batch_size.max(1)).enumerate() {
            if index > 0 && !self.config.batch_delay().is_zero() {
                tokio::time::sleep(self.config.batch_delay()).await;
            }
            let params: Vec<Vec<SqlValue>> = chunk
                .iter()
                .map(|row| {
                    vec![
                        SqlValue::from(lineage_id),
                        SqlValue::from(source_id),
                        SqlValue::from(table.name.as_str()),
                        SqlValue::Int(row.row_number),
                        SqlValue::from(row.record_hash.as_str()),
                        SqlValue::Text(row.payload_json()),
                    ]
                })
                .collect();
            inserted += self.insert_batch(blob, params).await?;
        }
        Ok(inserted)
    }

    /// One batch with exponential backoff on transient errors
    async fn insert_batch(&self, blob: &BlobRef, params: Vec<Vec<SqlValue>>) -> IngestResult<usize> {
        let attempts = self.config.max_retries.max(1);
        let mut attempt = 1;
        loop {
            match self
                .warehouse
                .db()
                .execute_many(INSERT_RAW, params.clone())
                .await
            {
                Ok(inserted) => return Ok(inserted),
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = self.config.backoff(attempt - 1);
                    log::warn!(
                        "Batch insert for {blob} failed (attempt {attempt}/{attempts}), retrying in {}ms: {e}",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(batch_error(blob, attempt, e)),
            }
        }
    }
}

fn batch_error(blob: &BlobRef, attempts: u32, err: DbError) -> IngestError {
    if err.is_transient() {
        IngestError::Transient {
            blob: blob.key(),
            attempts,
            message: err.to_string(),
        }
    } else {
        IngestError::Db(err)
    }
}
