use async_trait::async_trait;
use dnr_core::config::IngestConfig;
use dnr_core::{InconclusivePolicy, SourceFile};
use dnr_db::{
    Database, DbError, DbResult, DuckDbBackend, QueryResult, RelationKind, SqlStatement,
    SqlValue, Timeouts,
};
use dnr_ingest::{
    BlobRef, ExclusionReason, IngestError, IngestOptions, IngestOutcome, Loader, LocalBlobStore,
    SkipReason,
};
use dnr_meta::{LineageStatus, NewLineage, Warehouse};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const GIVEBUTTER: &str = r#"
kind: source
id: 3
name: givebutter
exclude_prefixes: ["pass2_"]
tables:
  - name: donors
    file_prefix: donors
    entities:
      - kind: contact
        columns:
          source_record_id: id
          email: email
  - name: contacts
    file_prefix: contacts
    header_row: 1
"#;

fn source() -> SourceFile {
    SourceFile::from_yaml(GIVEBUTTER, Path::new("givebutter.yml")).unwrap()
}

fn fast_config() -> IngestConfig {
    IngestConfig {
        batch_size: 2,
        batch_delay_ms: 0,
        workers: 2,
        max_retries: 3,
        retry_base_ms: 1,
        on_inconclusive: InconclusivePolicy::Reingest,
    }
}

struct Fixture {
    dir: TempDir,
    warehouse: Warehouse,
    source: SourceFile,
}

impl Fixture {
    async fn new() -> Self {
        Self::with_db(Arc::new(DuckDbBackend::in_memory().unwrap())).await
    }

    async fn with_db(db: Arc<dyn Database>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("givebutter")).unwrap();
        let warehouse = Warehouse::from_database(db).await.unwrap();
        let source = source();
        warehouse
            .register_sources(std::slice::from_ref(&source))
            .await
            .unwrap();
        Self {
            dir,
            warehouse,
            source,
        }
    }

    fn write(&self, name: &str, content: &str) -> BlobRef {
        std::fs::write(self.dir.path().join("givebutter").join(name), content).unwrap();
        BlobRef::new("givebutter", name)
    }

    fn loader(&self, config: IngestConfig) -> Loader {
        Loader::new(
            self.warehouse.clone(),
            Arc::new(LocalBlobStore::new(self.dir.path())),
            config,
            "batch-1",
        )
    }

    async fn raw_rows(&self) -> usize {
        self.warehouse
            .db()
            .query_count("SELECT * FROM raw.record")
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_ingest_is_idempotent() {
    let fx = Fixture::new().await;
    let blob = fx.write("donors.csv", "id,email,amount\n1,a@x.com,10\n2,A@X.com,20\n");
    let loader = fx.loader(fast_config());

    let first = loader.ingest(&fx.source, &blob).await.unwrap();
    assert!(matches!(first, IngestOutcome::Loaded { rows: 2, .. }));
    assert_eq!(fx.raw_rows().await, 2);

    let second = loader.ingest(&fx.source, &blob).await.unwrap();
    assert_eq!(second, IngestOutcome::Skipped(SkipReason::AlreadyLoaded));
    assert_eq!(fx.raw_rows().await, 2);
}

#[tokio::test]
async fn test_trailing_blank_line_is_already_loaded() {
    let fx = Fixture::new().await;
    let blob = fx.write("donors.csv", "id,email\n1,a@x.com\n");
    let loader = fx.loader(fast_config());
    loader.ingest(&fx.source, &blob).await.unwrap();

    fx.write("donors.csv", "id,email\n1,a@x.com\n\n");
    let outcome = loader.ingest(&fx.source, &blob).await.unwrap();
    assert_eq!(outcome, IngestOutcome::Skipped(SkipReason::AlreadyLoaded));
}

#[tokio::test]
async fn test_row_numbers_follow_source_order() {
    let fx = Fixture::new().await;
    let blob = fx.write(
        "donors.csv",
        "id,email\n1,a@x.com\n\n2,b@x.com\n3,\"multi\nline\"\n4,d@x.com\n5,e@x.com\n",
    );
    fx.loader(fast_config()).ingest(&fx.source, &blob).await.unwrap();

    let result = fx
        .warehouse
        .db()
        .query(
            "SELECT row_number, payload FROM raw.record ORDER BY row_number",
            &[],
        )
        .await
        .unwrap();
    let pairs: Vec<(i64, String)> = result
        .rows
        .iter()
        .map(|r| {
            let payload: serde_json::Value = serde_json::from_str(r[1].as_str().unwrap()).unwrap();
            (r[0].as_i64().unwrap(), payload["id"].as_str().unwrap().to_string())
        })
        .collect();
    assert_eq!(
        pairs,
        (1..=5).map(|i| (i, i.to_string())).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_header_row_parameter() {
    let fx = Fixture::new().await;
    let blob = fx.write(
        "contacts_export.csv",
        "Exported from Givebutter - do not edit\nid,name,,\n1,Ann,,\n",
    );
    fx.loader(fast_config()).ingest(&fx.source, &blob).await.unwrap();

    let result = fx
        .warehouse
        .db()
        .query("SELECT payload, table_name FROM raw.record", &[])
        .await
        .unwrap();
    assert_eq!(result.rows[0][0].as_str(), Some(r#"{"id":"1","name":"Ann"}"#));
    assert_eq!(result.rows[0][1].as_str(), Some("contacts"));
}

#[tokio::test]
async fn test_lineage_marked_loaded() {
    let fx = Fixture::new().await;
    let blob = fx.write("donors.csv", "id\n1\n2\n3\n");
    let outcome = fx.loader(fast_config()).ingest(&fx.source, &blob).await.unwrap();
    let IngestOutcome::Loaded { lineage_id, .. } = outcome else {
        panic!("expected a load");
    };

    let record = fx.warehouse.lineage().get(&lineage_id).await.unwrap().unwrap();
    assert_eq!(record.status, LineageStatus::Loaded);
    assert_eq!(record.row_count, Some(3));
    assert_eq!(record.batch_id, "batch-1");
    assert_eq!(record.blob_path, "givebutter/donors.csv");
    assert_eq!(record.source_id, 3);
}

#[tokio::test]
async fn test_unmatched_file_is_schema_error() {
    let fx = Fixture::new().await;
    let blob = fx.write("refunds.csv", "id\n1\n");
    let err = fx.loader(fast_config()).ingest(&fx.source, &blob).await.unwrap_err();
    assert!(err.is_schema());
    assert_eq!(fx.raw_rows().await, 0);
}

#[tokio::test]
async fn test_unregistered_source() {
    let fx = Fixture::new().await;
    let mut other = source();
    other.name = dnr_core::SourceName::try_new("stripe").unwrap();
    let err = fx
        .loader(fast_config())
        .ingest(&other, &BlobRef::new("stripe", "donors.csv"))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::UnknownSource { .. }));
}

#[tokio::test]
async fn test_unterminated_quote_is_schema_error() {
    let fx = Fixture::new().await;
    let blob = fx.write("donors.csv", "id,note\n1,\"never closed\n");
    let err = fx.loader(fast_config()).ingest(&fx.source, &blob).await.unwrap_err();
    assert!(matches!(err, IngestError::Schema { .. }));
}

#[tokio::test]
async fn test_header_only_file_loads_zero_rows() {
    let fx = Fixture::new().await;
    let blob = fx.write("donors.csv", "id,email\n");
    let outcome = fx.loader(fast_config()).ingest(&fx.source, &blob).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Loaded { rows: 0, .. }));

    let blob = fx.write("donors_empty.csv", "\n\n");
    let outcome = fx.loader(fast_config()).ingest(&fx.source, &blob).await.unwrap();
    assert_eq!(outcome, IngestOutcome::Skipped(SkipReason::Empty));
}

async fn leave_inconclusive(fx: &Fixture, blob: &BlobRef) -> String {
    let lineage = fx.warehouse.lineage();
    let id = lineage
        .record_file_start(&NewLineage {
            batch_id: "crashed".to_string(),
            source_id: 3,
            table_name: "donors".to_string(),
            blob_path: blob.key(),
            content_hash: "partial".to_string(),
            row_count: Some(2),
        })
        .await
        .unwrap();
    fx.warehouse
        .db()
        .execute(
            "INSERT INTO raw.record VALUES (?, 3, 'donors', 1, 'h', '{}')",
            &[SqlValue::from(id.as_str())],
        )
        .await
        .unwrap();
    id
}

#[tokio::test]
async fn test_inconclusive_load_reingested() {
    let fx = Fixture::new().await;
    let blob = fx.write("donors.csv", "id\n1\n2\n");
    let stale = leave_inconclusive(&fx, &blob).await;

    let outcome = fx.loader(fast_config()).ingest(&fx.source, &blob).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Loaded { rows: 2, .. }));
    assert!(fx.warehouse.lineage().get(&stale).await.unwrap().is_none());
    assert_eq!(fx.raw_rows().await, 2);
}

#[tokio::test]
async fn test_inconclusive_load_held_for_review() {
    let fx = Fixture::new().await;
    let blob = fx.write("donors.csv", "id\n1\n2\n");
    let stale = leave_inconclusive(&fx, &blob).await;

    let config = IngestConfig {
        on_inconclusive: InconclusivePolicy::Review,
        ..fast_config()
    };
    let outcome = fx.loader(config).ingest(&fx.source, &blob).await.unwrap();
    assert_eq!(outcome, IngestOutcome::Skipped(SkipReason::NeedsReview));

    let record = fx.warehouse.lineage().get(&stale).await.unwrap().unwrap();
    assert_eq!(record.status, LineageStatus::Loading);
}

#[tokio::test]
async fn test_ingest_source_filters_and_reports() {
    let fx = Fixture::new().await;
    fx.write("donors_a.csv", "id\n1\n");
    fx.write("donors_b.csv", "id\n2\n3\n");
    fx.write("pass2_donors_a.csv", "id\n1\n");
    fx.write("notes.txt.bak", "ignored");
    fx.write("refunds.csv", "id\n9\n");

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let report = fx
        .loader(fast_config())
        .ingest_source(
            &fx.source,
            &IngestOptions::default(),
            Some(Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .await
        .unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 5);
    assert_eq!(report.loaded_files(), 2);
    assert_eq!(report.skipped_files(), 2);
    assert_eq!(report.failed_files(), 1);
    assert_eq!(report.rows_loaded(), 3);

    let names: Vec<_> = report.files.iter().map(|f| f.blob.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["donors_a.csv", "donors_b.csv", "notes.txt.bak", "pass2_donors_a.csv", "refunds.csv"]
    );
    assert!(matches!(
        report.files[3].result,
        Ok(IngestOutcome::Skipped(SkipReason::Excluded(ExclusionReason::DuplicatePass { .. })))
    ));
}

#[tokio::test]
async fn test_ingest_source_only_and_skip() {
    let fx = Fixture::new().await;
    fx.write("donors_a.csv", "id\n1\n");
    fx.write("donors_b.csv", "id\n2\n");
    fx.write("donors_c.csv", "id\n3\n");
    let loader = fx.loader(fast_config());

    let only = IngestOptions {
        only: Some("donors_b.csv".to_string()),
        skip: 0,
    };
    let report = loader.ingest_source(&fx.source, &only, None).await.unwrap();
    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].blob.name, "donors_b.csv");

    let skip = IngestOptions { only: None, skip: 2 };
    let report = loader.ingest_source(&fx.source, &skip, None).await.unwrap();
    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].blob.name, "donors_c.csv");
}

/// Backend whose batch inserts time out a fixed number of times
struct FlakyDb {
    inner: DuckDbBackend,
    failures_left: AtomicUsize,
}

impl FlakyDb {
    fn new(failures: usize) -> Self {
        Self {
            inner: DuckDbBackend::in_memory().unwrap(),
            failures_left: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl Database for FlakyDb {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> DbResult<usize> {
        self.inner.execute(sql, params).await
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.inner.execute_batch(sql).await
    }

    async fn execute_many(&self, sql: &str, rows: Vec<Vec<SqlValue>>) -> DbResult<usize> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(DbError::Timeout { seconds: 0 });
        }
        self.inner.execute_many(sql, rows).await
    }

    async fn transaction(&self, statements: Vec<SqlStatement>) -> DbResult<()> {
        self.inner.transaction(statements).await
    }

    async fn query_with_limits(
        &self,
        sql: &str,
        params: &[SqlValue],
        timeout: Duration,
        max_rows: Option<usize>,
    ) -> DbResult<QueryResult> {
        self.inner
            .query_with_limits(sql, params, timeout, max_rows)
            .await
    }

    fn timeouts(&self) -> Timeouts {
        self.inner.timeouts()
    }

    fn db_type(&self) -> &'static str {
        "flaky"
    }

    async fn relation_kind(&self, name: &str) -> DbResult<Option<RelationKind>> {
        self.inner.relation_kind(name).await
    }

    async fn drop_if_exists(&self, name: &str) -> DbResult<()> {
        self.inner.drop_if_exists(name).await
    }

    async fn create_schema_if_not_exists(&self, schema: &str) -> DbResult<()> {
        self.inner.create_schema_if_not_exists(schema).await
    }
}

#[tokio::test]
async fn test_transient_batch_failure_retried() {
    let fx = Fixture::with_db(Arc::new(FlakyDb::new(2))).await;
    let blob = fx.write("donors.csv", "id\n1\n2\n3\n");

    let outcome = fx.loader(fast_config()).ingest(&fx.source, &blob).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Loaded { rows: 3, .. }));
    assert_eq!(fx.raw_rows().await, 3);
}

#[tokio::test]
async fn test_exhausted_retries_mark_lineage_failed() {
    let fx = Fixture::with_db(Arc::new(FlakyDb::new(10))).await;
    let blob = fx.write("donors.csv", "id\n1\n2\n3\n");

    let err = fx.loader(fast_config()).ingest(&fx.source, &blob).await.unwrap_err();
    assert!(matches!(err, IngestError::Transient { attempts: 3, .. }));

    let records = fx.warehouse.lineage().list(Some(3)).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, LineageStatus::Failed);
    assert!(records[0].error.is_some());
}
