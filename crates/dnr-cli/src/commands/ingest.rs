//! Ingest command: load export files into `raw.record`

use anyhow::{Context, Result};
use dnr_core::sql_utils::truncate_message;
use dnr_ingest::{
    FileCallback, FileReport, IngestError, IngestOptions, IngestOutcome, LocalBlobStore, Loader,
    SkipReason,
};
use std::sync::Arc;

use crate::cli::{GlobalArgs, IngestArgs};
use crate::commands::common::{
    progress_bar, secs, StageOutcome, EXIT_DATABASE, EXIT_FAILURE, SUMMARY_ERROR_LEN,
};
use crate::context::RuntimeContext;

/// Execute the ingest command
pub async fn execute(args: &IngestArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global).await?;
    let batch_id = uuid::Uuid::new_v4().to_string();
    let outcome = run(&ctx, args, &batch_id).await?;
    println!("\n{}", outcome.summary);
    outcome.into_result()
}

/// One line per finished file
fn file_line(report: &FileReport) -> String {
    match &report.result {
        Ok(IngestOutcome::Loaded { rows, .. }) => format!(
            "  ✓ {} ({} rows) [{}]",
            report.blob,
            rows,
            secs(report.duration_secs)
        ),
        Ok(IngestOutcome::Skipped(SkipReason::NeedsReview)) => {
            format!("  ! {} - {}", report.blob, SkipReason::NeedsReview)
        }
        Ok(IngestOutcome::Skipped(reason)) => format!("  - {} ({reason})", report.blob),
        Err(e) => format!(
            "  ✗ {} - {}",
            report.blob,
            truncate_message(&e.to_string(), SUMMARY_ERROR_LEN)
        ),
    }
}

/// Ingest every selected source with a shared batch id
pub(crate) async fn run(
    ctx: &RuntimeContext,
    args: &IngestArgs,
    batch_id: &str,
) -> Result<StageOutcome> {
    let store = Arc::new(LocalBlobStore::new(ctx.project.storage_root()));
    let loader = Loader::new(
        ctx.warehouse.clone(),
        store,
        ctx.project.config.ingest.clone(),
        batch_id,
    );
    let options = IngestOptions {
        only: args.only.clone(),
        skip: args.skip,
    };

    let (mut loaded, mut skipped, mut review, mut failed, mut rows) = (0, 0, 0, 0, 0);
    let mut database_failure = false;

    for source in ctx.sources(args.source.as_deref())? {
        println!("Ingesting {} ...", source.name);

        let pb = (!args.quiet).then(|| progress_bar(0));
        let callback: Option<FileCallback> = pb.clone().map(|pb| {
            Arc::new(move |report: &FileReport| {
                pb.inc_length(1);
                pb.inc(1);
                pb.suspend(|| println!("{}", file_line(report)));
            }) as FileCallback
        });

        let report = loader
            .ingest_source(source, &options, callback)
            .await
            .with_context(|| format!("Failed to ingest source {}", source.name))?;
        if let Some(pb) = pb {
            pb.finish_and_clear();
        } else {
            for file in &report.files {
                println!("{}", file_line(file));
            }
        }

        loaded += report.loaded_files();
        skipped += report.skipped_files();
        failed += report.failed_files();
        rows += report.rows_loaded();
        review += report
            .files
            .iter()
            .filter(|f| matches!(f.result, Ok(IngestOutcome::Skipped(SkipReason::NeedsReview))))
            .count();
        database_failure |= report.files.iter().any(|f| {
            matches!(
                &f.result,
                Err(IngestError::Db(_) | IngestError::Transient { .. })
            )
        });
    }

    let mut summary = format!(
        "Ingested {rows} rows: {loaded} file(s) loaded, {skipped} skipped, {failed} failed"
    );
    if review > 0 {
        summary.push_str(&format!(", {review} need review (see `dnr status`)"));
    }
    Ok(StageOutcome {
        summary,
        failures: failed,
        exit_code: if database_failure {
            EXIT_DATABASE
        } else {
            EXIT_FAILURE
        },
    })
}
