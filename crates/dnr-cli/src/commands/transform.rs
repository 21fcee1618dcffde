//! Transform command: build silver entity tables from raw records

use anyhow::{Context, Result};
use dnr_core::sql_utils::truncate_message;
use dnr_core::EntityKind;
use dnr_silver::{TransformCounts, TransformError, Transformer};
use std::time::Instant;

use crate::cli::{GlobalArgs, TransformArgs};
use crate::commands::common::{secs, StageOutcome, EXIT_DATABASE, EXIT_FAILURE, SUMMARY_ERROR_LEN};
use crate::context::RuntimeContext;

/// Execute the transform command
pub async fn execute(args: &TransformArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global).await?;
    let outcome = run(&ctx, args).await?;
    println!("\n{}", outcome.summary);
    outcome.into_result()
}

/// Transform each selected source; a failing source does not stop the
/// others
pub(crate) async fn run(ctx: &RuntimeContext, args: &TransformArgs) -> Result<StageOutcome> {
    let entity: Option<EntityKind> = args
        .entity
        .as_deref()
        .map(str::parse)
        .transpose()
        .context("Invalid --entity")?;
    let transformer = Transformer::new(ctx.warehouse.clone(), ctx.project.config.ingest.batch_size);

    let mut totals = TransformCounts::default();
    let mut failures = 0;
    let mut database_failure = false;

    for source in ctx.sources(args.source.as_deref())?.into_iter().skip(args.skip) {
        let start = Instant::now();
        let result = match entity {
            Some(kind) => transformer
                .transform(source, kind)
                .await
                .map(|counts| vec![(kind, counts)]),
            None => transformer.transform_source(source).await,
        };

        match result {
            Ok(results) => {
                for (kind, counts) in results {
                    println!("  ✓ {}.{} ({counts})", source.name, kind);
                    totals.read += counts.read;
                    totals.written += counts.written;
                    totals.skipped_missing_key += counts.skipped_missing_key;
                    totals.coerced_nulls += counts.coerced_nulls;
                    totals.orphans += counts.orphans;
                }
                log::debug!("Transformed {} in {}", source.name, secs(start.elapsed().as_secs_f64()));
            }
            Err(e) => {
                failures += 1;
                database_failure |= matches!(e, TransformError::Db(_) | TransformError::Meta(_));
                println!(
                    "  ✗ {} - {}",
                    source.name,
                    truncate_message(&e.to_string(), SUMMARY_ERROR_LEN)
                );
            }
        }
    }

    Ok(StageOutcome {
        summary: format!("Transformed: {totals}; {failures} source(s) failed"),
        failures,
        exit_code: if database_failure {
            EXIT_DATABASE
        } else {
            EXIT_FAILURE
        },
    })
}
