//! Materialize command: copy serving views into indexed tables

use anyhow::Result;
use dnr_core::sql_utils::truncate_message;
use dnr_serving::{Catalog, Materializer};
use std::time::Instant;

use crate::cli::{GlobalArgs, MaterializeArgs};
use crate::commands::common::{exit_code_for, secs, StageOutcome, SUMMARY_ERROR_LEN};
use crate::context::RuntimeContext;

/// Execute the materialize command
pub async fn execute(args: &MaterializeArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global).await?;
    let outcome = run(&ctx, args).await?;
    println!("\n{}", outcome.summary);
    outcome.into_result()
}

/// Materialize strictly one view at a time, stopping at the first error
pub(crate) async fn run(ctx: &RuntimeContext, args: &MaterializeArgs) -> Result<StageOutcome> {
    let catalog = Catalog::standard()?;
    let materializer = Materializer::new(
        &ctx.warehouse,
        &catalog,
        ctx.project.config.materialize.index_retries,
    );

    let names: Vec<String> = match &args.view {
        Some(view) => vec![catalog.get(view)?.name.clone()],
        None => catalog.ordered()?.iter().map(|v| v.name.clone()).collect(),
    };

    let mut done = 0;
    for name in names.iter().skip(args.skip) {
        let start = Instant::now();
        match materializer.materialize(name).await {
            Ok(outcome) => {
                done += 1;
                let rows = outcome
                    .row_count
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "?".to_string());
                let note = if outcome.already_materialized {
                    ", unchanged"
                } else {
                    ""
                };
                println!(
                    "  ✓ serving.{} ({} rows, {}{note}) [{}]",
                    name,
                    rows,
                    outcome.state,
                    secs(start.elapsed().as_secs_f64())
                );
            }
            Err(e) => {
                let err = anyhow::Error::from(e);
                println!(
                    "  ✗ serving.{} - {}",
                    name,
                    truncate_message(&format!("{err:#}"), SUMMARY_ERROR_LEN)
                );
                return Ok(StageOutcome {
                    summary: format!(
                        "Materialized {done} view(s); stopped at {name} (resume with --skip {})",
                        args.skip + done
                    ),
                    failures: 1,
                    exit_code: exit_code_for(&err),
                });
            }
        }
    }

    Ok(StageOutcome::ok(format!("Materialized {done} view(s)")))
}
