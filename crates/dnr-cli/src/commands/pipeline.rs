//! Pipeline command: every stage in order, with resume support

use anyhow::{Context, Result};
use dnr_core::run_state::{RunState, RunStatus};
use dnr_core::sql_utils::truncate_message;
use dnr_serving::{Catalog, IntegrityChecker, IntegrityReport};
use std::path::Path;
use std::time::Instant;

use crate::cli::{GlobalArgs, IngestArgs, MaterializeArgs, PipelineArgs, TransformArgs, ViewsArgs};
use crate::commands::common::{exit_code_for, secs, ExitCode, StageOutcome, SUMMARY_ERROR_LEN};
use crate::commands::{ingest, materialize, resolve, setup, transform, views};
use crate::context::RuntimeContext;

/// Stages of a full run, in order
pub(crate) const STAGES: [&str; 7] = [
    "setup",
    "ingest",
    "transform",
    "resolve",
    "views",
    "materialize",
    "integrity",
];

/// Execute the pipeline command
pub async fn execute(args: &PipelineArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global).await?;
    let state_path = ctx.project.target_dir().join("run_state.json");

    let Some(mut state) = initial_state(&state_path, args.resume)? else {
        println!("Previous run completed; nothing to resume.");
        return Ok(());
    };
    save_state(&state, &state_path);

    let run_id = state.run_id.clone();
    let runs = ctx.warehouse.pipeline_runs();
    let run_start = Instant::now();

    for stage in STAGES {
        if state.is_completed(stage) {
            println!("- {stage} (completed in previous run)");
            continue;
        }

        if let Err(e) = runs.stage_started(&run_id, stage).await {
            log::warn!("Failed to record start of stage {stage}: {e}");
        }

        if stage == "ingest" && args.skip_ingest {
            println!("- ingest (skipped)");
            finish_stage(&ctx, &run_id, stage, true, "skipped").await;
            state.mark_completed(stage, 0);
            save_state(&state, &state_path);
            continue;
        }

        println!("\n== {stage} ==");
        let start = Instant::now();
        let (summary, exit_code) = match run_stage(&ctx, stage, &run_id).await {
            Ok(outcome) if outcome.succeeded() => {
                let elapsed = start.elapsed();
                println!("{} [{}]", outcome.summary, secs(elapsed.as_secs_f64()));
                finish_stage(&ctx, &run_id, stage, true, &outcome.summary).await;
                state.mark_completed(stage, elapsed.as_millis() as u64);
                save_state(&state, &state_path);
                continue;
            }
            Ok(outcome) => (outcome.summary, outcome.exit_code),
            Err(err) => {
                let message = format!("{err:#}");
                println!("  ✗ {}", truncate_message(&message, SUMMARY_ERROR_LEN));
                (message, exit_code_for(&err))
            }
        };

        finish_stage(&ctx, &run_id, stage, false, &summary).await;
        state.mark_failed(stage, &summary);
        save_state(&state, &state_path);

        let completed: Vec<&str> = state
            .completed_stages
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        println!("\nPipeline failed at stage '{stage}': {summary}");
        println!(
            "Completed stages: {}",
            if completed.is_empty() {
                "none".to_string()
            } else {
                completed.join(", ")
            }
        );
        println!("Resume with: dnr pipeline --resume");
        return Err(ExitCode(exit_code).into());
    }

    state.mark_run_completed();
    save_state(&state, &state_path);
    println!(
        "\nPipeline completed in {} (run {run_id})",
        secs(run_start.elapsed().as_secs_f64())
    );
    Ok(())
}

/// Fresh state, or the previous failed state when resuming; `None` when
/// there is nothing left to resume
fn initial_state(path: &Path, resume: bool) -> Result<Option<RunState>> {
    if !resume {
        return Ok(Some(RunState::new(&STAGES)));
    }
    let mut state = RunState::load(path)
        .context("Failed to load run state")?
        .ok_or_else(|| anyhow::anyhow!("No run state found. Run 'dnr pipeline' first."))?;
    if state.status == RunStatus::Completed {
        return Ok(None);
    }
    state.resume();
    println!(
        "Resuming run {}: {} stage(s) done, {} to run\n",
        state.run_id,
        state.completed_stages.len(),
        state.pending_stages.len()
    );
    Ok(Some(state))
}

fn save_state(state: &RunState, path: &Path) {
    if let Err(e) = state.save(path) {
        eprintln!("Warning: Failed to save run state: {}", e);
    }
}

async fn finish_stage(ctx: &RuntimeContext, run_id: &str, stage: &str, ok: bool, summary: &str) {
    if let Err(e) = ctx
        .warehouse
        .pipeline_runs()
        .stage_finished(run_id, stage, ok, summary)
        .await
    {
        log::warn!("Failed to record end of stage {stage}: {e}");
    }
}

/// The run id doubles as the ingestion batch id, so a resumed run keeps
/// tagging files with the same batch
async fn run_stage(ctx: &RuntimeContext, stage: &str, run_id: &str) -> Result<StageOutcome> {
    match stage {
        "setup" => setup::run(ctx).await,
        "ingest" => ingest::run(ctx, &IngestArgs::default(), run_id).await,
        "transform" => transform::run(ctx, &TransformArgs::default()).await,
        "resolve" => resolve::run(ctx).await,
        "views" => views::run(ctx, &ViewsArgs::default()).await,
        "materialize" => materialize::run(ctx, &MaterializeArgs::default()).await,
        "integrity" => integrity(ctx).await,
        other => anyhow::bail!("Unknown pipeline stage '{other}'"),
    }
}

async fn integrity(ctx: &RuntimeContext) -> Result<StageOutcome> {
    let catalog = Catalog::standard()?;
    let report = IntegrityChecker::new(&ctx.warehouse, &catalog, &ctx.project.config.identity)
        .run()
        .await
        .context("Integrity summary failed")?;
    print_report(&report);

    let failed = report.checks.iter().filter(|c| !c.passed).count();
    let summary = format!(
        "{:.1}% of transactions linked, {} unlinked; {} check(s) failed",
        report.overall_linked_percent(),
        report.unlinked_transactions(),
        failed
    );
    if failed == 0 {
        Ok(StageOutcome::ok(summary))
    } else {
        Ok(StageOutcome {
            summary,
            failures: failed,
            ..StageOutcome::ok("")
        })
    }
}

fn print_report(report: &IntegrityReport) {
    println!("  Serving relations:");
    for (name, count) in &report.row_counts {
        match count {
            Some(n) => println!("    {name}: {n} rows"),
            None => println!("    {name}: missing"),
        }
    }
    println!("  Linkage:");
    for linkage in &report.linkage {
        println!(
            "    {}: {}/{} linked ({:.1}%)",
            linkage.kind,
            linkage.linked,
            linkage.total,
            linkage.percent()
        );
    }
    println!("  Unlinked transactions:   {}", report.unlinked_transactions());
    println!("  Duplicate identity keys: {}", report.duplicate_identity_keys);
    println!("  Contacts without keys:   {}", report.unlinked_contacts);
    println!("  Checks:");
    for check in &report.checks {
        println!("    {check}");
    }
}
