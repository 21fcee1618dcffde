//! Status command: file lineage, materialization states and recent stages

use anyhow::{Context, Result};
use dnr_core::sql_utils::truncate_message;
use dnr_meta::{LineageRecord, LineageStatus};

use crate::cli::{GlobalArgs, StatusArgs};
use crate::commands::common::{print_table, SUMMARY_ERROR_LEN};
use crate::context::RuntimeContext;

/// Execute the status command
pub async fn execute(args: &StatusArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global).await?;

    let source_id = match args.source.as_deref() {
        Some(name) => Some(ctx.sources(Some(name))?[0].id),
        None => None,
    };

    let lineage = ctx
        .warehouse
        .lineage()
        .list(source_id)
        .await
        .context("Failed to read file lineage")?;
    println!("File lineage ({} file(s))\n", lineage.len());
    if !lineage.is_empty() {
        let rows: Vec<Vec<String>> = lineage.iter().map(|r| lineage_row(&ctx, r)).collect();
        print_table(
            &["SOURCE", "BLOB", "TABLE", "STATUS", "ROWS", "STARTED", "ERROR"],
            &rows,
        );
    }

    let states = ctx.warehouse.materializations().list().await?;
    println!("\nServing views\n");
    if states.is_empty() {
        println!("(no views defined)");
    } else {
        let rows: Vec<Vec<String>> = states
            .iter()
            .map(|s| {
                vec![
                    format!("serving.{}", s.view_name),
                    s.state.to_string(),
                    optional_count(s.row_count),
                    s.updated_at.clone(),
                    error_cell(s.error.as_deref()),
                ]
            })
            .collect();
        print_table(&["VIEW", "STATE", "ROWS", "UPDATED", "ERROR"], &rows);
    }

    let stages = ctx.warehouse.pipeline_runs().recent(args.runs).await?;
    println!("\nRecent pipeline stages\n");
    if stages.is_empty() {
        println!("(no pipeline runs)");
    } else {
        let rows: Vec<Vec<String>> = stages
            .iter()
            .map(|s| {
                vec![
                    short_id(&s.run_id),
                    s.stage.clone(),
                    s.status.clone(),
                    s.started_at.clone(),
                    s.finished_at.clone().unwrap_or_else(|| "-".to_string()),
                    s.summary.clone().unwrap_or_default(),
                ]
            })
            .collect();
        print_table(
            &["RUN", "STAGE", "STATUS", "STARTED", "FINISHED", "SUMMARY"],
            &rows,
        );
    }
    Ok(())
}

fn lineage_row(ctx: &RuntimeContext, record: &LineageRecord) -> Vec<String> {
    let source = ctx
        .project
        .source_by_id(record.source_id)
        .map(|s| s.name.to_string())
        .unwrap_or_else(|| record.source_id.to_string());
    vec![
        source,
        record.blob_path.clone(),
        record.table_name.clone(),
        status_label(record.status).to_string(),
        optional_count(record.row_count),
        record.started_at.clone(),
        error_cell(record.error.as_deref()),
    ]
}

/// `loading` rows outside a running ingest are from an interrupted run
fn status_label(status: LineageStatus) -> &'static str {
    match status {
        LineageStatus::Loading => "inconclusive",
        other => other.as_str(),
    }
}

fn optional_count(count: Option<i64>) -> String {
    count.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string())
}

fn error_cell(error: Option<&str>) -> String {
    error
        .map(|e| truncate_message(e, SUMMARY_ERROR_LEN))
        .unwrap_or_default()
}

fn short_id(run_id: &str) -> String {
    run_id.chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loading_shown_as_inconclusive() {
        assert_eq!(status_label(LineageStatus::Loading), "inconclusive");
        assert_eq!(status_label(LineageStatus::Failed), "failed");
    }

    #[test]
    fn test_cells() {
        assert_eq!(optional_count(None), "-");
        assert_eq!(optional_count(Some(7)), "7");
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(error_cell(None), "");
    }
}
