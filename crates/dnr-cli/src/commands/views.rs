//! Views command: define serving views in dependency order

use anyhow::Result;
use dnr_core::sql_utils::truncate_message;
use dnr_serving::{Catalog, ViewBuilder};

use crate::cli::{GlobalArgs, ViewsArgs};
use crate::commands::common::{exit_code_for, secs, StageOutcome, SUMMARY_ERROR_LEN};
use crate::context::RuntimeContext;

/// Execute the views command
pub async fn execute(args: &ViewsArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global).await?;
    let outcome = run(&ctx, args).await?;
    println!("\n{}", outcome.summary);
    outcome.into_result()
}

pub(crate) async fn run(ctx: &RuntimeContext, args: &ViewsArgs) -> Result<StageOutcome> {
    let catalog = Catalog::standard()?;
    let builder = ViewBuilder::new(&ctx.warehouse, &catalog);

    match builder.define_views(args.view.as_deref()).await {
        Ok(results) => {
            for result in &results {
                let note = if result.replaced_table {
                    ", replaced table"
                } else {
                    ""
                };
                println!(
                    "  ✓ serving.{} [{}{note}]",
                    result.view,
                    secs(result.duration_secs)
                );
            }
            Ok(StageOutcome::ok(format!("Defined {} view(s)", results.len())))
        }
        Err(e) => {
            let err = anyhow::Error::from(e);
            println!(
                "  ✗ {}",
                truncate_message(&format!("{err:#}"), SUMMARY_ERROR_LEN)
            );
            Ok(StageOutcome {
                summary: "View definition stopped at the first failure".to_string(),
                failures: 1,
                exit_code: exit_code_for(&err),
            })
        }
    }
}
