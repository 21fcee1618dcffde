//! Setup command: migrate the warehouse and register source systems

use anyhow::{Context, Result};

use crate::cli::GlobalArgs;
use crate::commands::common::StageOutcome;
use crate::context::RuntimeContext;

/// Execute the setup command
pub async fn execute(global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global).await?;
    let outcome = run(&ctx).await?;
    println!("\n{}", outcome.summary);
    outcome.into_result()
}

/// Register every source of the project; migrations ran when the
/// warehouse was opened
pub(crate) async fn run(ctx: &RuntimeContext) -> Result<StageOutcome> {
    let added = ctx
        .warehouse
        .register_sources(&ctx.project.sources)
        .await
        .context("Failed to register sources")?;

    for source in ctx.warehouse.registered_sources().await? {
        println!("  ✓ {} (id {}, {})", source.name, source.source_id, source.format);
    }

    Ok(StageOutcome::ok(format!(
        "Warehouse ready: {} source(s), {} newly registered",
        ctx.project.sources.len(),
        added
    )))
}
