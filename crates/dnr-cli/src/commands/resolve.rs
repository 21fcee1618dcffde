//! Resolve command: recompute the identity map

use anyhow::{Context, Result};
use dnr_identity::IdentityResolver;

use crate::cli::GlobalArgs;
use crate::commands::common::StageOutcome;
use crate::context::RuntimeContext;

/// Execute the resolve command
pub async fn execute(global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global).await?;
    let outcome = run(&ctx).await?;
    println!("\n{}", outcome.summary);
    outcome.into_result()
}

pub(crate) async fn run(ctx: &RuntimeContext) -> Result<StageOutcome> {
    let map = IdentityResolver::new(ctx.warehouse.clone(), &ctx.project.config.identity)
        .resolve_identities()
        .await
        .context("Identity resolution failed")?;

    let report = map.report;
    println!("  contacts:            {}", report.contacts);
    println!("  master identities:   {}", report.masters);
    println!("  multi-source:        {}", report.multi_source_masters);
    println!("  without email/phone: {}", report.unlinked);
    println!("  ids carried over:    {}", report.carried_over);

    Ok(StageOutcome::ok(format!(
        "Resolved {} contacts into {} master identities",
        report.contacts, report.masters
    )))
}
