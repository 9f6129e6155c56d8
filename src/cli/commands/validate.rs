//! Validate command - load the configuration and compose without writing.

use super::CommandContext;
use anyhow::Result;
use clap::Parser;
use serde_json::json;

/// Arguments for the validate command
#[derive(Parser, Debug, Clone, Default)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        ctx.output.banner("CONFIGURATION VALIDATION");

        let plan = match ctx.plan(&[]) {
            Ok(plan) => plan,
            Err(e) => return Ok(report_failure(ctx, &e)),
        };
        let graph = match ctx.compose(&plan) {
            Ok(graph) => graph,
            Err(e) => return Ok(report_failure(ctx, &e)),
        };

        let summary = json!({
            "valid": true,
            "stacks": graph.order(),
            "resources": graph.resource_count(),
            "exports": graph.exports.len(),
        });
        if ctx.output.document(&summary)? {
            return Ok(0);
        }

        ctx.output.section("Validation Results");
        ctx.output.success(&format!(
            "Configuration is valid: {} stacks, {} resources, {} exports",
            graph.stacks.len(),
            graph.resource_count(),
            graph.exports.len()
        ));
        Ok(0)
    }
}

fn report_failure(ctx: &CommandContext, err: &anyhow::Error) -> i32 {
    // Print the whole context chain so the failing key or export is visible
    ctx.output.error(&format!("{:#}", err));
    if matches!(
        err.downcast_ref::<stacksmith::Error>(),
        Some(stacksmith::Error::UnresolvedReference { .. })
    ) {
        ctx.output
            .hint("Compose the exporting stack before the stack that imports from it");
    }
    1
}
