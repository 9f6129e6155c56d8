//! Synth command - compose the stacks and write their templates.

use super::CommandContext;
use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use stacksmith::composer::StackComposer;
use stacksmith::stacks::StackKind;
use stacksmith::template::Synthesizer;
use std::path::PathBuf;

/// Arguments for the synth command
#[derive(Parser, Debug, Clone)]
pub struct SynthArgs {
    /// Directory the templates and manifest are written to
    #[arg(long, short = 'o', default_value = "cdk.out")]
    pub out: PathBuf,

    /// Only these stacks and the stacks they import from
    #[arg(long = "stack", short = 's', action = clap::ArgAction::Append)]
    pub stacks: Vec<StackKind>,
}

impl SynthArgs {
    /// Execute the synth command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let config = ctx.config()?;
        config.validate().context("Invalid configuration")?;

        let plan = ctx.plan(&self.stacks)?;
        let keypair_name = config.keypair_name(chrono::Local::now().date_naive())?;

        ctx.output.banner("STACKSMITH SYNTH");
        ctx.output.info(&format!("Keypair: {}", keypair_name));
        if config.account.is_none() {
            ctx.output
                .warning("No account configured; ARNs resolve to the deploying account");
        }

        let graph = StackComposer::new(config)?
            .with_keypair_name(keypair_name)
            .compose(&plan)
            .context("Composition failed")?;

        let written = Synthesizer::new(&self.out)
            .write(&graph)
            .with_context(|| format!("Failed to write templates to {}", self.out.display()))?;

        let summary = json!({
            "out": self.out,
            "stacks": graph.order(),
            "resources": graph.resource_count(),
            "files": written,
        });
        if ctx.output.document(&summary)? {
            return Ok(0);
        }

        let items: Vec<String> = written.iter().map(|p| p.display().to_string()).collect();
        ctx.output.list("Written", &items);
        ctx.output.success(&format!(
            "\nSynthesized {} stacks ({} resources) into {}",
            graph.stacks.len(),
            graph.resource_count(),
            self.out.display()
        ));
        ctx.output.elapsed("Synth");
        Ok(0)
    }
}
