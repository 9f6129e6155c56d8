//! Keypair command - make sure the deployment keypair exists.

use super::CommandContext;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

/// Arguments for the keypair command
#[derive(Parser, Debug, Clone)]
pub struct KeypairArgs {
    /// Directory a newly created private key is written to
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Keypair name, overriding the dated default
    #[arg(long)]
    pub name: Option<String>,
}

impl KeypairArgs {
    /// Execute the keypair command
    #[cfg(feature = "aws")]
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        use anyhow::Context;
        use serde_json::json;
        use stacksmith::keypair::{ensure_key_pair, Ec2KeyPairProvider, KeyPairOutcome};
        use stacksmith::stacks::StackKind;
        use stacksmith::tags::TagSet;

        let config = ctx.config()?;
        let name = match self.name {
            Some(ref name) => name.clone(),
            None => config.keypair_name(chrono::Local::now().date_naive())?,
        };
        let dir = self.dir.clone().unwrap_or_else(|| config.keypair.dir.clone());
        let tags = TagSet::from_config(&config.tags)
            .for_stack(StackKind::Compute)
            .to_pairs();

        ctx.output.banner("STACKSMITH KEYPAIR");
        let provider = Ec2KeyPairProvider::new(config.region.as_deref()).await;
        let outcome = ensure_key_pair(&provider, &name, &tags, &dir)
            .await
            .with_context(|| format!("Failed to ensure keypair '{}'", name))?;

        let doc = match outcome {
            KeyPairOutcome::Existing(ref info) => json!({
                "name": info.name,
                "created": false,
                "fingerprint": info.fingerprint,
            }),
            KeyPairOutcome::Created { ref info, ref path } => json!({
                "name": info.name,
                "created": true,
                "fingerprint": info.fingerprint,
                "private_key": path,
            }),
        };
        if ctx.output.document(&doc)? {
            return Ok(0);
        }

        match outcome {
            KeyPairOutcome::Existing(info) => {
                ctx.output
                    .success(&format!("Keypair '{}' already exists", info.name));
            }
            KeyPairOutcome::Created { info, path } => {
                ctx.output.success(&format!(
                    "Created keypair '{}', private key written to {}",
                    info.name,
                    path.display()
                ));
            }
        }
        Ok(0)
    }

    /// Execute the keypair command
    #[cfg(not(feature = "aws"))]
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        ctx.output
            .error("Keypair provisioning requires stacksmith to be built with the 'aws' feature");
        ctx.output.hint("cargo install stacksmith --features aws");
        Ok(1)
    }
}
