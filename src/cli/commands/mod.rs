//! Subcommands module for Stacksmith CLI
//!
//! This module contains all the subcommand implementations.

pub mod instance_type;
pub mod keypair;
pub mod list;
pub mod synth;
pub mod validate;

use crate::cli::output::OutputFormatter;
use anyhow::{anyhow, Context, Result};
use stacksmith::composer::{CompositionPlan, StackComposer};
use stacksmith::config::Config;
use stacksmith::stacks::StackKind;
use stacksmith::template::ResourceGraph;

/// Common context shared between commands
pub struct CommandContext {
    /// Configuration, or the error loading it failed with
    config: stacksmith::Result<Config>,
    /// Output formatter
    pub output: OutputFormatter,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &crate::cli::Cli, config: stacksmith::Result<Config>) -> Self {
        let output = OutputFormatter::new(!cli.no_color, cli.output, cli.verbosity());

        Self {
            config,
            output,
        }
    }

    /// The loaded configuration
    pub fn config(&self) -> Result<&Config> {
        self.config
            .as_ref()
            .map_err(|e| anyhow!("Failed to load configuration: {}", e))
    }

    /// Composition plan: the selected stacks with their dependencies, or the
    /// configured plan when nothing is selected
    pub fn plan(&self, selected: &[StackKind]) -> Result<CompositionPlan> {
        let plan = if selected.is_empty() {
            CompositionPlan::from_config(self.config()?)?
        } else {
            CompositionPlan::with_dependencies_of(selected)?
        };
        Ok(plan)
    }

    /// Validate the configuration and compose `plan`
    pub fn compose(&self, plan: &CompositionPlan) -> Result<ResourceGraph> {
        let config = self.config()?;
        config.validate().context("Invalid configuration")?;
        let graph = StackComposer::new(config)?
            .compose(plan)
            .context("Composition failed")?;
        Ok(graph)
    }
}
