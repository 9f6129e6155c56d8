//! CLI module for Stacksmith
//!
//! This module provides the command-line interface for Stacksmith,
//! including argument parsing and subcommand handling.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Stacksmith - Declarative AWS infrastructure stacks
///
/// Composes network, compute, encryption key, object store and database
/// stacks into templates for a provisioning engine.
#[derive(Parser, Debug, Clone)]
#[command(name = "stacksmith")]
#[command(author = "Stacksmith Contributors")]
#[command(version)]
#[command(about = "Declarative AWS infrastructure stacks", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "STACKSMITH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    pub output: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output with colors
    #[default]
    Human,
    /// JSON output for scripting
    Json,
    /// YAML output
    Yaml,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Compose the stacks and write their templates
    Synth(commands::synth::SynthArgs),

    /// Print the composition order, categories and exports
    List(commands::list::ListArgs),

    /// Load the configuration and compose without writing
    Validate(commands::validate::ValidateArgs),

    /// Resolve an instance type token such as m5.2xlarge
    #[command(name = "instance-type")]
    InstanceType(commands::instance_type::InstanceTypeArgs),

    /// Make sure the deployment keypair exists
    Keypair(commands::keypair::KeypairArgs),
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }
}
