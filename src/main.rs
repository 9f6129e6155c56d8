//! Stacksmith - Declarative AWS infrastructure stacks
//!
//! This is the main entry point for the Stacksmith CLI.

mod cli;

use anyhow::Result;
use cli::commands::CommandContext;
use cli::{Cli, Commands};
use stacksmith::config::{Config, LoggingConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Application version information
const VERSION: &str = env!("CARGO_PKG_VERSION");
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration; commands that need it report a failure
    let config = Config::load(cli.config.as_deref());
    let logging = config
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();

    init_logging(cli.verbosity(), &logging);

    if cli.verbosity() >= 2 {
        eprintln!("Stacksmith v{} by {}", VERSION, AUTHORS);
    }

    let mut ctx = CommandContext::new(&cli, config);

    let exit_code = match &cli.command {
        Commands::Synth(args) => args.execute(&mut ctx).await?,
        Commands::List(args) => args.execute(&mut ctx).await?,
        Commands::Validate(args) => args.execute(&mut ctx).await?,
        Commands::InstanceType(args) => args.execute(&mut ctx).await?,
        Commands::Keypair(args) => args.execute(&mut ctx).await?,
    };

    std::process::exit(exit_code);
}

/// Initialize logging from the verbosity level, `RUST_LOG` and the
/// configured logging section
fn init_logging(verbosity: u8, logging: &LoggingConfig) {
    let filter = match verbosity {
        0 => logging.level.as_deref().unwrap_or("warn"),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    if logging.json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(verbosity >= 3)
                    .with_writer(std::io::stderr),
            )
            .with(env_filter)
            .init();
    }
}
