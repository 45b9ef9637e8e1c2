//! CLI argument parsing and command dispatch.

pub mod args;
pub mod commands;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};
use args::{Cli, Commands};
use clap::Parser;
use rollsign_core::{IssuerConfig, DEFAULT_CONFIG_FILE};

/// Run the CLI application.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);
    if cli.no_color {
        colored::control::set_override(false);
    }

    let config = load_config(cli.config.as_ref())?;

    let ctx = commands::Context {
        config,
        output_format: cli.output.unwrap_or_default(),
        verbose: cli.verbose,
    };
    tracing::debug!(
        roster = %ctx.config.roster.display(),
        output = %ctx.output_format,
        "resolved configuration"
    );

    match cli.command {
        Some(Commands::Verify(args)) => commands::verify::execute(&ctx, &args),
        None => commands::issue::execute(ctx, cli.issue).await,
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("rollsign_core=debug,rollsign_cli=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("rollsign_core=warn,rollsign_cli=warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<IssuerConfig> {
    match path {
        Some(p) => {
            if !p.exists() {
                bail!("config file {} not found", p.display());
            }
            IssuerConfig::load(p).with_context(|| format!("loading {}", p.display()))
        }
        None => IssuerConfig::load(Path::new(DEFAULT_CONFIG_FILE))
            .with_context(|| format!("loading {DEFAULT_CONFIG_FILE}")),
    }
}
