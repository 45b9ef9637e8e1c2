//! Command-line argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::output::OutputFormat;

/// Issue signed QR credentials for every person on a roster
///
/// With no subcommand, runs a full issuance: a new key pair, the roster
/// updated with its public key, one QR image per code and the public page.
/// Previously issued codes stop verifying.
#[derive(Parser, Debug)]
#[command(name = "rollsign")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Issuer config file (defaults to ./rollsign.toml when present)
    #[arg(short, long, env = "ROLLSIGN_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum)]
    pub output: Option<OutputFormat>,

    /// Increase verbosity
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(flatten)]
    pub issue: IssueArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check a scanned payload against the published public key
    Verify(VerifyArgs),
}

// ============================================================================
// Issue (default)
// ============================================================================

#[derive(Args, Debug, Default)]
pub struct IssueArgs {
    /// Print each issued code as a QR in the terminal
    #[arg(long)]
    pub show_codes: bool,

    /// Keep the stored key pair instead of starting a new epoch
    #[arg(long)]
    pub reuse_key: bool,
}

// ============================================================================
// Verify command
// ============================================================================

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Scanned payload (`<code>-<hex signature>`)
    pub payload: String,
}
