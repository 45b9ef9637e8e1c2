//! Command implementations.

pub mod issue;
pub mod verify;

use rollsign_core::IssuerConfig;

use crate::output::OutputFormat;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Resolved issuer configuration
    pub config: IssuerConfig,

    /// Output format
    pub output_format: OutputFormat,

    /// Verbose output
    pub verbose: bool,
}
