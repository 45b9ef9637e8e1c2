//! Output formatting for different formats.

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use rollsign_core::IssuanceReport;
use serde::{Deserialize, Serialize};

/// Available output formats.
#[derive(Debug, Clone, Copy, Default, ValueEnum, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summary with colors
    #[default]
    Pretty,
    /// JSON output
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Print the summary of a finished issuance.
pub fn print_report(report: &IssuanceReport, format: OutputFormat, verbose: bool) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Pretty => {
            let epoch = if report.new_epoch {
                "new epoch".yellow()
            } else {
                "same key".cyan()
            };
            println!(
                "{} {} credentials ({epoch})",
                "✓ Issued".green().bold(),
                report.credentials
            );
            println!("  Public key: {}", report.public_key.to_string().bold());
            println!("  Roster:     {}", report.roster.display());
            println!("  Page:       {}", report.page.display());
            println!("  Images:     {}", report.images.len());
            if verbose {
                for image in &report.images {
                    println!("    {}", image.display().to_string().dimmed());
                }
            }
            if report.new_epoch {
                println!(
                    "  {}",
                    "Codes from earlier runs no longer verify.".dimmed()
                );
            }
        }
    }
    Ok(())
}
