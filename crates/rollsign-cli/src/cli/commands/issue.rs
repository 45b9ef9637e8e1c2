//! `rollsign` - Run a full issuance.

use anyhow::Result;
use colored::Colorize;

use super::Context;
use crate::cli::args::IssueArgs;
use crate::output::{self, OutputFormat};

pub async fn execute(ctx: Context, args: IssueArgs) -> Result<()> {
    let mut config = ctx.config;
    config.reuse_key |= args.reuse_key;
    let encoder = config.qr.encoder();

    let report = rollsign_core::issue(config).await?;

    // Terminal codes would corrupt machine-readable output.
    if args.show_codes && ctx.output_format == OutputFormat::Pretty {
        for credential in &report.issued {
            println!("{}", credential.code.bold());
            println!("{}", encoder.render_terminal(&credential.payload())?);
        }
    }

    output::print_report(&report, ctx.output_format, ctx.verbose)
}
