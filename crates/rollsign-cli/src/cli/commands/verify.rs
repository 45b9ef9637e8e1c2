//! `rollsign verify` - Check a scanned payload.

use anyhow::{bail, Result};
use colored::Colorize;
use rollsign_core::{parse_payload, RosterStore};

use super::Context;
use crate::cli::args::VerifyArgs;
use crate::output::OutputFormat;

pub fn execute(ctx: &Context, args: &VerifyArgs) -> Result<()> {
    let roster = RosterStore::new(&ctx.config.roster).load()?;
    let Some(public_key) = roster.public_key else {
        bail!(
            "{} has no published public key; run an issuance first",
            ctx.config.roster.display()
        );
    };
    let Some(credential) = parse_payload(args.payload.trim()) else {
        bail!("malformed payload: expected <code>-<128 lowercase hex digits>");
    };

    let valid = credential.verify(&public_key);
    let identity = roster.users.iter().find(|u| u.code == credential.code);

    match ctx.output_format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "code": credential.code,
                    "valid": valid,
                    "on_roster": identity.is_some(),
                    "name": identity.map(|u| u.name.as_str()),
                    "role": identity.map(|u| u.role.as_str()),
                    "public_key": public_key,
                })
            );
        }
        OutputFormat::Pretty => {
            if valid {
                println!("{} {}", "✓ valid".green().bold(), credential.code.bold());
            } else {
                println!("{} {}", "✗ invalid".red().bold(), credential.code.bold());
            }
            if let Some(user) = identity {
                println!("  Name: {}", user.name);
                if !user.role.is_empty() {
                    println!("  Role: {}", user.role);
                }
            }
            if ctx.verbose {
                println!("  Key:  {}", public_key.to_string().dimmed());
            }
        }
    }

    if !valid {
        bail!(
            "signature for {} does not verify against {public_key}",
            credential.code
        );
    }
    if identity.is_none() {
        bail!("{} is not on the current roster", credential.code);
    }
    Ok(())
}
