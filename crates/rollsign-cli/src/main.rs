//! rollsign - signed QR credentials for a roster

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    rollsign_cli::run().await
}
