//! # rollsign-core
//!
//! Offline issuance of signed roster credentials.
//!
//! Every person on a roster gets a QR code carrying `<code>-<signature>`,
//! an Ed25519 signature over their code. The matching public key is
//! written back into the roster and onto a public page, so anyone holding
//! the page can check a scanned code without talking to a server.
//!
//! Each run starts a new *epoch*: a fresh key pair replaces the old one and
//! every credential from the previous epoch stops verifying.
//!
//! ## Data Flow
//!
//! ```text
//! config.yaml ──► RosterStore::load
//!                      │
//!   generate_key_pair ─┼─► SecretStore::save      (secrets.yaml, 0600)
//!                      ├─► RosterStore::save      (config.yaml + publicKey)
//!                      ├─► CredentialSigner::issue per code
//!                      ├─► QrEncoder::write_credential (qrcodes/<code>.png)
//!                      └─► PagePublisher::publish (index.html)
//! ```
//!
//! [`Pipeline`] drives these stages in order and tags any failure with the
//! stage it came from.

pub mod config;
pub mod error;
mod fsio;
pub mod keys;
pub mod page;
pub mod payload;
pub mod pipeline;
pub mod qr;
pub mod roster;
pub mod signer;

pub use config::{IssuerConfig, QrConfig, DEFAULT_CONFIG_FILE};
pub use error::{IssueError, IssueFailure, PipelineError, Result, Stage};
pub use keys::{expose_public_key, generate_key_pair, KeyPair, PrivateKey, PublicKey};
pub use page::{PagePublisher, Template};
pub use payload::{encode_payload, parse_payload, validate_code};
pub use pipeline::{IssuanceReport, Pipeline, PipelineState};
pub use qr::{ErrorCorrection, QrEncoder};
pub use roster::{Identity, Roster, RosterStore, SecretStore};
pub use signer::{sign, verify, Credential, CredentialSigner, Signature};

/// Run a full issuance with `config`.
///
/// # Errors
///
/// Configuration problems surface before any stage runs; everything else
/// comes back as a [`PipelineError`] naming the failed stage.
pub async fn issue(config: IssuerConfig) -> std::result::Result<IssuanceReport, IssueFailure> {
    let pipeline = Pipeline::new(config).map_err(IssueFailure::Config)?;
    pipeline.run().await.map_err(IssueFailure::Stage)
}
