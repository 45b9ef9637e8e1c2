//! The issuance run, start to finish.
//!
//! ```text
//! Init ──► KeyGenerated ──► RosterPersisted ──► AllCredentialsSigned
//!                                                        │
//!                           Done ◄── AllArtifactsWritten ◄┘
//! ```
//!
//! The roster is read during `Init`, before any key material exists, so a
//! broken roster never costs the current epoch. Each stage must succeed
//! before the next starts; the first failure ends the run and whatever was
//! already written stays on disk.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::IssuerConfig;
use crate::error::{IssueError, PipelineError, Result, Stage, StageExt};
use crate::keys::{generate_key_pair, KeyPair, PublicKey};
use crate::page::PagePublisher;
use crate::roster::{Roster, RosterStore, SecretStore};
use crate::signer::{Credential, CredentialSigner};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Roster loaded, nothing written
    Init,
    /// Key pair in hand and secret store written
    KeyGenerated,
    /// Roster saved with the new public key
    RosterPersisted,
    /// Every code signed
    AllCredentialsSigned,
    /// Images and page written
    AllArtifactsWritten,
    /// Run complete
    Done,
}

/// Summary of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct IssuanceReport {
    /// Key that verifies every issued credential
    pub public_key: PublicKey,
    /// Whether this run started a new epoch
    pub new_epoch: bool,
    /// Number of distinct codes issued
    pub credentials: usize,
    /// The issued credentials, in roster order
    #[serde(skip)]
    pub issued: Vec<Credential>,
    /// Written image files, sorted
    pub images: Vec<PathBuf>,
    /// Roster file holding the public key
    pub roster: PathBuf,
    /// Rendered page
    pub page: PathBuf,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
}

/// Runs issuance for one configuration.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: IssuerConfig,
}

impl Pipeline {
    /// Build a pipeline after validating the configuration.
    pub fn new(config: IssuerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Execute every stage in order.
    ///
    /// # Errors
    ///
    /// Returns the first failure, tagged with its stage.
    pub async fn run(&self) -> std::result::Result<IssuanceReport, PipelineError> {
        let roster = RosterStore::new(&self.config.roster)
            .load()
            .stage(Stage::RosterRead)?;
        info!(
            roster = %self.config.roster.display(),
            users = roster.users.len(),
            "loaded roster"
        );

        let (key_pair, new_epoch) = self.obtain_key(&roster).stage(Stage::KeyGeneration)?;
        let mut ctx = IssuanceContext::new(&self.config, roster, key_pair, new_epoch);

        ctx.persist_roster().stage(Stage::RosterWrite)?;
        let credentials = ctx.sign_all().stage(Stage::Signing)?;
        let images = ctx.write_images(&credentials).await.stage(Stage::Encoding)?;
        let page = ctx.publish_page().stage(Stage::Rendering)?;

        Ok(ctx.finish(credentials, images, page))
    }

    fn obtain_key(&self, roster: &Roster) -> Result<(KeyPair, bool)> {
        let secrets = SecretStore::new(&self.config.secrets);

        if self.config.reuse_key {
            let key_pair = KeyPair::from_private_key(secrets.load()?);
            if let Some(published) = roster.public_key {
                if published != key_pair.public_key {
                    return Err(IssueError::Crypto(format!(
                        "roster publishes {published} but the secret store holds the key for {}",
                        key_pair.public_key
                    )));
                }
            }
            info!(public_key = %key_pair.public_key, "reusing stored key pair");
            return Ok((key_pair, false));
        }

        let key_pair = generate_key_pair()?;
        secrets.save(&key_pair.private_key)?;
        if roster.public_key.is_some() {
            warn!("previous public key replaced, earlier credentials no longer verify");
        }
        info!(
            public_key = %key_pair.public_key,
            secrets = %self.config.secrets.display(),
            "generated key pair"
        );
        Ok((key_pair, true))
    }
}

/// State threaded through one run.
struct IssuanceContext<'a> {
    config: &'a IssuerConfig,
    roster: Roster,
    key_pair: KeyPair,
    new_epoch: bool,
    state: PipelineState,
}

impl<'a> IssuanceContext<'a> {
    fn new(config: &'a IssuerConfig, roster: Roster, key_pair: KeyPair, new_epoch: bool) -> Self {
        let mut ctx = Self {
            config,
            roster,
            key_pair,
            new_epoch,
            state: PipelineState::Init,
        };
        ctx.advance(PipelineState::KeyGenerated);
        ctx
    }

    fn advance(&mut self, next: PipelineState) {
        debug!(from = ?self.state, to = ?next, "pipeline state");
        self.state = next;
    }

    fn persist_roster(&mut self) -> Result<()> {
        let roster = std::mem::take(&mut self.roster);
        self.roster = roster.with_public_key(self.key_pair.public_key);
        RosterStore::new(&self.config.roster).save(&self.roster)?;
        info!(roster = %self.config.roster.display(), "published public key");
        self.advance(PipelineState::RosterPersisted);
        Ok(())
    }

    fn sign_all(&mut self) -> Result<Vec<Credential>> {
        let signer = CredentialSigner::new(&self.key_pair.private_key)?;
        if self.roster.public_key.as_ref() != Some(signer.public_key()) {
            return Err(IssueError::Crypto(
                "published public key does not match the signing key".into(),
            ));
        }

        for code in self.roster.duplicate_codes() {
            warn!(code, "duplicate code on roster, issuing a single credential");
        }

        let mut seen = HashSet::new();
        let credentials: Vec<Credential> = self
            .roster
            .users
            .iter()
            .filter(|user| seen.insert(user.code.as_str()))
            .map(|user| signer.issue(&user.code))
            .collect();

        info!(count = credentials.len(), "signed credentials");
        self.advance(PipelineState::AllCredentialsSigned);
        Ok(credentials)
    }

    async fn write_images(&self, credentials: &[Credential]) -> Result<Vec<PathBuf>> {
        let encoder = self.config.qr.encoder();
        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let mut tasks = JoinSet::new();
        let mut images = Vec::with_capacity(credentials.len());

        for credential in credentials.iter().cloned() {
            // Surface failures from finished workers before queueing more.
            while let Some(joined) = tasks.try_join_next() {
                images.push(joined_image(joined)?);
            }

            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| IssueError::Encoding(format!("encoder pool closed: {e}")))?;
            let dir = self.config.image_dir.clone();
            tasks.spawn_blocking(move || {
                let _permit = permit;
                encoder.write_credential(&dir, &credential)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            images.push(joined_image(joined)?);
        }

        images.sort();
        info!(
            count = images.len(),
            dir = %self.config.image_dir.display(),
            "wrote qr images"
        );
        Ok(images)
    }

    fn publish_page(&mut self) -> Result<PathBuf> {
        let publisher = PagePublisher::new(self.config.template.clone(), &self.config.page);
        let page = publisher.publish(&self.roster)?;
        info!(page = %page.display(), "published roster page");
        self.advance(PipelineState::AllArtifactsWritten);
        Ok(page)
    }

    fn finish(mut self, issued: Vec<Credential>, images: Vec<PathBuf>, page: PathBuf) -> IssuanceReport {
        self.advance(PipelineState::Done);
        IssuanceReport {
            public_key: self.key_pair.public_key,
            new_epoch: self.new_epoch,
            credentials: issued.len(),
            issued,
            images,
            roster: self.config.roster.clone(),
            page,
            finished_at: Utc::now(),
        }
    }
}

fn joined_image(
    joined: std::result::Result<Result<PathBuf>, tokio::task::JoinError>,
) -> Result<PathBuf> {
    joined.map_err(|e| IssueError::Encoding(format!("encoder task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{PRIVATE_KEY_LEN, PUBLIC_KEY_LEN};
    use crate::payload::encode_payload;
    use crate::qr::decode_png;
    use crate::roster::Identity;
    use crate::signer::{sign, verify, SIGNATURE_LEN};
    use std::path::Path;
    use tempfile::TempDir;

    const ALICE: &str = "users:\n  - code: ABC123\n    name: Alice\n    role: staff\n";

    fn setup(roster_yaml: &str) -> (TempDir, IssuerConfig) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.yaml"), roster_yaml).unwrap();
        let config = IssuerConfig {
            workers: 2,
            ..IssuerConfig::default()
        }
        .rooted_at(dir.path());
        (dir, config)
    }

    async fn run(config: &IssuerConfig) -> std::result::Result<IssuanceReport, PipelineError> {
        Pipeline::new(config.clone()).unwrap().run().await
    }

    fn load_roster(config: &IssuerConfig) -> Roster {
        RosterStore::new(&config.roster).load().unwrap()
    }

    #[tokio::test]
    async fn alice_end_to_end() {
        let (_dir, config) = setup(ALICE);
        let report = run(&config).await.unwrap();

        let private_key = SecretStore::new(&config.secrets).load().unwrap();
        assert_eq!(private_key.as_bytes().len(), PRIVATE_KEY_LEN);

        let roster = load_roster(&config);
        let public_key = roster.public_key.unwrap();
        assert_eq!(public_key.as_bytes().len(), PUBLIC_KEY_LEN);
        assert_eq!(public_key, private_key.public_key());
        assert_eq!(public_key, report.public_key);
        assert_eq!(
            roster.users,
            vec![Identity {
                code: "ABC123".into(),
                name: "Alice".into(),
                role: "staff".into(),
                image: String::new(),
            }]
        );

        let signature = sign(&private_key, "ABC123").unwrap();
        let payload = encode_payload("ABC123", &signature);
        assert!(payload.starts_with("ABC123-"));
        assert_eq!(payload.len() - "ABC123-".len(), 2 * SIGNATURE_LEN);
        assert!(verify(public_key.as_bytes(), "ABC123", signature.as_bytes()));

        let png = std::fs::read(config.image_dir.join("ABC123.png")).unwrap();
        assert_eq!(decode_png(&png).as_deref(), Some(payload.as_str()));

        let page = std::fs::read_to_string(&config.page).unwrap();
        assert!(page.contains("Alice"));
        assert!(page.contains(&public_key.to_hex()));

        assert!(report.new_epoch);
        assert_eq!(report.credentials, 1);
        assert_eq!(report.images, vec![config.image_dir.join("ABC123.png")]);
    }

    #[tokio::test]
    async fn rerun_with_same_key_is_byte_identical() {
        let (_dir, mut config) = setup(ALICE);
        let first = run(&config).await.unwrap();
        let png_before = std::fs::read(&first.images[0]).unwrap();

        config.reuse_key = true;
        let second = run(&config).await.unwrap();

        assert!(!second.new_epoch);
        assert_eq!(second.public_key, first.public_key);
        assert_eq!(std::fs::read(&second.images[0]).unwrap(), png_before);
    }

    #[tokio::test]
    async fn new_epoch_invalidates_previous_credentials() {
        let (_dir, config) = setup(ALICE);
        run(&config).await.unwrap();
        let old_key = SecretStore::new(&config.secrets).load().unwrap();
        let old_sig = sign(&old_key, "ABC123").unwrap();

        let report = run(&config).await.unwrap();

        assert_ne!(report.public_key, old_key.public_key());
        assert_eq!(load_roster(&config).public_key, Some(report.public_key));
        assert!(!verify(report.public_key.as_bytes(), "ABC123", old_sig.as_bytes()));
    }

    #[tokio::test]
    async fn missing_roster_fails_before_key_generation() {
        let (_dir, config) = setup(ALICE);
        std::fs::remove_file(&config.roster).unwrap();

        let err = run(&config).await.unwrap_err();
        assert_eq!(err.stage, Stage::RosterRead);
        assert!(err.to_string().starts_with("roster read failed"));
        assert!(!config.secrets.exists());
    }

    #[tokio::test]
    async fn reuse_rejects_stale_pairing() {
        let (_dir, mut config) = setup(ALICE);
        run(&config).await.unwrap();

        let other = generate_key_pair().unwrap();
        SecretStore::new(&config.secrets)
            .save(&other.private_key)
            .unwrap();

        config.reuse_key = true;
        let err = run(&config).await.unwrap_err();
        assert_eq!(err.stage, Stage::KeyGeneration);
        assert!(matches!(err.source, IssueError::Crypto(_)));
    }

    #[tokio::test]
    async fn reuse_without_secret_is_key_generation_failure() {
        let (_dir, mut config) = setup(ALICE);
        config.reuse_key = true;

        let err = run(&config).await.unwrap_err();
        assert_eq!(err.stage, Stage::KeyGeneration);
        assert!(err.source.is_io());
    }

    #[tokio::test]
    async fn unwritable_image_dir_fails_encoding_stage() {
        let (_dir, config) = setup(ALICE);
        std::fs::write(&config.image_dir, "not a directory").unwrap();

        let err = run(&config).await.unwrap_err();
        assert_eq!(err.stage, Stage::Encoding);
        // earlier stages stay committed
        assert!(load_roster(&config).public_key.is_some());
        assert!(!config.page.exists());
    }

    #[tokio::test]
    async fn bad_template_fails_rendering_after_images() {
        let (dir, mut config) = setup(ALICE);
        let template = dir.path().join("index.html.tmpl");
        std::fs::write(&template, "{{#users}}{{email}}{{/users}}").unwrap();
        config.template = Some(template);

        let err = run(&config).await.unwrap_err();
        assert_eq!(err.stage, Stage::Rendering);
        assert!(matches!(err.source, IssueError::Template(_)));
        assert!(config.image_dir.join("ABC123.png").exists());
    }

    #[tokio::test]
    async fn duplicate_codes_issue_once() {
        let (_dir, config) = setup(
            "users:\n  - {code: A1, name: Ann}\n  - {code: B2, name: Ben}\n  - {code: A1, name: Ann again}\n",
        );
        let report = run(&config).await.unwrap();

        assert_eq!(report.credentials, 2);
        let codes: Vec<&str> = report.issued.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["A1", "B2"]);
        assert!(report.issued.iter().all(|c| c.verify(&report.public_key)));
        assert_eq!(
            report.images,
            vec![config.image_dir.join("A1.png"), config.image_dir.join("B2.png")]
        );
        // roster keeps both entries untouched
        assert_eq!(load_roster(&config).users.len(), 3);
    }

    #[tokio::test]
    async fn many_users_through_small_pool() {
        let mut yaml = String::from("users:\n");
        for i in 0..25 {
            yaml.push_str(&format!("  - {{code: U{i:03}, name: User {i}}}\n"));
        }
        let (_dir, config) = setup(&yaml);
        let report = run(&config).await.unwrap();

        assert_eq!(report.images.len(), 25);
        assert!(report.images.iter().all(|p: &PathBuf| Path::new(p).exists()));
    }

    #[test]
    fn secret_aliasing_roster_never_runs() {
        let (dir, config) = setup(ALICE);
        for secrets in ["sub/../config.yaml", "./config.yaml"] {
            let config = IssuerConfig {
                secrets: dir.path().join(secrets),
                ..config.clone()
            };
            assert!(matches!(Pipeline::new(config), Err(IssueError::Config(_))));
        }
        assert_eq!(std::fs::read_to_string(&config.roster).unwrap(), ALICE);
    }

    #[test]
    fn oversized_worker_pool_rejected() {
        let (_dir, config) = setup(ALICE);
        let config = IssuerConfig {
            workers: usize::MAX,
            ..config
        };
        assert!(matches!(Pipeline::new(config), Err(IssueError::Config(_))));
    }

    #[test]
    fn invalid_config_rejected_up_front() {
        let config = IssuerConfig {
            workers: 0,
            ..IssuerConfig::default()
        };
        assert!(matches!(Pipeline::new(config), Err(IssueError::Config(_))));
    }
}
