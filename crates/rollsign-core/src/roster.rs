//! Roster and secret persistence.
//!
//! The roster (`config.yaml`) is public and human-edited:
//!
//! ```yaml
//! publicKey: d75a9801...
//! users:
//!   - code: ABC123
//!     name: Alice
//!     role: staff
//!     image: alice.jpg
//! ```
//!
//! The secret store (`secrets.yaml`) holds only `privateKey` and is
//! written owner-only. Both are replaced atomically.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{IssueError, Result};
use crate::fsio::{self, Visibility};
use crate::keys::{PrivateKey, PublicKey};
use crate::payload::validate_code;

/// One person on the roster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Token that gets signed and printed in the QR code
    pub code: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Role shown on the public page
    #[serde(default)]
    pub role: String,
    /// Picture reference shown on the public page
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
}

/// The published roster and the key that signs it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Roster {
    /// Active public key; `None` before the first issuance
    #[serde(
        default,
        deserialize_with = "empty_key_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub public_key: Option<PublicKey>,
    /// People to issue credentials for, in display order
    #[serde(default, deserialize_with = "null_as_empty")]
    pub users: Vec<Identity>,
}

fn empty_key_as_none<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<PublicKey>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        Some(s) if !s.trim().is_empty() => PublicKey::from_hex(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<Identity>, D::Error> {
    Ok(Option::<Vec<Identity>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Roster {
    /// Same roster, published under a new key.
    #[must_use]
    pub fn with_public_key(mut self, public_key: PublicKey) -> Self {
        self.public_key = Some(public_key);
        self
    }

    /// Codes that appear on more than one entry, in first-seen order.
    #[must_use]
    pub fn duplicate_codes(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut dupes = Vec::new();
        for user in &self.users {
            if !seen.insert(user.code.as_str()) && !dupes.contains(&user.code.as_str()) {
                dupes.push(user.code.as_str());
            }
        }
        dupes
    }

    fn validate(&self, path: &Path) -> Result<()> {
        for (i, user) in self.users.iter().enumerate() {
            validate_code(&user.code).map_err(|v| {
                IssueError::parse(path, format!("users[{i}] code {:?}: {v}", user.code))
            })?;
        }
        Ok(())
    }
}

/// File-backed roster.
#[derive(Debug, Clone)]
pub struct RosterStore {
    path: PathBuf,
}

impl RosterStore {
    /// Store backed by the YAML file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read and validate the roster.
    ///
    /// # Errors
    ///
    /// `IssueError::Io` if the file is missing or unreadable,
    /// `IssueError::Parse` if it is not a valid roster.
    pub fn load(&self) -> Result<Roster> {
        let content = fsio::read_to_string(&self.path)?;
        let roster: Roster = serde_yaml::from_str(&content)
            .map_err(|e| IssueError::parse(&self.path, e.to_string()))?;
        roster.validate(&self.path)?;
        Ok(roster)
    }

    /// Atomically replace the roster file.
    pub fn save(&self, roster: &Roster) -> Result<()> {
        let yaml = serde_yaml::to_string(roster)
            .map_err(|e| IssueError::parse(&self.path, e.to_string()))?;
        fsio::write_atomic(&self.path, yaml.as_bytes(), Visibility::Public)
    }
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
struct SecretsFile {
    private_key: String,
}

/// File-backed private key storage. Never distributed.
#[derive(Debug, Clone)]
pub struct SecretStore {
    path: PathBuf,
}

impl SecretStore {
    /// Store backed by the YAML file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the stored private key.
    ///
    /// # Errors
    ///
    /// `IssueError::Io` if missing, `IssueError::Parse` if the YAML is
    /// malformed, `IssueError::Crypto` if the key material is invalid.
    pub fn load(&self) -> Result<PrivateKey> {
        let content = zeroize::Zeroizing::new(fsio::read_to_string(&self.path)?);
        let secrets: SecretsFile = serde_yaml::from_str(&content)
            .map_err(|e| IssueError::parse(&self.path, e.to_string()))?;
        PrivateKey::from_hex(&secrets.private_key)
    }

    /// Atomically replace the secret file, owner-readable only.
    pub fn save(&self, private_key: &PrivateKey) -> Result<()> {
        let secrets = SecretsFile {
            private_key: private_key.to_hex().to_string(),
        };
        let yaml = zeroize::Zeroizing::new(
            serde_yaml::to_string(&secrets)
                .map_err(|e| IssueError::parse(&self.path, e.to_string()))?,
        );
        fsio::write_atomic(&self.path, yaml.as_bytes(), Visibility::Private)
    }
}
