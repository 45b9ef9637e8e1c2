//! Issuer configuration.
//!
//! Every path the pipeline touches comes from here, so runs can be pointed
//! at any directory (tests use a temporary one).

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IssueError, Result};
use crate::qr::{ErrorCorrection, QrEncoder, DEFAULT_SIZE};

/// File name looked up in the working directory when no config is given.
pub const DEFAULT_CONFIG_FILE: &str = "rollsign.toml";

/// Largest accepted encoder pool.
pub const MAX_WORKERS: usize = 1024;

/// Paths and tuning for one issuance run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerConfig {
    /// Public roster file (default: config.yaml).
    #[serde(default = "default_roster")]
    pub roster: PathBuf,

    /// Private key file (default: secrets.yaml).
    #[serde(default = "default_secrets")]
    pub secrets: PathBuf,

    /// Page template; the built-in template when unset.
    #[serde(default)]
    pub template: Option<PathBuf>,

    /// Rendered page (default: index.html).
    #[serde(default = "default_page")]
    pub page: PathBuf,

    /// Directory for per-code images (default: qrcodes).
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,

    /// QR rendering settings.
    #[serde(default)]
    pub qr: QrConfig,

    /// Upper bound on concurrent image encoders.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Keep the key from the secret store instead of starting a new epoch.
    #[serde(default)]
    pub reuse_key: bool,
}

/// QR symbol settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrConfig {
    /// Error-correction level (default: medium).
    #[serde(default)]
    pub error_correction: ErrorCorrection,

    /// Minimum image edge in pixels (default: 256).
    #[serde(default = "default_qr_size")]
    pub size: u32,
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            error_correction: ErrorCorrection::default(),
            size: default_qr_size(),
        }
    }
}

impl QrConfig {
    /// Encoder for these settings.
    #[must_use]
    pub const fn encoder(&self) -> QrEncoder {
        QrEncoder::new(self.error_correction, self.size)
    }
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            roster: default_roster(),
            secrets: default_secrets(),
            template: None,
            page: default_page(),
            image_dir: default_image_dir(),
            qr: QrConfig::default(),
            workers: default_workers(),
            reuse_key: false,
        }
    }
}

impl IssuerConfig {
    /// Load config from a TOML file, falling back to defaults.
    ///
    /// Relative paths in the file resolve against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| IssueError::io(path, e))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| IssueError::Config(format!("{}: {e}", path.display())))?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Ok(config.rooted_at(base))
    }

    /// Resolve every relative path against `base`.
    #[must_use]
    pub fn rooted_at(mut self, base: &Path) -> Self {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        join(&mut self.roster);
        join(&mut self.secrets);
        join(&mut self.page);
        join(&mut self.image_dir);
        if let Some(template) = self.template.as_mut() {
            join(template);
        }
        self
    }

    /// Reject configurations that would leak the secret or cannot run.
    ///
    /// Paths are compared after resolving `.`, `..` and symlinked parent
    /// directories, so two spellings of one file count as the same file.
    pub fn validate(&self) -> Result<()> {
        let secrets = resolve(&self.secrets)?;
        let image_dir = resolve(&self.image_dir)?;

        let mut public = vec![("roster", &self.roster), ("page", &self.page)];
        if let Some(template) = &self.template {
            public.push(("template", template));
        }
        for (role, path) in public {
            if resolve(path)? == secrets {
                return Err(IssueError::Config(format!(
                    "secrets path {} is the same file as the {role} {}",
                    self.secrets.display(),
                    path.display()
                )));
            }
        }
        if secrets.starts_with(&image_dir) {
            return Err(IssueError::Config(format!(
                "secrets path {} lies inside the image directory {}",
                self.secrets.display(),
                self.image_dir.display()
            )));
        }
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(IssueError::Config(format!(
                "workers must be between 1 and {MAX_WORKERS}, got {}",
                self.workers
            )));
        }
        if self.qr.size == 0 {
            return Err(IssueError::Config("qr.size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Absolute, lexically normalized form of `path`, with the longest existing
/// ancestor canonicalized.
fn resolve(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| IssueError::io(".", e))?
            .join(path)
    };

    let mut normal = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normal.pop();
            }
            other => normal.push(other),
        }
    }

    let mut tail = Vec::new();
    let mut base = normal.as_path();
    loop {
        if let Ok(canonical) = base.canonicalize() {
            return Ok(tail.iter().rev().fold(canonical, |acc, part| acc.join(part)));
        }
        match (base.parent(), base.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                base = parent;
            }
            _ => return Ok(normal),
        }
    }
}

// Default value functions for serde.
fn default_roster() -> PathBuf {
    PathBuf::from("config.yaml")
}

fn default_secrets() -> PathBuf {
    PathBuf::from("secrets.yaml")
}

fn default_page() -> PathBuf {
    PathBuf::from("index.html")
}

fn default_image_dir() -> PathBuf {
    PathBuf::from("qrcodes")
}

const fn default_qr_size() -> u32 {
    DEFAULT_SIZE
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}
