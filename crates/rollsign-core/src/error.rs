use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias for issuance operations
pub type Result<T> = std::result::Result<T, IssueError>;

/// Errors that can occur while issuing credentials
#[derive(Error, Debug)]
pub enum IssueError {
    /// Random source unavailable or key material malformed
    #[error("crypto error: {0}")]
    Crypto(String),

    /// File missing, unreadable or unwritable
    #[error("io error at {}: {source}", path.display())]
    Io {
        /// File the operation touched
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Roster or secret file is malformed
    #[error("parse error in {}: {message}", path.display())]
    Parse {
        /// File being parsed
        path: PathBuf,
        /// What was wrong with it
        message: String,
    },

    /// Payload does not fit the selected QR symbol, or PNG encoding failed
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Template references something the roster does not provide
    #[error("template error: {0}")]
    Template(String),

    /// Issuer configuration is invalid
    #[error("configuration error: {0}")]
    Config(String),
}

impl IssueError {
    /// Build an I/O error tagged with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Build a parse error tagged with the file it happened in.
    pub fn parse(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    /// Returns true if the error came from the filesystem
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Key pair creation and secret store write
    KeyGeneration,
    /// Loading the roster
    RosterRead,
    /// Persisting the roster with the new public key
    RosterWrite,
    /// Signing every code
    Signing,
    /// QR rendering and image writes
    Encoding,
    /// Page rendering and write
    Rendering,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeyGeneration => write!(f, "key generation"),
            Self::RosterRead => write!(f, "roster read"),
            Self::RosterWrite => write!(f, "roster write"),
            Self::Signing => write!(f, "signing"),
            Self::Encoding => write!(f, "encoding"),
            Self::Rendering => write!(f, "rendering"),
        }
    }
}

/// A stage failure surfaced to the pipeline driver.
#[derive(Error, Debug)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    /// Stage that failed
    pub stage: Stage,
    /// Underlying failure
    #[source]
    pub source: IssueError,
}

impl PipelineError {
    /// Attribute an error to a stage.
    #[must_use]
    pub const fn new(stage: Stage, source: IssueError) -> Self {
        Self { stage, source }
    }
}

/// Why a full issuance did not finish.
#[derive(Error, Debug)]
pub enum IssueFailure {
    /// Configuration rejected before any stage ran
    #[error(transparent)]
    Config(IssueError),

    /// A stage failed
    #[error(transparent)]
    Stage(#[from] PipelineError),
}

/// Tag a stage result with the stage it came from.
pub(crate) trait StageExt<T> {
    fn stage(self, stage: Stage) -> std::result::Result<T, PipelineError>;
}

impl<T> StageExt<T> for Result<T> {
    fn stage(self, stage: Stage) -> std::result::Result<T, PipelineError> {
        self.map_err(|source| PipelineError::new(stage, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_error_names_stage() {
        let err = PipelineError::new(
            Stage::RosterRead,
            IssueError::parse("config.yaml", "missing field `users`"),
        );
        let msg = err.to_string();
        assert!(msg.starts_with("roster read failed:"));
        assert!(msg.contains("config.yaml"));
    }

    #[test]
    fn io_error_is_io() {
        let err = IssueError::io(
            "secrets.yaml",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.is_io());
        assert!(!IssueError::Crypto("bad".into()).is_io());
    }
}
