//! Atomic file replacement.
//!
//! Contents go to a temporary file in the destination directory, are
//! fsynced, then renamed over the target. Readers see the old file or
//! the new one, never a torn write.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{IssueError, Result};

/// Who may read the written file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Visibility {
    /// World-readable (0644 on Unix)
    Public,
    /// Owner read/write only (0600 on Unix)
    Private,
}

/// Atomically replace `path` with `contents`, creating parent directories.
pub(crate) fn write_atomic(path: &Path, contents: &[u8], visibility: Visibility) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| IssueError::io(dir, e))?;

    // NamedTempFile is created 0600 on Unix; widen it for public artifacts.
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| IssueError::io(dir, e))?;
    tmp.write_all(contents)
        .map_err(|e| IssueError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| IssueError::io(tmp.path(), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = match visibility {
            Visibility::Public => 0o644,
            Visibility::Private => 0o600,
        };
        std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(mode))
            .map_err(|e| IssueError::io(tmp.path(), e))?;
    }
    #[cfg(not(unix))]
    let _ = visibility;

    tmp.persist(path).map_err(|e| IssueError::io(path, e.error))?;
    Ok(())
}

/// Read a whole file as UTF-8.
pub(crate) fn read_to_string(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| IssueError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "old").unwrap();

        write_atomic(&path, b"new", Visibility::Public).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        // no stray temp files left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/qrcodes/A1.png");
        write_atomic(&path, b"png", Visibility::Public).unwrap();
        assert!(path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn private_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let secret = dir.path().join("secrets.yaml");
        let public = dir.path().join("config.yaml");
        write_atomic(&secret, b"k", Visibility::Private).unwrap();
        write_atomic(&public, b"p", Visibility::Public).unwrap();

        let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&secret), 0o600);
        assert_eq!(mode(&public), 0o644);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = read_to_string(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(err.is_io());
    }
}
