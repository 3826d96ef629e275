//! Binary path resolution and validation utilities.
//!
//! This module handles resolving binary paths from shorthand names or
//! explicit paths, and validating that binaries exist and are executable
//! before any manifest is written.

use std::env;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Default directory for monerosim binaries
const DEFAULT_BIN_DIR: &str = ".monerosim/bin";

/// Errors that can occur during binary resolution or validation
#[derive(Debug, thiserror::Error)]
pub enum BinaryError {
    #[error("Binary not found: {path}")]
    NotFound { path: String },

    #[error("Binary is not executable: {path}")]
    NotExecutable { path: String },

    #[error("Cannot determine home directory")]
    NoHomeDir,

    #[error("Invalid path: {path}")]
    InvalidPath { path: String },
}

fn get_home_dir() -> Result<PathBuf, BinaryError> {
    env::var("HOME")
        .map(PathBuf::from)
        .map_err(|_| BinaryError::NoHomeDir)
}

/// Resolve a binary path from a shorthand name or explicit path.
///
/// Resolution rules:
/// 1. If the path contains `/` or starts with `~`: treat as explicit, with
///    `~` expanded to the home directory.
/// 2. Otherwise: expand the shorthand to `~/.monerosim/bin/{name}`.
pub fn resolve_binary_path(name_or_path: &str) -> Result<PathBuf, BinaryError> {
    let home_dir = get_home_dir()?;

    if name_or_path.starts_with("~/") {
        Ok(home_dir.join(&name_or_path[2..]))
    } else if name_or_path.contains('/') {
        Ok(PathBuf::from(name_or_path))
    } else {
        Ok(home_dir.join(DEFAULT_BIN_DIR).join(name_or_path))
    }
}

/// Validate that a binary exists and has an execute bit set.
pub fn validate_binary(path: &Path) -> Result<(), BinaryError> {
    if !path.exists() {
        return Err(BinaryError::NotFound {
            path: path.display().to_string(),
        });
    }

    let metadata = path.metadata().map_err(|_| BinaryError::InvalidPath {
        path: path.display().to_string(),
    })?;

    if metadata.permissions().mode() & 0o111 == 0 {
        return Err(BinaryError::NotExecutable {
            path: path.display().to_string(),
        });
    }

    Ok(())
}

/// Resolve and validate in one step. Called for every daemon/wallet phase
/// path before the plan is emitted.
pub fn validate_binary_spec(name_or_path: &str) -> Result<PathBuf, BinaryError> {
    let resolved = resolve_binary_path(name_or_path)?;
    validate_binary(&resolved)?;
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_resolve_shorthand() {
        let result = resolve_binary_path("monerod").unwrap();
        assert!(result.ends_with(".monerosim/bin/monerod"));
    }

    #[test]
    fn test_resolve_shorthand_with_version() {
        let result = resolve_binary_path("monerod-v18").unwrap();
        assert!(result.ends_with(".monerosim/bin/monerod-v18"));
    }

    #[test]
    fn test_resolve_explicit_tilde() {
        let result = resolve_binary_path("~/.local/bin/monerod").unwrap();
        assert!(result.ends_with(".local/bin/monerod"));
        assert!(!result.to_string_lossy().contains('~'));
    }

    #[test]
    fn test_resolve_explicit_absolute() {
        let result = resolve_binary_path("/opt/monero/monerod").unwrap();
        assert_eq!(result, PathBuf::from("/opt/monero/monerod"));
    }

    #[test]
    fn test_validate_missing_binary() {
        let result = validate_binary(Path::new("/nonexistent/monerod"));
        assert!(matches!(result, Err(BinaryError::NotFound { .. })));
    }

    #[test]
    fn test_validate_non_executable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monerod");
        fs::write(&path, b"#!/bin/sh\n").unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o644);
        fs::set_permissions(&path, perms).unwrap();

        assert!(matches!(
            validate_binary(&path),
            Err(BinaryError::NotExecutable { .. })
        ));
    }

    #[test]
    fn test_validate_executable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monerod");
        fs::write(&path, b"#!/bin/sh\n").unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();

        assert!(validate_binary(&path).is_ok());
    }
}
