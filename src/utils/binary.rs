//! Binary path resolution and validation utilities.
//!
//! The forwarding-engine executable is given either as a bare name looked up
//! in `PATH` (`simple_switch`) or as an explicit path (`./simple_switch`,
//! `~/bmv2/bin/simple_switch`).

use std::env;
use std::ffi::OsStr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

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

/// Get the user's home directory from the HOME environment variable
fn get_home_dir() -> Result<PathBuf, BinaryError> {
    env::var("HOME")
        .map(PathBuf::from)
        .map_err(|_| BinaryError::NoHomeDir)
}

fn is_explicit_path(name_or_path: &str) -> bool {
    name_or_path.contains('/') || name_or_path.starts_with('~')
}

/// Expand a leading `~` of an explicit path
fn expand_tilde(path: &str) -> Result<PathBuf, BinaryError> {
    match path.strip_prefix('~') {
        Some(rest) => Ok(get_home_dir()?.join(rest.trim_start_matches('/'))),
        None => Ok(PathBuf::from(path)),
    }
}

/// Look `name` up in the directories of `search_path`, a `PATH`-style list
fn find_in_path(name: &str, search_path: &OsStr) -> Option<PathBuf> {
    env::split_paths(search_path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Resolve a binary path from a bare name or explicit path.
///
/// Resolution rules:
/// 1. If the value contains `/` or starts with `~`: treat as explicit path
/// 2. Otherwise: search the directories of `PATH`
///
/// # Examples
///
/// ```ignore
/// resolve_binary_path("simple_switch") -> /usr/local/bin/simple_switch
/// resolve_binary_path("~/bmv2/simple_switch") -> /home/user/bmv2/simple_switch
/// ```
pub fn resolve_binary_path(name_or_path: &str) -> Result<PathBuf, BinaryError> {
    if name_or_path.is_empty() {
        return Err(BinaryError::InvalidPath {
            path: name_or_path.to_string(),
        });
    }

    if is_explicit_path(name_or_path) {
        return expand_tilde(name_or_path);
    }

    let search_path = env::var_os("PATH").unwrap_or_default();
    find_in_path(name_or_path, &search_path).ok_or_else(|| BinaryError::NotFound {
        path: name_or_path.to_string(),
    })
}

/// Path handed to the OS when spawning `name_or_path`.
///
/// Explicit paths get their `~` expanded; bare names are returned unchanged
/// and left to the `PATH` lookup of the spawn itself.
pub fn command_path(name_or_path: &str) -> Result<PathBuf, BinaryError> {
    if name_or_path.is_empty() {
        return Err(BinaryError::InvalidPath {
            path: name_or_path.to_string(),
        });
    }
    if is_explicit_path(name_or_path) {
        expand_tilde(name_or_path)
    } else {
        Ok(PathBuf::from(name_or_path))
    }
}

/// Validate that a binary exists and is executable.
///
/// This should be called before any device is launched to catch
/// configuration errors early.
pub fn validate_binary(path: &Path) -> Result<(), BinaryError> {
    if !path.exists() {
        return Err(BinaryError::NotFound {
            path: path.display().to_string(),
        });
    }

    let metadata = path.metadata().map_err(|_| BinaryError::InvalidPath {
        path: path.display().to_string(),
    })?;

    // Check if file is executable (any execute bit set)
    let mode = metadata.permissions().mode();
    if !metadata.is_file() || mode & 0o111 == 0 {
        return Err(BinaryError::NotExecutable {
            path: path.display().to_string(),
        });
    }

    Ok(())
}

/// Validate a binary specified by name or path.
///
/// Combines resolution and validation in one step.
pub fn validate_binary_spec(name_or_path: &str) -> Result<PathBuf, BinaryError> {
    let resolved = resolve_binary_path(name_or_path)?;
    validate_binary(&resolved)?;
    Ok(resolved)
}
