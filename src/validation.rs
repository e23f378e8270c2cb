//! Path validation and canonicalization utilities.
//!
//! Provides security-critical path validation to prevent directory traversal.
//! The Content Store and Workspace Scanner route every filesystem access
//! through [`validate_path_within_root`] before touching disk.

use std::path::{Path, PathBuf};

use camino::Utf8Path;

/// Error types for path validation.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("cannot canonicalize path: {0}")]
    CannotCanonicalize(String),

    #[error("path escapes workspace root: {0} (root: {1})")]
    OutsideRoot(String, String),

    #[error("path contains suspicious traversal patterns: {0}")]
    SuspiciousTraversal(String),

    #[error("symlink escapes workspace root: {0} -> {1}")]
    SymlinkEscape(String, String),
}

/// Canonicalize a path, resolving symlinks and `.`/`..` components.
pub fn canonicalize_path(path: &Path) -> Result<PathBuf, PathValidationError> {
    std::fs::canonicalize(path)
        .map_err(|_| PathValidationError::CannotCanonicalize(path.to_string_lossy().to_string()))
}

/// Validate that `path` resolves to somewhere inside `root`.
///
/// Rejects both obvious traversal strings (checked before canonicalization, so
/// it also catches paths whose intermediate components do not exist yet) and
/// canonicalized paths that land outside `root` via a symlink.
pub fn validate_path_within_root(path: &Path, root: &Path) -> Result<PathBuf, PathValidationError> {
    let path_str = path.to_string_lossy();
    if has_suspicious_traversal(&path_str) {
        return Err(PathValidationError::SuspiciousTraversal(path_str.to_string()));
    }

    let canonical_path = canonicalize_path(path)?;
    let canonical_root = canonicalize_path(root)
        .map_err(|_| PathValidationError::CannotCanonicalize(root.to_string_lossy().to_string()))?;

    if !canonical_path.starts_with(&canonical_root) {
        return Err(PathValidationError::OutsideRoot(
            canonical_path.to_string_lossy().to_string(),
            canonical_root.to_string_lossy().to_string(),
        ));
    }

    Ok(canonical_path)
}

/// Resolve `path` against `root` the way the Content Store does: absolute
/// paths pass through, relative paths join onto root. Does not touch
/// disk and does not require the path to exist.
pub fn resolve_against_root(path: &Path, root: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Normalize a path to a `/`-separated string without touching disk
/// (used for graph/vector store keys so Windows and Unix agree on chunk ids).
pub fn normalize_path(path: &Path) -> Result<String, PathValidationError> {
    Ok(path.to_string_lossy().replace('\\', "/"))
}

/// Pre-canonicalization heuristic that flags suspicious traversal strings even
/// when `std::fs::canonicalize` would fail outright (missing intermediate dirs).
pub fn has_suspicious_traversal(path: &str) -> bool {
    let path_normalized = path.replace('\\', "/");

    let parent_count = path_normalized.matches("../").count();
    if parent_count >= 3 {
        return true;
    }

    if path_normalized.starts_with("../") && !path_normalized.starts_with("../../") {
        let depth = path_normalized.matches('/').count();
        if depth <= 2 {
            return true;
        }
    }

    let path_win = path.replace('/', "\\");
    if path_win.starts_with("..\\") && !path_win.starts_with("..\\..\\") {
        let depth = path_win.matches('\\').count();
        if depth <= 2 {
            return true;
        }
    }

    let parts: Vec<&str> = path_normalized.split('/').collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == "." && i < parts.len() - 1 && parts[i + 1..].iter().any(|p| *p == "..") {
            return true;
        }
    }

    let parts_win: Vec<&str> = path_win.split('\\').collect();
    for (i, part) in parts_win.iter().enumerate() {
        if *part == "." && i < parts_win.len() - 1 && parts_win[i + 1..].iter().any(|p| *p == "..") {
            return true;
        }
    }

    false
}

/// Check whether a symlink's resolved target stays within `root`.
pub fn is_safe_symlink(symlink_path: &Path, root: &Path) -> Result<bool, PathValidationError> {
    let target = std::fs::read_link(symlink_path)
        .map_err(|_| PathValidationError::CannotCanonicalize(symlink_path.to_string_lossy().to_string()))?;

    let resolved = if target.is_absolute() {
        target.clone()
    } else {
        symlink_path.parent().unwrap_or(symlink_path).join(&target)
    };

    match validate_path_within_root(&resolved, root) {
        Ok(_) => Ok(true),
        Err(PathValidationError::OutsideRoot(_, _)) => Err(PathValidationError::SymlinkEscape(
            symlink_path.to_string_lossy().to_string(),
            target.to_string_lossy().to_string(),
        )),
        Err(e) => Err(e),
    }
}

/// Convenience wrapper for UTF-8 path handling via `camino`.
pub fn validate_utf8_path(utf8_path: &Utf8Path, root: &Path) -> Result<PathBuf, PathValidationError> {
    validate_path_within_root(Path::new(utf8_path.as_str()), root)
}
