//! Path guardrails for tools that read from the local filesystem.

use crate::{BuddyError, Result};
use std::path::{Component, Path, PathBuf};

/// Resolve `relative` beneath `root`, refusing anything that escapes it.
///
/// Rejects absolute paths and `..` components up front, then canonicalizes
/// both sides so that symlinks pointing outside `root` are caught too.
pub fn resolve_under_root(root: &Path, relative: &str) -> Result<PathBuf> {
    let relative = relative.trim();
    if relative.is_empty() {
        return Err(BuddyError::Tool("empty path".into()));
    }

    let candidate = Path::new(relative);
    if candidate.is_absolute() {
        return Err(BuddyError::Tool(format!(
            "absolute path '{relative}' is not allowed"
        )));
    }
    if candidate
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(BuddyError::Tool(format!(
            "path '{relative}' contains '..' components which are not allowed"
        )));
    }

    let canonical_root = root.canonicalize().map_err(|e| {
        BuddyError::Tool(format!("failed to resolve root '{}': {e}", root.display()))
    })?;
    let joined = canonical_root.join(candidate);
    if !joined.exists() {
        return Err(BuddyError::NotFound(format!("document '{relative}'")));
    }

    let canonical = joined
        .canonicalize()
        .map_err(|e| BuddyError::Tool(format!("failed to resolve '{relative}': {e}")))?;
    if !canonical.starts_with(&canonical_root) {
        return Err(BuddyError::Tool(format!(
            "path '{relative}' resolves outside the documents root"
        )));
    }

    Ok(canonical)
}
