//! Containment of filesystem paths within a repo root.
//!
//! This is the sole gate every RepoTools filesystem access must pass through. Unlike the
//! permissive `resolve_path` helpers that expand `~/` and fall back to the unresolved path
//! when canonicalization fails, PathGuard rejects anything that would leave the root instead
//! of silently tolerating it.

use spectrail_core::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Canonicalise `repo_root` once and reuse it for every `resolve` call.
#[derive(Clone, Debug)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    /// Fails with `RepoUnavailable` if `repo_root` does not canonicalise — it must exist and
    /// be readable before any tool call is attempted.
    pub fn new(repo_root: impl AsRef<Path>) -> Result<Self> {
        let root = repo_root
            .as_ref()
            .canonicalize()
            .map_err(|e| Error::RepoUnavailable(format!("{}: {e}", repo_root.as_ref().display())))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `requested` against the repo root, rejecting any path that would escape it.
    ///
    /// `requested` may be relative (joined to the root) or absolute (must already lie under
    /// the root). `..` components are rejected outright rather than lexically normalised away,
    /// since a relative path containing `..` is exactly the traversal attempt this guards
    /// against. Existing targets are canonicalised so a symlink pointing outside the root is
    /// caught; non-existent targets (e.g. a path about to be created) are contained by
    /// lexical join alone.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf> {
        let requested_path = Path::new(requested);

        if requested_path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(Error::PathEscape(requested.to_string()));
        }

        let joined = if requested_path.is_absolute() {
            requested_path.to_path_buf()
        } else {
            self.root.join(requested_path)
        };

        let contained_lexically = joined.starts_with(&self.root);
        if !contained_lexically {
            return Err(Error::PathEscape(requested.to_string()));
        }

        match joined.canonicalize() {
            Ok(canonical) => {
                if canonical.starts_with(&self.root) {
                    Ok(canonical)
                } else {
                    Err(Error::PathEscape(requested.to_string()))
                }
            }
            // Target doesn't exist yet (or a component of it doesn't) — the lexical
            // containment check above is the best available guarantee.
            Err(_) => Ok(joined),
        }
    }

    /// Convenience: resolve and require the target to already exist.
    pub fn resolve_existing(&self, requested: &str) -> Result<PathBuf> {
        let resolved = self.resolve(requested)?;
        if !resolved.exists() {
            return Err(Error::InvalidArgs(format!("no such path: {requested}")));
        }
        Ok(resolved)
    }

    /// Path relative to the root, for returning to callers (tool outputs report root-relative
    /// paths, never absolute ones).
    pub fn relativize(&self, absolute: &Path) -> PathBuf {
        absolute
            .strip_prefix(&self.root)
            .unwrap_or(absolute)
            .to_path_buf()
    }
}
