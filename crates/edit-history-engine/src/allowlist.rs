//! The workspace allowlist contract.
//!
//! Path-validation is an external collaborator in the broader tool-server —
//! the engine only depends on its interface. This module carries that
//! interface plus the one concrete implementation this repository ships: a
//! single-root allowlist that canonicalizes (following symlinks) and checks
//! containment. Richer multi-root or glob-based allowlists are out of
//! scope here; a caller wanting one only needs to implement the trait.

use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};

/// Validates that a path lies inside a governed workspace, returning its
/// canonical (symlink-resolved) absolute form.
pub trait WorkspaceAllowlist: Send + Sync {
    fn validate(&self, path: &Path) -> Result<PathBuf>;
}

/// The default allowlist: everything under one canonical root is permitted.
pub struct SingleRootAllowlist {
    root: PathBuf,
}

impl SingleRootAllowlist {
    /// `root` must already exist; it is canonicalized once at construction.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self { root: root.as_ref().canonicalize()? })
    }
}

impl WorkspaceAllowlist for SingleRootAllowlist {
    fn validate(&self, path: &Path) -> Result<PathBuf> {
        let canonical = canonicalize_best_effort(path)?;
        if canonical.starts_with(&self.root) {
            Ok(canonical)
        } else {
            Err(EngineError::PathOutsideWorkspace { path: path.to_path_buf() })
        }
    }
}

/// Canonicalizes `path`, tolerating a final component that does not yet
/// exist (the common case for `create` and the destination of `move`) by
/// canonicalizing the parent and re-joining the file name.
pub(crate) fn canonicalize_best_effort(path: &Path) -> Result<PathBuf> {
    if let Ok(c) = path.canonicalize() {
        return Ok(c);
    }
    let parent = path.parent().ok_or_else(|| EngineError::InvalidArgument {
        message: format!("path `{}` has no parent", path.display()),
    })?;
    let file_name = path.file_name().ok_or_else(|| EngineError::InvalidArgument {
        message: format!("path `{}` has no file name", path.display()),
    })?;
    let parent_canonical = parent.canonicalize()?;
    Ok(parent_canonical.join(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn accepts_existing_path_inside_root() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"x").unwrap();

        let allowlist = SingleRootAllowlist::new(dir.path()).unwrap();
        assert!(allowlist.validate(&file).is_ok());
    }

    #[test]
    fn accepts_not_yet_existing_path_inside_root() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("new.txt");

        let allowlist = SingleRootAllowlist::new(dir.path()).unwrap();
        assert!(allowlist.validate(&file).is_ok());
    }

    #[test]
    fn rejects_path_outside_root() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let file = outside.path().join("a.txt");
        std::fs::write(&file, b"x").unwrap();

        let allowlist = SingleRootAllowlist::new(dir.path()).unwrap();
        let result = allowlist.validate(&file);
        assert!(matches!(result, Err(EngineError::PathOutsideWorkspace { .. })));
    }

    #[test]
    fn rejects_traversal_outside_root() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        let traversal = sub.join("../../etc/passwd");

        let allowlist = SingleRootAllowlist::new(dir.path()).unwrap();
        // `/etc/passwd` resolves outside the workspace root regardless of
        // whether it exists on the host running the test.
        let result = allowlist.validate(&traversal);
        assert!(result.is_err() || !result.unwrap().starts_with(dir.path()));
    }
}
