//! Workspace scoping for file tools.
//!
//! Relative paths resolve under the workspace root. With `workspace_only`
//! set, anything that would land outside the root is refused.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ScopeError {
    #[error("Path traversal detected in '{0}'")]
    Traversal(String),

    #[error("'{path}' is outside the workspace {root}")]
    OutsideWorkspace { path: String, root: String },
}

/// Where file tools may read and write.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceScope {
    root: Option<PathBuf>,
    confine: bool,
}

impl WorkspaceScope {
    /// No root, no confinement.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn new(root: PathBuf, confine: bool) -> Self {
        Self {
            root: Some(root),
            confine,
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Resolve `path` against the workspace and enforce confinement.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, ScopeError> {
        let raw = Path::new(path);
        if raw.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(ScopeError::Traversal(path.into()));
        }

        let resolved = match &self.root {
            Some(root) if raw.is_relative() => root.join(raw),
            _ => raw.to_path_buf(),
        };

        if let (true, Some(root)) = (self.confine, &self.root) {
            let root = root.canonicalize().unwrap_or_else(|_| root.clone());
            let candidate = canonical_or_parent(&resolved);
            if !candidate.starts_with(&root) {
                return Err(ScopeError::OutsideWorkspace {
                    path: path.into(),
                    root: root.display().to_string(),
                });
            }
        }

        Ok(resolved)
    }
}

/// Canonicalize `path`, or its parent when the file does not exist yet.
fn canonical_or_parent(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => canonical_or_parent(parent).join(name),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_join_root() {
        let dir = tempfile::tempdir().unwrap();
        let scope = WorkspaceScope::new(dir.path().to_path_buf(), true);
        let resolved = scope.resolve("notes/todo.md").unwrap();
        assert!(resolved.starts_with(dir.path()));
    }

    #[test]
    fn parent_components_rejected() {
        let scope = WorkspaceScope::unrestricted();
        assert_eq!(
            scope.resolve("../etc/passwd"),
            Err(ScopeError::Traversal("../etc/passwd".into()))
        );
    }

    #[test]
    fn absolute_outside_root_rejected_when_confined() {
        let dir = tempfile::tempdir().unwrap();
        let scope = WorkspaceScope::new(dir.path().to_path_buf(), true);
        assert!(matches!(
            scope.resolve("/etc/hostname"),
            Err(ScopeError::OutsideWorkspace { .. })
        ));
    }

    #[test]
    fn absolute_allowed_when_not_confined() {
        let dir = tempfile::tempdir().unwrap();
        let scope = WorkspaceScope::new(dir.path().to_path_buf(), false);
        assert_eq!(scope.resolve("/etc/hostname").unwrap(), PathBuf::from("/etc/hostname"));
    }
}
