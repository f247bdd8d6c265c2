//! Sandbox path confinement.
//!
//! Every path handed to a backend is relative to a single root directory.
//! Resolution happens in two steps:
//!
//! 1. Lexical: the path is joined onto the root and `.`/`..` components are
//!    folded. Anything that ends up outside the root is rejected before the
//!    filesystem is touched.
//! 2. Physical: the nearest existing ancestor is canonicalized so a symlink
//!    inside the root cannot point the operation somewhere else.
//!
//! # Examples
//!
//! ```no_run
//! use sandgate_storage::SandboxRoot;
//!
//! # async fn example() -> sandgate_storage::Result<()> {
//! let root = SandboxRoot::open("./workspace", true)?;
//!
//! let notes = root.resolve("docs/notes.md").await?;
//! assert!(notes.starts_with(root.path()));
//!
//! assert!(root.resolve("../outside").await.is_err());
//! # Ok(())
//! # }
//! ```

use std::path::{Component, Path, PathBuf};
use tracing::warn;

use crate::error::{Result, StorageError};

/// Canonical root directory that all backend paths are confined to.
#[derive(Debug, Clone)]
pub struct SandboxRoot {
    root: PathBuf,
}

impl SandboxRoot {
    /// Open a sandbox rooted at `path`.
    ///
    /// With `create` set, a missing directory is created first. The stored
    /// root is canonical, so later prefix checks compare like with like.
    pub fn open(path: impl AsRef<Path>, create: bool) -> Result<Self> {
        let path = path.as_ref();
        if create {
            std::fs::create_dir_all(path)?;
        }
        let root = std::fs::canonicalize(path).map_err(|e| {
            StorageError::Config(format!("workspace root {}: {}", path.display(), e))
        })?;
        if !root.is_dir() {
            return Err(StorageError::NotADirectory(root.display().to_string()));
        }
        Ok(Self { root })
    }

    /// The canonical root directory.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve a client-supplied path to an absolute path inside the root.
    pub async fn resolve(&self, requested: &str) -> Result<PathBuf> {
        if requested.contains('\0') {
            return Err(StorageError::InvalidPath(requested.escape_default().to_string()));
        }

        let joined = normalize(&self.root.join(requested));
        if !joined.starts_with(&self.root) {
            warn!(path = %requested, "rejected path outside workspace root");
            return Err(StorageError::OutsideRoot(requested.to_string()));
        }

        let anchor = self.existing_ancestor(&joined).await?;
        if !anchor.starts_with(&self.root) {
            warn!(path = %requested, target = %anchor.display(), "rejected symlink escape");
            return Err(StorageError::OutsideRoot(requested.to_string()));
        }

        Ok(joined)
    }

    /// Canonicalize the longest prefix of `path` that exists on disk.
    async fn existing_ancestor(&self, path: &Path) -> Result<PathBuf> {
        let mut current = Some(path);
        while let Some(candidate) = current {
            match tokio::fs::canonicalize(candidate).await {
                Ok(real) => return Ok(real),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    // Dangling symlink: the target cannot be checked
                    if tokio::fs::symlink_metadata(candidate).await.is_ok() {
                        return Err(StorageError::OutsideRoot(candidate.display().to_string()));
                    }
                    current = candidate.parent();
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(self.root.clone())
    }
}

/// Fold `.` and `..` without consulting the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
