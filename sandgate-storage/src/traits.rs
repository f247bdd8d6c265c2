//! Backend trait definitions.
//!
//! `FileStore` and `VersionControl` are the two collaborator seams the
//! capability layer talks to. Both are object-safe so callers can hold them
//! as `Arc<dyn ...>` and swap in test doubles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    /// File or directory name (no path components)
    pub name: String,
    /// True for directories
    pub is_directory: bool,
}

/// Working-tree state of a single path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    Added,
    Modified,
    Deleted,
    Renamed,
    Untracked,
    Conflicted,
}

/// A changed path in the working tree or index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    /// Path relative to repository root
    pub path: String,
    /// Kind of change
    pub state: FileState,
    /// Whether the change is staged in the index
    pub staged: bool,
}

/// Repository status at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Current branch, `None` when detached or before the first commit
    pub branch: Option<String>,
    /// True when nothing is staged, modified or untracked
    pub clean: bool,
    /// Changed paths
    pub files: Vec<ChangedFile>,
}

/// A single commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRecord {
    /// Full commit id
    pub id: String,
    /// Abbreviated (7-char) id
    pub short_id: String,
    /// Commit message
    pub message: String,
    /// Author name
    pub author: String,
    /// Author email
    pub email: String,
    /// Commit time, RFC 3339
    pub timestamp: String,
}

/// File operations confined to a single root directory.
///
/// Every `path` argument is relative to that root. Implementations must
/// reject paths that resolve outside it with `StorageError::OutsideRoot`
/// before touching the filesystem.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Read a file as UTF-8 text.
    async fn read(&self, path: &str) -> Result<String>;

    /// Create or replace a file. Parent directories are created as needed.
    async fn write(&self, path: &str, content: &str) -> Result<()>;

    /// Append to a file, creating it if missing.
    async fn append(&self, path: &str, content: &str) -> Result<()>;

    /// List a directory, sorted by name.
    async fn list(&self, path: &str) -> Result<Vec<DirEntry>>;

    /// Delete a file or an empty directory.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Create a directory and any missing parents.
    async fn make_dir(&self, path: &str) -> Result<()>;

    /// Lowercase hex SHA-256 of the file contents.
    async fn hash(&self, path: &str) -> Result<String>;

    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;
}

/// Version-control operations on the repository at the sandbox root.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Snapshot of the working tree and index.
    async fn status(&self) -> Result<StatusSnapshot>;

    /// Stage every change and commit it.
    async fn commit(&self, message: &str) -> Result<CommitRecord>;

    /// Push `branch` (current branch when `None`) to the configured remote.
    async fn push(&self, branch: Option<&str>) -> Result<String>;

    /// Pull `branch` (current branch when `None`) from the configured remote.
    async fn pull(&self, branch: Option<&str>) -> Result<String>;

    /// Most recent commits, newest first.
    async fn log(&self, limit: usize) -> Result<Vec<CommitRecord>>;
}
