//! Storage error types.

use std::io;
use thiserror::Error;

/// Backend operation errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error during a file operation
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Path not found
    #[error("Path not found: {0}")]
    NotFound(String),

    /// Path resolves outside the sandbox root
    #[error("Access denied: path '{0}' is outside the workspace root")]
    OutsideRoot(String),

    /// Invalid path format
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Listing requested on something that is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// Argument rejected by the backend before doing any work
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// libgit2 failure
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// `git push` / `git pull` exited unsuccessfully
    #[error("Remote operation failed: {0}")]
    Remote(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    /// Check if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
            || matches!(self, StorageError::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }

    /// Check if this is a confinement violation.
    pub fn is_outside_root(&self) -> bool {
        matches!(self, StorageError::OutsideRoot(_))
    }
}
