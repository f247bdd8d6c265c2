//! Backend collaborators for sandgate.
//!
//! This crate owns everything that touches the disk or the repository on
//! behalf of a client: the [`FileStore`] and [`VersionControl`] traits, the
//! confined local implementation and the git implementation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Capability invoker (sandgate)               │
//! │        │                     │               │
//! │        ▼                     ▼               │
//! │  ┌────────────┐       ┌────────────────┐     │
//! │  │ FileStore  │       │ VersionControl │     │
//! │  └─────┬──────┘       └───────┬────────┘     │
//! │        ▼                      ▼              │
//! │  ┌──────────────┐     ┌───────────────┐      │
//! │  │LocalFileStore│     │ GitRepository │      │
//! │  └─────┬────────┘     └───────┬───────┘      │
//! │        └──────────┬───────────┘              │
//! │                   ▼                          │
//! │            SandboxRoot (one directory)       │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use sandgate_storage::{FileStore, LocalFileStore, SandboxRoot};
//!
//! # async fn example() -> sandgate_storage::Result<()> {
//! let store = LocalFileStore::new(SandboxRoot::open("./workspace", true)?);
//!
//! store.write("notes/today.md", "# Today\n").await?;
//! let text = store.read("notes/today.md").await?;
//! let digest = store.hash("notes/today.md").await?;
//!
//! // Escapes are rejected before any I/O happens
//! assert!(store.read("../etc/passwd").await.is_err());
//! # Ok(())
//! # }
//! ```

mod error;
mod git;
mod local;
mod path;
mod traits;

pub use error::{Result, StorageError};
pub use git::GitRepository;
pub use local::LocalFileStore;
pub use path::SandboxRoot;
pub use traits::{
    ChangedFile, CommitRecord, DirEntry, FileState, FileStore, StatusSnapshot, VersionControl,
};
