//! Git backend.
//!
//! Local operations (status, commit, log) go through libgit2 on the blocking
//! pool. Network operations shell out to the `git` binary so they pick up the
//! user's credential helpers and ssh configuration.

use async_trait::async_trait;
use git2::{IndexAddOption, Repository, Signature, Status, StatusOptions};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::error::{Result, StorageError};
use crate::traits::{ChangedFile, CommitRecord, FileState, StatusSnapshot, VersionControl};

const FALLBACK_AUTHOR: (&str, &str) = ("sandgate", "sandgate@localhost");

/// Repository at the sandbox root.
#[derive(Clone)]
pub struct GitRepository {
    repo: Arc<Mutex<Repository>>,
    root: PathBuf,
    remote: String,
    author: Option<(String, String)>,
}

impl std::fmt::Debug for GitRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepository")
            .field("root", &self.root)
            .field("remote", &self.remote)
            .finish()
    }
}

impl GitRepository {
    /// Open an existing repository.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let repo = Repository::open(&root)?;
        Ok(Self::from_repo(repo, root))
    }

    /// Open the repository at `root`, initializing one if none exists.
    pub fn open_or_init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let repo = match Repository::open(&root) {
            Ok(repo) => repo,
            Err(e) if e.code() == git2::ErrorCode::NotFound => {
                info!("Initializing git repository at {}", root.display());
                Repository::init(&root)?
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self::from_repo(repo, root))
    }

    fn from_repo(repo: Repository, root: PathBuf) -> Self {
        Self {
            repo: Arc::new(Mutex::new(repo)),
            root,
            remote: "origin".to_string(),
            author: None,
        }
    }

    /// Remote used by push and pull (default `origin`).
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Commit author in `Name <email>` form. Falls back to the repository
    /// config when unset or unparseable.
    pub fn with_author(mut self, author: Option<&str>) -> Self {
        self.author = author.and_then(parse_author);
        self
    }

    /// Repository root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run `f` against the repository on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Repository) -> Result<T> + Send + 'static,
    {
        let repo = self.repo.clone();
        tokio::task::spawn_blocking(move || {
            let guard = repo.lock();
            f(&guard)
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e.to_string())))?
    }

    async fn target_branch(&self, branch: Option<&str>) -> Result<String> {
        if let Some(b) = branch.map(str::trim).filter(|b| !b.is_empty()) {
            validate_branch(b)?;
            return Ok(b.to_string());
        }
        self.blocking(|repo| current_branch(repo))
            .await?
            .ok_or_else(|| StorageError::InvalidArgument("no current branch to use".to_string()))
    }

    /// Run a `git` subcommand in the repository root.
    async fn run_git(&self, args: &[&str]) -> Result<String> {
        debug!(?args, "running git");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.success() {
            Ok(format!("{}{}", stdout, stderr).trim().to_string())
        } else {
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            Err(StorageError::Remote(detail))
        }
    }
}

#[async_trait]
impl VersionControl for GitRepository {
    #[instrument(skip(self))]
    async fn status(&self) -> Result<StatusSnapshot> {
        self.blocking(|repo| {
            let mut opts = StatusOptions::new();
            opts.include_untracked(true)
                .recurse_untracked_dirs(true)
                .include_ignored(false);

            let statuses = repo.statuses(Some(&mut opts))?;
            let files: Vec<ChangedFile> = statuses
                .iter()
                .filter_map(|entry| {
                    let path = entry.path()?.to_string();
                    let status = entry.status();
                    Some(ChangedFile {
                        path,
                        state: file_state(status),
                        staged: is_staged(status),
                    })
                })
                .collect();

            Ok(StatusSnapshot {
                branch: current_branch(repo)?,
                clean: files.is_empty(),
                files,
            })
        })
        .await
    }

    #[instrument(skip(self))]
    async fn commit(&self, message: &str) -> Result<CommitRecord> {
        if message.trim().is_empty() {
            return Err(StorageError::InvalidArgument(
                "commit message cannot be empty".to_string(),
            ));
        }
        let message = message.to_string();
        let author = self.author.clone();

        let record = self
            .blocking(move |repo| {
                let mut index = repo.index()?;
                index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
                index.update_all(["*"], None)?;
                index.write()?;

                let tree_oid = index.write_tree()?;
                let parent = match repo.head() {
                    Ok(head) => Some(head.peel_to_commit()?),
                    Err(_) => None,
                };
                let unchanged = match &parent {
                    Some(p) => p.tree_id() == tree_oid,
                    None => index.is_empty(),
                };
                if unchanged {
                    return Err(StorageError::InvalidArgument("nothing to commit".to_string()));
                }

                let tree = repo.find_tree(tree_oid)?;
                let sig = match author {
                    Some((name, email)) => Signature::now(&name, &email)?,
                    None => repo
                        .signature()
                        .or_else(|_| Signature::now(FALLBACK_AUTHOR.0, FALLBACK_AUTHOR.1))?,
                };
                let parents: Vec<&git2::Commit> = parent.iter().collect();
                let oid = repo.commit(Some("HEAD"), &sig, &sig, &message, &tree, &parents)?;
                let commit = repo.find_commit(oid)?;
                Ok(commit_record(&commit))
            })
            .await?;

        info!(commit = %record.short_id, "Created commit");
        Ok(record)
    }

    #[instrument(skip(self))]
    async fn push(&self, branch: Option<&str>) -> Result<String> {
        let branch = self.target_branch(branch).await?;
        info!(remote = %self.remote, branch = %branch, "Pushing");
        self.run_git(&["push", "--", &self.remote, &branch]).await
    }

    #[instrument(skip(self))]
    async fn pull(&self, branch: Option<&str>) -> Result<String> {
        let branch = self.target_branch(branch).await?;
        info!(remote = %self.remote, branch = %branch, "Pulling");
        self.run_git(&["pull", "--no-rebase", "--no-edit", "--", &self.remote, &branch])
            .await
    }

    #[instrument(skip(self))]
    async fn log(&self, limit: usize) -> Result<Vec<CommitRecord>> {
        self.blocking(move |repo| {
            if repo.head().is_err() {
                return Ok(Vec::new());
            }

            let mut revwalk = repo.revwalk()?;
            revwalk.push_head()?;

            let mut entries = Vec::with_capacity(limit.min(64));
            for oid in revwalk.take(limit) {
                let commit = repo.find_commit(oid?)?;
                entries.push(commit_record(&commit));
            }
            Ok(entries)
        })
        .await
    }
}

/// A branch name must be a valid ref and must never parse as an option.
fn validate_branch(branch: &str) -> Result<()> {
    if branch.starts_with('-') || !git2::Reference::is_valid_name(&format!("refs/heads/{}", branch))
    {
        return Err(StorageError::InvalidArgument(format!(
            "invalid branch name: {}",
            branch
        )));
    }
    Ok(())
}

fn current_branch(repo: &Repository) -> Result<Option<String>> {
    match repo.head() {
        Ok(head) if head.is_branch() => Ok(head.shorthand().map(|s| s.to_string())),
        Ok(_) => Ok(None),
        Err(_) => Ok(None),
    }
}

fn file_state(status: Status) -> FileState {
    if status.is_conflicted() {
        FileState::Conflicted
    } else if status.is_index_new() {
        FileState::Added
    } else if status.is_wt_new() {
        FileState::Untracked
    } else if status.is_index_deleted() || status.is_wt_deleted() {
        FileState::Deleted
    } else if status.is_index_renamed() || status.is_wt_renamed() {
        FileState::Renamed
    } else {
        FileState::Modified
    }
}

fn is_staged(status: Status) -> bool {
    status.intersects(
        Status::INDEX_NEW
            | Status::INDEX_MODIFIED
            | Status::INDEX_DELETED
            | Status::INDEX_RENAMED
            | Status::INDEX_TYPECHANGE,
    )
}

fn commit_record(commit: &git2::Commit<'_>) -> CommitRecord {
    let id = commit.id().to_string();
    let author = commit.author();
    CommitRecord {
        short_id: id.chars().take(7).collect(),
        id,
        message: commit.message().unwrap_or("").trim_end().to_string(),
        author: author.name().unwrap_or("").to_string(),
        email: author.email().unwrap_or("").to_string(),
        timestamp: chrono::DateTime::from_timestamp(commit.time().seconds(), 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_default(),
    }
}

/// Parse "Name <email>" format.
fn parse_author(s: &str) -> Option<(String, String)> {
    let lt = s.find('<')?;
    let gt = s.rfind('>')?;
    if gt <= lt {
        return None;
    }
    let name = s[..lt].trim().to_string();
    let email = s[lt + 1..gt].trim().to_string();
    if name.is_empty() || email.is_empty() {
        return None;
    }
    Some((name, email))
}
