//! Capability invoker
//!
//! Turns a (tool name, arguments) pair into exactly one backend call and
//! folds whatever comes back into a [`ToolOutcome`]. Backend failures never
//! escape this module: they become `status: "error"` outcomes.

use futures::FutureExt;
use serde_json::{json, Map, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use sandgate_storage::{FileStore, StorageError, VersionControl};

use super::catalog::{find_capability, Arguments, Capability};

const DEFAULT_LOG_LIMIT: i64 = 10;
const MAX_LOG_LIMIT: i64 = 500;

/// The requested capability is not in the catalog
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown tool: {0}")]
pub struct UnknownCapability(pub String);

/// Why a capability reported failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Arguments failed schema validation or were rejected by the backend
    InvalidArguments,
    /// Path escapes the workspace root
    Denied,
    /// Target does not exist
    NotFound,
    /// Anything else the backend reported
    Backend,
}

/// Normalized result of one capability call
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Ok(Map<String, Value>),
    Error { kind: FailureKind, message: String },
}

impl ToolOutcome {
    /// Successful outcome; `payload` fields are merged next to `status`.
    pub fn ok(payload: Value) -> Self {
        match payload {
            Value::Object(map) => ToolOutcome::Ok(map),
            Value::Null => ToolOutcome::Ok(Map::new()),
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                ToolOutcome::Ok(map)
            }
        }
    }

    pub fn error(kind: FailureKind, message: impl Into<String>) -> Self {
        ToolOutcome::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ToolOutcome::Ok(_))
    }

    /// `{"status": "ok", ...}` or `{"status": "error", "error": message}`
    pub fn to_json(&self) -> Value {
        match self {
            ToolOutcome::Ok(payload) => {
                let mut map = Map::with_capacity(payload.len() + 1);
                map.insert("status".to_string(), json!("ok"));
                for (k, v) in payload {
                    map.insert(k.clone(), v.clone());
                }
                Value::Object(map)
            }
            ToolOutcome::Error { message, .. } => json!({
                "status": "error",
                "error": message
            }),
        }
    }
}

impl From<StorageError> for ToolOutcome {
    fn from(err: StorageError) -> Self {
        let kind = match &err {
            e if e.is_outside_root() => FailureKind::Denied,
            e if e.is_not_found() => FailureKind::NotFound,
            StorageError::InvalidPath(_)
            | StorageError::InvalidArgument(_)
            | StorageError::NotADirectory(_) => FailureKind::InvalidArguments,
            _ => FailureKind::Backend,
        };
        ToolOutcome::error(kind, err.to_string())
    }
}

/// Dispatches catalog capabilities to the injected backends
#[derive(Clone)]
pub struct CapabilityInvoker {
    files: Arc<dyn FileStore>,
    vcs: Arc<dyn VersionControl>,
}

impl CapabilityInvoker {
    pub fn new(files: Arc<dyn FileStore>, vcs: Arc<dyn VersionControl>) -> Self {
        Self { files, vcs }
    }

    /// Invoke a capability by name.
    ///
    /// Only an unknown name is an `Err`; every other failure is reported in
    /// the returned outcome.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: &Value,
    ) -> Result<ToolOutcome, UnknownCapability> {
        let descriptor =
            find_capability(name).ok_or_else(|| UnknownCapability(name.to_string()))?;

        let start = Instant::now();
        let outcome = match descriptor.validate(arguments) {
            Ok(args) => {
                AssertUnwindSafe(self.dispatch(descriptor.capability, args))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        tracing::error!(tool = name, "backend panicked");
                        ToolOutcome::error(FailureKind::Backend, "internal backend failure")
                    })
            }
            Err(message) => ToolOutcome::error(FailureKind::InvalidArguments, message),
        };
        let elapsed = start.elapsed();

        match &outcome {
            ToolOutcome::Ok(_) => {
                tracing::debug!(tool = name, elapsed_ms = elapsed.as_millis() as u64, "tool ok")
            }
            ToolOutcome::Error { kind, message } => tracing::info!(
                tool = name,
                ?kind,
                error = %message,
                elapsed_ms = elapsed.as_millis() as u64,
                "tool reported error"
            ),
        }
        crate::metrics::record_tool_call(name, outcome.is_ok(), elapsed);

        Ok(outcome)
    }

    async fn dispatch(&self, capability: Capability, args: Arguments<'_>) -> ToolOutcome {
        let path = args.str("path").unwrap_or(".");

        let result: sandgate_storage::Result<Value> = match capability {
            Capability::ReadFile => self
                .files
                .read(path)
                .await
                .map(|content| json!({ "content": content })),
            Capability::WriteFile => {
                let content = args.str("content").unwrap_or_default();
                self.files.write(path, content).await.map(|_| {
                    json!({ "message": format!("Wrote {} bytes to {}", content.len(), path) })
                })
            }
            Capability::AppendFile => {
                let content = args.str("content").unwrap_or_default();
                self.files.append(path, content).await.map(|_| {
                    json!({ "message": format!("Appended {} bytes to {}", content.len(), path) })
                })
            }
            Capability::ListFiles => self
                .files
                .list(path)
                .await
                .map(|files| json!({ "files": files })),
            Capability::DeleteFile => self
                .files
                .delete(path)
                .await
                .map(|_| json!({ "message": format!("Deleted {}", path) })),
            Capability::CreateDirectory => self
                .files
                .make_dir(path)
                .await
                .map(|_| json!({ "message": format!("Created directory {}", path) })),
            Capability::HashFile => self
                .files
                .hash(path)
                .await
                .map(|hash| json!({ "hash": hash })),
            Capability::GitStatus => self.vcs.status().await.map(|s| {
                json!({
                    "branch": s.branch,
                    "clean": s.clean,
                    "files": s.files,
                })
            }),
            Capability::GitCommit => self
                .vcs
                .commit(args.str("message").unwrap_or_default())
                .await
                .map(|commit| json!({ "commit": commit })),
            Capability::GitPush => self
                .vcs
                .push(args.str("branch"))
                .await
                .map(|output| json!({ "message": output })),
            Capability::GitPull => self
                .vcs
                .pull(args.str("branch"))
                .await
                .map(|output| json!({ "message": output })),
            Capability::GitLog => {
                let limit = args
                    .int("limit")
                    .unwrap_or(DEFAULT_LOG_LIMIT)
                    .clamp(1, MAX_LOG_LIMIT) as usize;
                self.vcs
                    .log(limit)
                    .await
                    .map(|commits| json!({ "commits": commits }))
            }
        };

        match result {
            Ok(payload) => ToolOutcome::ok(payload),
            Err(e) => e.into(),
        }
    }
}
