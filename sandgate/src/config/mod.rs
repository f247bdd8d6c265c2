//! Configuration management for sandgate
//!
//! Default config location: ./sandgate.toml

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Maximum request body size in bytes (default: 16MB)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_bind_addr() -> String {
    "127.0.0.1:3080".to_string()
}

fn default_max_body_size() -> usize {
    16 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cors: CorsConfig::default(),
            max_body_size: default_max_body_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    /// Enable CORS (default: true for development)
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Allowed origins. Use "*" for any origin, or list specific origins.
    #[serde(default = "default_cors_origins")]
    pub origins: Vec<String>,
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:5173".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            origins: default_cors_origins(),
        }
    }
}

/// Sandbox directory and the repository living in it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkspaceConfig {
    /// Every file capability is confined to this directory
    #[serde(default = "default_workspace_root")]
    pub root: PathBuf,
    /// Create the root if it does not exist
    #[serde(default = "default_true")]
    pub create_root: bool,
    /// Initialize a git repository in the root if none exists
    #[serde(default = "default_true")]
    pub git_init: bool,
    /// Remote used by git_push / git_pull
    #[serde(default = "default_git_remote")]
    pub git_remote: String,
    /// Commit author as "Name <email>"; repository config when unset
    #[serde(default)]
    pub git_author: Option<String>,
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("./workspace")
}

fn default_git_remote() -> String {
    "origin".to_string()
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_workspace_root(),
            create_root: true,
            git_init: true,
            git_remote: default_git_remote(),
            git_author: None,
        }
    }
}

/// SSE session settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Seconds between keep-alive frames on each open stream
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
    /// Buffered events per session before senders wait
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Maximum concurrently open streams
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn default_channel_capacity() -> usize {
    64
}

fn default_max_sessions() -> usize {
    100
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_secs(),
            channel_capacity: default_channel_capacity(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl SessionConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log output format: "pretty" or "json"
    /// Override with LOG_FORMAT env var
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter string
    /// Override with RUST_LOG env var
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable Prometheus metrics at GET /metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_level() -> String {
    "info,sandgate=debug".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            log_level: default_log_level(),
            metrics_enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Expand ~ to home directory in path
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
        Ok(home.join(rest))
    } else if s == "~" {
        dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))
    } else {
        Ok(path.to_path_buf())
    }
}

impl Config {
    /// Parse config from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.expand_paths()?;
        Ok(config)
    }

    /// Load config from file path, or create default
    pub fn load_or_create(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)?;
            Self::from_toml(&content)
        } else {
            let config = Config::default();
            // Try to save default config
            if let Some(parent) = config_path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            let _ = config.save(config_path);
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Expand ~ in all paths
    fn expand_paths(&mut self) -> Result<()> {
        self.workspace.root = expand_tilde(&self.workspace.root)?;
        Ok(())
    }
}
