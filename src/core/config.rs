//! core::config
//!
//! Crate configuration schema and IO.
//!
//! # Schema
//!
//! ```toml
//! workspace_root = "/var/lib/gitloom"
//! pull_policy = "auto-stage"
//! lock_timeout_ms = 5000
//! branch_cache_ttl_secs = 120
//! remote_name = "origin"
//! ```
//!
//! All fields have defaults; values are validated after parsing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from configuration handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ParseFailed(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// What `pull` does when the branch's artifact has edits that are not yet
/// committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullPolicy {
    /// Commit pending artifact edits first, then merge remote changes.
    /// Local work is never silently dropped.
    #[default]
    AutoStage,

    /// Refuse the pull while pending edits exist.
    RejectDirty,
}

/// Core configuration.
///
/// # Example
///
/// ```
/// use gitloom::core::config::{CoreConfig, PullPolicy};
/// use std::path::PathBuf;
///
/// let config = CoreConfig::with_root(PathBuf::from("/tmp/gitloom"));
/// assert_eq!(config.pull_policy, PullPolicy::AutoStage);
/// assert_eq!(config.remote_name, "origin");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// Root directory for working copies and lock files.
    pub workspace_root: PathBuf,

    /// Dirty-tree policy for `pull`.
    pub pull_policy: PullPolicy,

    /// How long a structural operation waits for an in-flight operation on
    /// the same `(application, branch)` key before reporting `Busy`.
    pub lock_timeout_ms: u64,

    /// Branch-list cache lifetime.
    pub branch_cache_ttl_secs: u64,

    /// Name used for the configured remote.
    pub remote_name: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("gitloom-data"),
            pull_policy: PullPolicy::default(),
            lock_timeout_ms: 5_000,
            branch_cache_ttl_secs: 120,
            remote_name: "origin".to_string(),
        }
    }
}

impl CoreConfig {
    /// Default configuration rooted at `root`.
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            workspace_root: root,
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self =
            toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workspace_root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("workspace_root cannot be empty".into()));
        }
        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::Invalid("lock_timeout_ms must be positive".into()));
        }
        if self.remote_name.is_empty() {
            return Err(ConfigError::Invalid("remote_name cannot be empty".into()));
        }
        Ok(())
    }

    /// Lock acquisition timeout as a `Duration`.
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Branch-list cache TTL as a `Duration`.
    pub fn branch_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.branch_cache_ttl_secs)
    }
}
