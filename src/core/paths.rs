//! core::paths
//!
//! Centralized path routing for gitloom storage locations.
//!
//! # Storage Layout
//!
//! All managed state lives under a single workspace root:
//!
//! - `<root>/repos/<application-id>/` - working copy of a connected repository
//! - `<root>/locks/<application-id>.lock` - repository lock file
//!
//! Lock files live outside the working copy so that `detach` can delete the
//! working directory while the lock is still held.
//!
//! No code outside this module may compute these paths by hand.
//!
//! # Example
//!
//! ```
//! use gitloom::core::paths::WorkspacePaths;
//! use gitloom::core::types::ApplicationId;
//! use std::path::PathBuf;
//!
//! let paths = WorkspacePaths::new(PathBuf::from("/var/lib/gitloom"));
//! let app = ApplicationId::generate();
//! assert!(paths.workdir(&app).starts_with("/var/lib/gitloom/repos"));
//! assert!(paths.lock_path(&app).starts_with("/var/lib/gitloom/locks"));
//! ```

use std::path::{Path, PathBuf};

use crate::core::types::ApplicationId;

/// Path routing for the workspace root owned by the core.
///
/// One working directory per connected default application; all branches of
/// that application share it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    root: PathBuf,
}

impl WorkspacePaths {
    /// Create path routing rooted at `root`.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// The workspace root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding all working copies.
    pub fn repos_dir(&self) -> PathBuf {
        self.root.join("repos")
    }

    /// Working copy for a connected default application.
    pub fn workdir(&self, application: &ApplicationId) -> PathBuf {
        self.repos_dir().join(application.to_string())
    }

    /// Directory holding repository lock files.
    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    /// Lock file for a connected default application.
    pub fn lock_path(&self, application: &ApplicationId) -> PathBuf {
        self.locks_dir().join(format!("{application}.lock"))
    }
}
