//! core::lock
//!
//! Mutual exclusion for repository operations.
//!
//! # Architecture
//!
//! Two layers guard the single working directory behind each binding:
//!
//! 1. [`LockRegistry`] - in-process advisory locks keyed by
//!    `(application, branch)`. Structural operations (commit, checkout,
//!    push, pull, merge) hold the key for their whole duration; a second
//!    caller waits up to a bounded timeout and then observes `Busy`.
//! 2. [`RepoLock`] - an OS-level file lock shared across processes,
//!    exclusive for structural operations and shared for tree-reading
//!    queries. Because every branch of an application shares one working
//!    directory, the exclusive mode also serializes cross-branch mutations.
//!
//! # Invariants
//!
//! - A lock is held for the entire operation and released on completion or
//!   failure (RAII guards)
//! - Acquisition never blocks unboundedly: the registry waits up to the
//!   configured timeout, the file lock fails fast
//! - Timeouts and contention surface as [`LockError::Busy`], a signal to
//!   retry later rather than a permanent failure

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::core::types::{ApplicationId, BranchName};

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another operation is already in flight for this key or repository.
    #[error("operation already in flight for {key}")]
    Busy {
        /// Human-readable description of the contended key
        key: String,
    },

    /// Failed to create the lock file or its parent directory.
    #[error("failed to create lock: {0}")]
    CreateFailed(String),

    /// Failed to acquire the OS-level lock.
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(String),
}

/// Key identifying one branch of one connected application.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey {
    pub application: ApplicationId,
    pub branch: BranchName,
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.application, self.branch)
    }
}

/// In-process advisory locks keyed by `(application, branch)`.
///
/// The registry hands out [`OwnedMutexGuard`]s so guards can be held across
/// await points for the duration of an operation. Mutexes are created lazily
/// per key and never removed; the key space is bounded by the number of
/// live branches.
#[derive(Debug)]
pub struct LockRegistry {
    keys: StdMutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
    timeout: Duration,
}

impl LockRegistry {
    /// Create a registry whose `acquire` waits up to `timeout` per key.
    pub fn new(timeout: Duration) -> Self {
        Self {
            keys: StdMutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Acquire the advisory lock for `(application, branch)`.
    ///
    /// Waits up to the configured timeout for an in-flight operation on the
    /// same key to finish.
    ///
    /// # Errors
    ///
    /// - [`LockError::Busy`] if the key is still held when the timeout
    ///   elapses
    pub async fn acquire(
        &self,
        application: &ApplicationId,
        branch: &BranchName,
    ) -> Result<OwnedMutexGuard<()>, LockError> {
        let key = LockKey {
            application: *application,
            branch: branch.clone(),
        };
        let mutex = {
            let mut keys = self.keys.lock().expect("lock registry poisoned");
            Arc::clone(keys.entry(key.clone()).or_default())
        };

        tokio::time::timeout(self.timeout, mutex.lock_owned())
            .await
            .map_err(|_| LockError::Busy {
                key: key.to_string(),
            })
    }
}

/// Lock mode for the repository file lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Exclusive access for structural mutations.
    Exclusive,
    /// Shared access for tree-reading queries.
    Shared,
}

/// An OS-level lock on a connected repository's working directory.
///
/// Released automatically when the guard is dropped, so the lock cannot
/// outlive the operation even on panic.
#[derive(Debug)]
pub struct RepoLock {
    path: PathBuf,
    file: Option<File>,
}

impl RepoLock {
    /// Attempt to acquire the repository lock at `path` in the given mode.
    ///
    /// Acquisition is non-blocking; contention surfaces immediately as
    /// [`LockError::Busy`]. The lock file's parent directory is created on
    /// demand.
    pub fn acquire(path: &Path, mode: LockMode) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                LockError::CreateFailed(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| {
                LockError::CreateFailed(format!("cannot open {}: {}", path.display(), e))
            })?;

        let locked = match mode {
            LockMode::Exclusive => fs2::FileExt::try_lock_exclusive(&file),
            LockMode::Shared => fs2::FileExt::try_lock_shared(&file),
        };

        match locked {
            Ok(()) => Ok(Self {
                path: path.to_path_buf(),
                file: Some(file),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(LockError::Busy {
                key: path.display().to_string(),
            }),
            Err(e) => Err(LockError::AcquireFailed(e.to_string())),
        }
    }

    /// Whether this guard still holds the lock.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock before the guard goes out of scope.
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Guard held by a structural operation: the per-key advisory lock plus the
/// exclusive repository file lock. Dropping it releases both.
#[derive(Debug)]
pub struct OperationGuard {
    _key: OwnedMutexGuard<()>,
    _repo: RepoLock,
}

impl OperationGuard {
    pub(crate) fn new(key: OwnedMutexGuard<()>, repo: RepoLock) -> Self {
        Self { _key: key, _repo: repo }
    }
}
