//! Service-level error taxonomy.
//!
//! Every operation on [`crate::service::GitSyncService`] returns
//! [`SyncError`] on failure. [`SyncError::kind`] buckets errors the way
//! callers react to them:
//!
//! - [`ErrorKind::NotFound`] - binding/branch/profile/application absent
//! - [`ErrorKind::Conflict`] - merge/checkout/push conflicts; recoverable
//!   with caller action
//! - [`ErrorKind::AuthOrNetwork`] - remote unreachable or rejected; retryable
//! - [`ErrorKind::InvalidState`] - caller logic error (connect twice,
//!   detach unconnected, delete the default branch)
//! - [`ErrorKind::Serialization`] - artifact export/import failure; fatal
//!   for the operation, not for the repository
//! - [`ErrorKind::Busy`] - an operation is already in flight; retry later
//! - [`ErrorKind::Internal`] - unclassified failures

use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::core::config::ConfigError;
use crate::core::lock::LockError;
use crate::core::types::{ApplicationId, TypeError};
use crate::git::GitError;
use crate::store::StoreError;

/// Error bucket determining how callers should react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    AuthOrNetwork,
    InvalidState,
    Serialization,
    Busy,
    Internal,
}

/// Errors from service operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Application is not connected to a repository.
    #[error("no repository binding for application {0}")]
    BindingNotFound(ApplicationId),

    /// Application is already connected.
    #[error("application {0} is already connected to a repository")]
    AlreadyConnected(ApplicationId),

    /// Branch does not exist.
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// Source branch of a branch-create does not exist.
    #[error("source branch not found: {0}")]
    SourceBranchNotFound(String),

    /// Branch already exists.
    #[error("branch already exists: {0}")]
    BranchAlreadyExists(String),

    /// No commit identity configured for the user.
    #[error("no git profile configured for user {0}")]
    ProfileNotConfigured(String),

    /// Operation would silently discard uncommitted artifact changes.
    #[error("uncommitted changes on branch {branch} would be discarded")]
    UncommittedChanges {
        /// The dirty branch
        branch: String,
    },

    /// Push rejected because the remote branch has diverged.
    #[error("push rejected for {0}: remote has diverged, pull first")]
    NonFastForward(String),

    /// Remote rejected the supplied credentials.
    #[error("remote authentication failed: {0}")]
    AuthFailed(String),

    /// Remote could not be reached.
    #[error("remote unreachable: {0}")]
    RemoteUnreachable(String),

    /// Network failure mid-transfer; retry without re-connecting.
    #[error("network error: {0}")]
    NetworkError(String),

    /// Caller logic error.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Artifact export/import failure.
    #[error("artifact serialization failed: {0}")]
    Serialization(String),

    /// An operation is already in flight for this key.
    #[error("operation already in flight: {0}")]
    Busy(String),

    /// Underlying git failure that maps to no specific variant.
    #[error(transparent)]
    Git(GitError),

    /// Document-store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Validation failure on an identifier.
    #[error(transparent)]
    Type(#[from] TypeError),

    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SyncError {
    /// The taxonomy bucket for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::BindingNotFound(_)
            | SyncError::BranchNotFound(_)
            | SyncError::SourceBranchNotFound(_)
            | SyncError::ProfileNotConfigured(_) => ErrorKind::NotFound,

            SyncError::UncommittedChanges { .. } | SyncError::NonFastForward(_) => {
                ErrorKind::Conflict
            }

            SyncError::AuthFailed(_)
            | SyncError::RemoteUnreachable(_)
            | SyncError::NetworkError(_) => ErrorKind::AuthOrNetwork,

            SyncError::AlreadyConnected(_)
            | SyncError::BranchAlreadyExists(_)
            | SyncError::InvalidState(_) => ErrorKind::InvalidState,

            SyncError::Serialization(_) => ErrorKind::Serialization,

            SyncError::Busy(_) => ErrorKind::Busy,

            SyncError::Git(git) => match git {
                GitError::Auth { .. }
                | GitError::Network { .. }
                | GitError::RemoteUnreachable { .. } => ErrorKind::AuthOrNetwork,
                GitError::NonFastForward { .. } => ErrorKind::Conflict,
                GitError::BranchNotFound { .. } | GitError::RefNotFound { .. } => {
                    ErrorKind::NotFound
                }
                GitError::BranchExists { .. } => ErrorKind::InvalidState,
                _ => ErrorKind::Internal,
            },

            SyncError::Store(StoreError::NotFound { .. }) => ErrorKind::NotFound,
            SyncError::Store(_) => ErrorKind::Internal,

            SyncError::Type(_) | SyncError::Config(_) => ErrorKind::InvalidState,
        }
    }

    /// Whether the caller may retry the operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::AuthOrNetwork | ErrorKind::Busy)
    }
}

impl From<GitError> for SyncError {
    fn from(err: GitError) -> Self {
        // Lift the variants the surface names; everything else stays a git
        // error classified by kind()
        match err {
            GitError::Auth { message } => SyncError::AuthFailed(message),
            GitError::RemoteUnreachable { message } => SyncError::RemoteUnreachable(message),
            GitError::Network { message } => SyncError::NetworkError(message),
            GitError::NonFastForward { branch } => SyncError::NonFastForward(branch),
            GitError::BranchNotFound { branch } => SyncError::BranchNotFound(branch),
            other => SyncError::Git(other),
        }
    }
}

impl From<LockError> for SyncError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Busy { key } => SyncError::Busy(key),
            other => SyncError::InvalidState(other.to_string()),
        }
    }
}

impl From<ArtifactError> for SyncError {
    fn from(err: ArtifactError) -> Self {
        SyncError::Serialization(err.to_string())
    }
}
