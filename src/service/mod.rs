//! service
//!
//! The operation surface: one method per operation, each entered through
//! the repository binding and serialized against concurrent structural
//! work on the same `(application, branch)` key.
//!
//! # Architecture
//!
//! [`GitSyncService`] wires the collaborators together:
//!
//! - [`DocumentStore`] - application documents, bindings, branch records,
//!   git profiles
//! - [`ArtifactSerializer`] - application state <-> committed file tree
//! - [`CredentialResolver`] - remote credentials per application
//! - `core::lock` - per-key advisory locks + the repository file lock
//! - `git::GitWorkspace` - all Git reads and writes
//!
//! Operations are grouped by concern in submodules, all implemented on the
//! one service type: binding, branches, commits, sync, merge, profiles.
//!
//! # Atomicity
//!
//! Structural mutations perform their git work synchronously between await
//! points and roll back to the pre-operation snapshot on failure, so a
//! cancelled or failed operation never leaves a partially mutated tree.
//! The single exception is a conflicted `pull`, which intentionally leaves
//! the conflicted state in place for inspection.

mod binding;
mod branches;
mod commits;
mod merge;
mod profiles;
mod sync;

pub use binding::{BindingPatch, RemoteConfig};
pub use branches::{BranchListEntry, BranchSpec};
pub use commits::{CommitOutcome, CommitRecord, CommitSpec};
pub use merge::{BranchStatus, MergeSpec, MergeStatus};
pub use sync::{PullResult, PushSummary};

use std::sync::Arc;

use async_trait::async_trait;

use crate::artifact::{ArtifactSerializer, FileTree};
use crate::core::config::CoreConfig;
use crate::core::lock::{LockMode, LockRegistry, OperationGuard, RepoLock};
use crate::core::paths::WorkspacePaths;
use crate::core::types::{ApplicationId, BranchName, UserId};
use crate::error::SyncError;
use crate::git::{CommitAuthor, GitError, GitWorkspace, RemoteAuth};
use crate::store::{Application, DocumentStore, RepositoryBinding};

use branches::BranchListCache;

/// Supplies remote credentials for an application's configured remote.
///
/// Credential storage is an external concern; the resolver is the narrow
/// interface through which stored credentials reach push/pull/fetch.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Credentials for `application`'s remote at `remote_url`.
    async fn resolve(
        &self,
        application: &ApplicationId,
        remote_url: &str,
    ) -> Result<RemoteAuth, SyncError>;
}

/// Resolver returning the same credentials for every application.
#[derive(Debug, Clone)]
pub struct StaticCredentials(pub RemoteAuth);

#[async_trait]
impl CredentialResolver for StaticCredentials {
    async fn resolve(
        &self,
        _application: &ApplicationId,
        _remote_url: &str,
    ) -> Result<RemoteAuth, SyncError> {
        Ok(self.0.clone())
    }
}

/// Version-control integration for application definitions.
///
/// One service instance manages any number of connected applications; the
/// per-application working directories live under the configured workspace
/// root.
pub struct GitSyncService {
    store: Arc<dyn DocumentStore>,
    serializer: Arc<dyn ArtifactSerializer>,
    credentials: Arc<dyn CredentialResolver>,
    config: CoreConfig,
    paths: WorkspacePaths,
    locks: LockRegistry,
    branch_cache: BranchListCache,
}

impl GitSyncService {
    /// Create a service over the given collaborators.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `config` fails validation.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        serializer: Arc<dyn ArtifactSerializer>,
        credentials: Arc<dyn CredentialResolver>,
        config: CoreConfig,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        let paths = WorkspacePaths::new(config.workspace_root.clone());
        let locks = LockRegistry::new(config.lock_timeout());
        let branch_cache = BranchListCache::new(config.branch_cache_ttl());
        Ok(Self {
            store,
            serializer,
            credentials,
            config,
            paths,
            locks,
            branch_cache,
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    // =========================================================================
    // Internal plumbing shared by the operation modules
    // =========================================================================

    /// Binding of a connected default application.
    pub(crate) async fn require_binding(
        &self,
        application: &ApplicationId,
    ) -> Result<RepositoryBinding, SyncError> {
        self.store
            .binding(application)
            .await?
            .ok_or(SyncError::BindingNotFound(*application))
    }

    /// Open the working copy behind a binding.
    pub(crate) fn open_workspace(
        &self,
        binding: &RepositoryBinding,
    ) -> Result<GitWorkspace, SyncError> {
        Ok(GitWorkspace::open(
            &binding.local_path,
            &self.config.remote_name,
        )?)
    }

    /// Acquire the locks a structural mutation must hold: the per-key
    /// advisory lock, then the exclusive repository file lock.
    pub(crate) async fn structural_guard(
        &self,
        application: &ApplicationId,
        branch: &BranchName,
    ) -> Result<OperationGuard, SyncError> {
        let key = self.locks.acquire(application, branch).await?;
        let repo = RepoLock::acquire(&self.paths.lock_path(application), LockMode::Exclusive)?;
        Ok(OperationGuard::new(key, repo))
    }

    /// Acquire the shared repository lock for a tree-reading query.
    pub(crate) fn read_guard(&self, application: &ApplicationId) -> Result<RepoLock, SyncError> {
        Ok(RepoLock::acquire(
            &self.paths.lock_path(application),
            LockMode::Shared,
        )?)
    }

    /// The application document materializing `branch`.
    pub(crate) async fn branch_application(
        &self,
        binding: &RepositoryBinding,
        branch: &BranchName,
    ) -> Result<Application, SyncError> {
        let record = self
            .store
            .branch_record(&binding.application, branch)
            .await?
            .ok_or_else(|| SyncError::BranchNotFound(branch.to_string()))?;
        Ok(self.store.application(&record.application).await?)
    }

    /// Commit author for `user`, resolved through the identity store.
    pub(crate) async fn resolve_author(
        &self,
        user: &UserId,
        application: Option<&ApplicationId>,
    ) -> Result<CommitAuthor, SyncError> {
        let profile = self.resolve_profile(user, application).await?;
        Ok(CommitAuthor {
            name: profile.author_name,
            email: profile.author_email,
        })
    }

    /// Export application state through the serializer boundary.
    pub(crate) async fn export_state(
        &self,
        state: &crate::artifact::ApplicationState,
    ) -> Result<FileTree, SyncError> {
        Ok(self.serializer.export(state).await?)
    }

    /// Whether the branch's artifact diverges from its last commit.
    pub(crate) async fn artifact_dirty(
        &self,
        workspace: &GitWorkspace,
        branch: &BranchName,
        state: &crate::artifact::ApplicationState,
    ) -> Result<bool, SyncError> {
        let exported = self.export_state(state).await?;
        match workspace.try_branch_tip(branch)? {
            Some(tip) => Ok(exported != workspace.tree_snapshot(&tip)?),
            None => Ok(!exported.is_empty()),
        }
    }

    /// Make sure the working copy has `branch` checked out.
    pub(crate) fn ensure_checked_out(
        &self,
        workspace: &GitWorkspace,
        branch: &BranchName,
    ) -> Result<(), SyncError> {
        if workspace.current_branch()?.as_ref() != Some(branch) {
            workspace.checkout_branch(branch)?;
        }
        Ok(())
    }

    /// Re-import a branch tip into its application document after the tree
    /// changed underneath it (checkout, pull, merge).
    pub(crate) async fn reimport_branch_document(
        &self,
        workspace: &GitWorkspace,
        binding: &RepositoryBinding,
        branch: &BranchName,
    ) -> Result<Application, SyncError> {
        let tip = workspace.branch_tip(branch)?;
        let tree = workspace.tree_snapshot(&tip)?;
        let state = self.serializer.import(&tree).await?;

        let mut doc = self.branch_application(binding, branch).await?;
        doc.state = state;
        Ok(self.store.put_application(doc).await?)
    }

    /// Remote credentials for a binding.
    pub(crate) async fn remote_auth(
        &self,
        binding: &RepositoryBinding,
    ) -> Result<RemoteAuth, SyncError> {
        self.credentials
            .resolve(&binding.application, &binding.remote_url)
            .await
    }

    /// Drop cached branch listings for an application.
    pub(crate) fn invalidate_branch_cache(&self, application: &ApplicationId) {
        self.branch_cache.invalidate(application);
    }

    pub(crate) fn io_error(message: String) -> SyncError {
        SyncError::Git(GitError::Io { message })
    }
}
