//! service::commits
//!
//! Commit creation and history retrieval.
//!
//! A commit exports the branch document's state through the serializer,
//! stages the working tree, and compares the staged tree with HEAD: an
//! unchanged tree is a soft no-op unless the caller allows empty commits.
//! Failures after the tree was touched roll the worktree back to the
//! pre-operation snapshot.

use chrono::{DateTime, Utc};

use crate::core::types::{ApplicationId, BranchName, Oid, UserId};
use crate::error::SyncError;
use crate::git::GitWorkspace;

use super::GitSyncService;

/// Parameters for a commit.
#[derive(Debug, Clone)]
pub struct CommitSpec {
    /// Commit message
    pub message: String,
    /// The committing user, resolved through the identity store
    pub author: UserId,
    /// Create the commit even when nothing changed
    pub allow_empty: bool,
    /// Push the branch after a successful commit
    pub do_push: bool,
}

/// Result of a commit operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A commit was created.
    Committed(Oid),
    /// Nothing changed and empty commits were not allowed.
    NoChanges,
}

impl CommitOutcome {
    /// The created commit, if any.
    pub fn commit(&self) -> Option<&Oid> {
        match self {
            CommitOutcome::Committed(oid) => Some(oid),
            CommitOutcome::NoChanges => None,
        }
    }
}

/// One commit in a branch's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    /// Commit hash
    pub hash: Oid,
    /// Author name
    pub author_name: String,
    /// Author email
    pub author_email: String,
    /// Full commit message
    pub message: String,
    /// Commit timestamp
    pub committed_at: DateTime<Utc>,
    /// The branch this history was read from
    pub branch: BranchName,
}

impl GitSyncService {
    /// Commit the branch document's current state.
    ///
    /// # Errors
    ///
    /// - [`SyncError::BranchNotFound`]
    /// - [`SyncError::ProfileNotConfigured`] without a commit identity
    /// - [`SyncError::Serialization`] when export fails
    pub async fn commit(
        &self,
        spec: CommitSpec,
        application: &ApplicationId,
        branch: &BranchName,
    ) -> Result<CommitOutcome, SyncError> {
        let binding = self.require_binding(application).await?;
        let _guard = self.structural_guard(application, branch).await?;
        self.invalidate_branch_cache(application);

        let workspace = self.open_workspace(&binding)?;
        if workspace.try_branch_tip(branch)?.is_none() {
            return Err(SyncError::BranchNotFound(branch.to_string()));
        }
        self.ensure_checked_out(&workspace, branch)?;

        let doc = self.branch_application(&binding, branch).await?;
        let author = self.resolve_author(&spec.author, Some(application)).await?;
        let tree = self.export_state(&doc.state).await?;

        // The mutating window is synchronous; on failure the worktree is
        // restored to the pre-operation snapshot
        let snapshot = workspace.head_oid()?;
        let outcome = (|| {
            workspace.materialize(&tree)?;
            let staged = workspace.stage_all()?;
            if !spec.allow_empty && workspace.head_tree_id()?.as_ref() == Some(&staged) {
                return Ok(None);
            }
            workspace.commit_staged(&author, &spec.message).map(Some)
        })();

        let committed = match outcome {
            Ok(result) => result,
            Err(e) => {
                if let Some(snapshot) = &snapshot {
                    let _ = workspace.reset_hard(snapshot);
                }
                return Err(e.into());
            }
        };

        let Some(committed) = committed else {
            return Ok(CommitOutcome::NoChanges);
        };

        if spec.do_push {
            let auth = self.remote_auth(&binding).await?;
            let tip = workspace.push(branch, &auth)?;
            self.mark_synced(application, branch, tip).await?;
        }

        Ok(CommitOutcome::Committed(committed))
    }

    /// Commit history of a branch, newest first.
    ///
    /// Unbounded; pagination is the caller's concern.
    ///
    /// # Errors
    ///
    /// - [`SyncError::BranchNotFound`]
    pub async fn history(
        &self,
        application: &ApplicationId,
        branch: &BranchName,
    ) -> Result<Vec<CommitRecord>, SyncError> {
        let binding = self.require_binding(application).await?;
        let _read = self.read_guard(application)?;

        let workspace = self.open_workspace(&binding)?;
        let commits = workspace.history(branch)?;

        Ok(commits
            .into_iter()
            .map(|info| CommitRecord {
                hash: info.oid,
                author_name: info.author_name,
                author_email: info.author_email,
                message: info.message,
                committed_at: info.committed_at,
                branch: branch.clone(),
            })
            .collect())
    }

    /// Record a branch's tip as synchronized with the remote.
    pub(crate) async fn mark_synced(
        &self,
        application: &ApplicationId,
        branch: &BranchName,
        tip: Oid,
    ) -> Result<(), SyncError> {
        if let Some(mut record) = self.store.branch_record(application, branch).await? {
            record.last_synced_commit = Some(tip);
            self.store.put_branch_record(record).await?;
        }
        Ok(())
    }

    /// Commit pending artifact changes with a service-generated message.
    ///
    /// Used by pull under the auto-stage policy. Returns the new tip when a
    /// commit was created.
    pub(crate) async fn stage_pending_changes(
        &self,
        workspace: &GitWorkspace,
        binding: &crate::store::RepositoryBinding,
        branch: &BranchName,
        message: &str,
    ) -> Result<Option<Oid>, SyncError> {
        let doc = self.branch_application(binding, branch).await?;
        if !self.artifact_dirty(workspace, branch, &doc.state).await? {
            return Ok(None);
        }

        let author = self
            .resolve_author(&binding.connected_by, Some(&binding.application))
            .await?;
        let tree = self.export_state(&doc.state).await?;

        let snapshot = workspace.head_oid()?;
        let result = (|| {
            workspace.materialize(&tree)?;
            let staged = workspace.stage_all()?;
            if workspace.head_tree_id()?.as_ref() == Some(&staged) {
                return Ok(None);
            }
            workspace.commit_staged(&author, message).map(Some)
        })();

        match result {
            Ok(oid) => Ok(oid),
            Err(e) => {
                if let Some(snapshot) = &snapshot {
                    let _ = workspace.reset_hard(snapshot);
                }
                Err(e.into())
            }
        }
    }
}
