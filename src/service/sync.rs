//! service::sync
//!
//! Remote synchronization: push and pull.
//!
//! Pull never silently drops local work: under the default auto-stage
//! policy, pending artifact edits are committed before remote changes are
//! merged in; under the reject-dirty policy the pull is refused instead.
//! A conflicted auto-merge leaves the working tree in its conflicted,
//! inspectable state and reports the conflicting paths.

use crate::core::config::PullPolicy;
use crate::core::types::{ApplicationId, BranchName, Oid};
use crate::error::SyncError;
use crate::git::{MergeOutcome, SyncTarget};

use super::merge::MergeStatus;
use super::GitSyncService;

/// Result of a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushSummary {
    /// The pushed branch
    pub branch: BranchName,
    /// The new remote tip
    pub remote_tip: Oid,
}

/// Result of a pull or merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullResult {
    /// Merge outcome, including conflicting paths when not mergeable
    pub merge_status: MergeStatus,
    /// Whether the branch pointer was advanced without a merge commit
    pub is_rebased: bool,
    /// Human-readable progress notes
    pub messages: Vec<String>,
}

impl GitSyncService {
    /// Push a branch to the configured remote.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NonFastForward`] when the remote diverged; pull first
    /// - [`SyncError::AuthFailed`] / [`SyncError::NetworkError`] (retryable)
    /// - [`SyncError::BranchNotFound`]
    pub async fn push(
        &self,
        application: &ApplicationId,
        branch: &BranchName,
    ) -> Result<PushSummary, SyncError> {
        let binding = self.require_binding(application).await?;
        let _guard = self.structural_guard(application, branch).await?;

        let workspace = self.open_workspace(&binding)?;
        if workspace.try_branch_tip(branch)?.is_none() {
            return Err(SyncError::BranchNotFound(branch.to_string()));
        }

        let auth = self.remote_auth(&binding).await?;
        let tip = workspace.push(branch, &auth)?;
        self.mark_synced(application, branch, tip.clone()).await?;
        self.invalidate_branch_cache(application);

        Ok(PushSummary {
            branch: branch.clone(),
            remote_tip: tip,
        })
    }

    /// Pull remote changes into a local branch.
    ///
    /// Fetches the remote, then fast-forwards or auto-merges the remote
    /// tip into the branch. On a clean result the branch document is
    /// re-imported from the merged tree. On conflicts the tree is left
    /// conflicted for inspection and the conflicting paths are reported
    /// with `merge_status.is_mergeable == false`; resolve before further
    /// commits.
    ///
    /// # Errors
    ///
    /// - [`SyncError::UncommittedChanges`] under [`PullPolicy::RejectDirty`]
    /// - [`SyncError::BranchNotFound`]
    /// - [`SyncError::AuthFailed`] / [`SyncError::NetworkError`] (retryable)
    pub async fn pull(
        &self,
        application: &ApplicationId,
        branch: &BranchName,
    ) -> Result<PullResult, SyncError> {
        let binding = self.require_binding(application).await?;
        let _guard = self.structural_guard(application, branch).await?;
        self.invalidate_branch_cache(application);

        let workspace = self.open_workspace(&binding)?;
        if workspace.try_branch_tip(branch)?.is_none() {
            return Err(SyncError::BranchNotFound(branch.to_string()));
        }
        self.ensure_checked_out(&workspace, branch)?;

        let mut messages = Vec::new();

        // Dirty-tree policy: stage first or refuse
        match self.config.pull_policy {
            PullPolicy::AutoStage => {
                if let Some(tip) = self
                    .stage_pending_changes(
                        &workspace,
                        &binding,
                        branch,
                        "Auto-commit of pending changes before pull",
                    )
                    .await?
                {
                    messages.push(format!(
                        "Committed pending local changes as {}",
                        tip.short(7)
                    ));
                }
            }
            PullPolicy::RejectDirty => {
                let doc = self.branch_application(&binding, branch).await?;
                if self.artifact_dirty(&workspace, branch, &doc.state).await? {
                    return Err(SyncError::UncommittedChanges {
                        branch: branch.to_string(),
                    });
                }
            }
        }

        let auth = self.remote_auth(&binding).await?;
        workspace.fetch(&auth)?;

        let Some(remote_tip) = workspace.remote_tip(branch)? else {
            messages.push("Remote has no counterpart for this branch".into());
            return Ok(PullResult {
                merge_status: MergeStatus::clean(0, 0),
                is_rebased: false,
                messages,
            });
        };

        let local_tip = workspace.branch_tip(branch)?;
        let (ahead, behind) = workspace.ahead_behind(&local_tip, &remote_tip)?;

        match workspace.analyze(&remote_tip)? {
            SyncTarget::UpToDate => {
                messages.push("Already up to date".into());
                Ok(PullResult {
                    merge_status: MergeStatus::clean(ahead, 0),
                    is_rebased: false,
                    messages,
                })
            }
            SyncTarget::FastForward => {
                workspace.fast_forward(branch, &remote_tip)?;
                self.reimport_branch_document(&workspace, &binding, branch)
                    .await?;
                self.mark_synced(application, branch, remote_tip.clone())
                    .await?;
                messages.push(format!("Fast-forwarded to {}", remote_tip.short(7)));
                Ok(PullResult {
                    merge_status: MergeStatus::clean(ahead, behind),
                    is_rebased: true,
                    messages,
                })
            }
            SyncTarget::MergeRequired => {
                let author = self
                    .resolve_author(&binding.connected_by, Some(application))
                    .await?;
                let outcome = workspace
                    .merge_into_head(
                        &remote_tip,
                        &author,
                        &format!("Merge remote changes into {branch}"),
                    )
                    .map_err(|e| {
                        // Failures other than conflicts must not leave a
                        // half-applied merge behind
                        let _ = workspace.abort_merge(&local_tip);
                        SyncError::from(e)
                    })?;

                match outcome {
                    MergeOutcome::Clean { commit } => {
                        self.reimport_branch_document(&workspace, &binding, branch)
                            .await?;
                        messages.push(format!(
                            "Merged remote changes as {}",
                            commit.short(7)
                        ));
                        Ok(PullResult {
                            merge_status: MergeStatus::clean(ahead, behind),
                            is_rebased: false,
                            messages,
                        })
                    }
                    MergeOutcome::Conflicts { paths } => {
                        messages.push(
                            "Merge conflicts must be resolved before further commits".into(),
                        );
                        Ok(PullResult {
                            merge_status: MergeStatus::conflicted(paths, ahead, behind),
                            is_rebased: false,
                            messages,
                        })
                    }
                }
            }
        }
    }
}
