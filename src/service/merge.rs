//! service::merge
//!
//! Merge evaluation: dry-run mergeability, the actual merge, and branch
//! status.
//!
//! The mergeability check is a read-only three-way comparison (common
//! ancestor, source tip, destination tip) computed entirely in memory;
//! neither the working tree nor any ref moves. The actual merge is
//! all-or-nothing: conflicts abort it and restore the pre-merge state.

use crate::core::types::{ApplicationId, BranchName};
use crate::error::SyncError;
use crate::git::{MergeOutcome, SyncTarget};

use super::sync::PullResult;
use super::GitSyncService;

/// Outcome of a mergeability evaluation. Computed, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeStatus {
    /// Whether the merge would apply without conflicts
    pub is_mergeable: bool,
    /// Conflicting paths, sorted; empty when mergeable
    pub conflicting_files: Vec<String>,
    /// Commits on the source side only
    pub ahead_by: usize,
    /// Commits on the destination side only
    pub behind_by: usize,
}

impl MergeStatus {
    pub(crate) fn clean(ahead_by: usize, behind_by: usize) -> Self {
        Self {
            is_mergeable: true,
            conflicting_files: Vec::new(),
            ahead_by,
            behind_by,
        }
    }

    pub(crate) fn conflicted(
        conflicting_files: Vec<String>,
        ahead_by: usize,
        behind_by: usize,
    ) -> Self {
        Self {
            is_mergeable: false,
            conflicting_files,
            ahead_by,
            behind_by,
        }
    }
}

/// Parameters for a branch merge.
#[derive(Debug, Clone)]
pub struct MergeSpec {
    /// Branch whose commits are merged
    pub source: BranchName,
    /// Branch receiving the merge
    pub destination: BranchName,
}

/// Status of one branch relative to its last commit and remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchStatus {
    /// Serialized paths that differ between the live artifact and the last
    /// commit
    pub modified_resources: Vec<String>,
    /// Local commits the remote lacks
    pub ahead_by: usize,
    /// Remote commits the local branch lacks
    pub behind_by: usize,
    /// No artifact changes pending
    pub is_clean: bool,
}

impl GitSyncService {
    /// Predict whether `source` can merge into `destination` cleanly.
    ///
    /// Pure dry run: re-reading both tips after the call observes them
    /// unchanged.
    ///
    /// # Errors
    ///
    /// - [`SyncError::BranchNotFound`] for either branch
    pub async fn is_branch_mergeable(
        &self,
        application: &ApplicationId,
        source: &BranchName,
        destination: &BranchName,
    ) -> Result<MergeStatus, SyncError> {
        let binding = self.require_binding(application).await?;
        let _read = self.read_guard(application)?;
        let workspace = self.open_workspace(&binding)?;

        let source_tip = workspace
            .try_branch_tip(source)?
            .ok_or_else(|| SyncError::BranchNotFound(source.to_string()))?;
        let dest_tip = workspace
            .try_branch_tip(destination)?
            .ok_or_else(|| SyncError::BranchNotFound(destination.to_string()))?;

        let (ahead, behind) = workspace.ahead_behind(&source_tip, &dest_tip)?;

        if workspace.is_ancestor(&source_tip, &dest_tip)? {
            // Nothing to merge
            return Ok(MergeStatus::clean(0, behind));
        }

        let preview = workspace.merge_preview(&source_tip, &dest_tip)?;
        Ok(if preview.is_clean() {
            MergeStatus::clean(ahead, behind)
        } else {
            MergeStatus::conflicted(preview.conflicting, ahead, behind)
        })
    }

    /// Merge `source` into `destination`, committing the result if clean.
    ///
    /// All-or-nothing: on conflicts the merge is aborted, the destination
    /// tip and working tree are exactly as before the call, and the
    /// conflicting paths are reported with `is_mergeable == false`. A
    /// clean merge re-imports the destination's application document from
    /// the merged tree.
    ///
    /// # Errors
    ///
    /// - [`SyncError::BranchNotFound`] for either branch
    /// - [`SyncError::UncommittedChanges`] when the destination artifact
    ///   has pending edits
    pub async fn merge_branch(
        &self,
        application: &ApplicationId,
        spec: MergeSpec,
    ) -> Result<PullResult, SyncError> {
        let binding = self.require_binding(application).await?;
        let _guard = self
            .structural_guard(application, &spec.destination)
            .await?;
        self.invalidate_branch_cache(application);

        let workspace = self.open_workspace(&binding)?;
        let source_tip = workspace
            .try_branch_tip(&spec.source)?
            .ok_or_else(|| SyncError::BranchNotFound(spec.source.to_string()))?;
        let dest_tip = workspace
            .try_branch_tip(&spec.destination)?
            .ok_or_else(|| SyncError::BranchNotFound(spec.destination.to_string()))?;

        let dest_doc = self.branch_application(&binding, &spec.destination).await?;
        if self
            .artifact_dirty(&workspace, &spec.destination, &dest_doc.state)
            .await?
        {
            return Err(SyncError::UncommittedChanges {
                branch: spec.destination.to_string(),
            });
        }

        self.ensure_checked_out(&workspace, &spec.destination)?;
        let (ahead, behind) = workspace.ahead_behind(&source_tip, &dest_tip)?;
        let mut messages = Vec::new();

        if workspace.is_ancestor(&source_tip, &dest_tip)? {
            messages.push("Already up to date".into());
            return Ok(PullResult {
                merge_status: MergeStatus::clean(0, behind),
                is_rebased: false,
                messages,
            });
        }

        if workspace.analyze(&source_tip)? == SyncTarget::FastForward {
            workspace.fast_forward(&spec.destination, &source_tip)?;
            self.reimport_branch_document(&workspace, &binding, &spec.destination)
                .await?;
            messages.push(format!(
                "Fast-forwarded {} to {}",
                spec.destination,
                source_tip.short(7)
            ));
            return Ok(PullResult {
                merge_status: MergeStatus::clean(ahead, behind),
                is_rebased: true,
                messages,
            });
        }

        let author = self
            .resolve_author(&binding.connected_by, Some(application))
            .await?;
        let outcome = workspace
            .merge_into_head(
                &source_tip,
                &author,
                &format!("Merge branch '{}' into {}", spec.source, spec.destination),
            )
            .map_err(|e| {
                let _ = workspace.abort_merge(&dest_tip);
                SyncError::from(e)
            })?;

        match outcome {
            MergeOutcome::Clean { commit } => {
                self.reimport_branch_document(&workspace, &binding, &spec.destination)
                    .await?;
                messages.push(format!(
                    "Merged {} into {} as {}",
                    spec.source,
                    spec.destination,
                    commit.short(7)
                ));
                Ok(PullResult {
                    merge_status: MergeStatus::clean(ahead, behind),
                    is_rebased: false,
                    messages,
                })
            }
            MergeOutcome::Conflicts { paths } => {
                workspace.abort_merge(&dest_tip)?;
                messages.push(format!(
                    "Merge of {} into {} aborted: conflicts",
                    spec.source, spec.destination
                ));
                Ok(PullResult {
                    merge_status: MergeStatus::conflicted(paths, ahead, behind),
                    is_rebased: false,
                    messages,
                })
            }
        }
    }

    /// Status of a branch: pending artifact changes and remote divergence.
    ///
    /// Compares the exported artifact with the branch's last commit and the
    /// branch tip with its remote-tracking ref; the working tree is not
    /// touched.
    ///
    /// # Errors
    ///
    /// - [`SyncError::BranchNotFound`]
    pub async fn status(
        &self,
        application: &ApplicationId,
        branch: &BranchName,
    ) -> Result<BranchStatus, SyncError> {
        let binding = self.require_binding(application).await?;
        let _read = self.read_guard(application)?;
        let workspace = self.open_workspace(&binding)?;

        let tip = workspace
            .try_branch_tip(branch)?
            .ok_or_else(|| SyncError::BranchNotFound(branch.to_string()))?;

        let doc = self.branch_application(&binding, branch).await?;
        let exported = self.export_state(&doc.state).await?;
        let committed = workspace.tree_snapshot(&tip)?;
        let modified = exported.changed_paths(&committed);

        let (ahead_by, behind_by) = match workspace.remote_tip(branch)? {
            Some(remote_tip) => workspace.ahead_behind(&tip, &remote_tip)?,
            None => (0, 0),
        };

        Ok(BranchStatus {
            is_clean: modified.is_empty(),
            modified_resources: modified,
            ahead_by,
            behind_by,
        })
    }
}
