//! service::binding
//!
//! Repository binding lifecycle: connect, metadata access and update,
//! detach.
//!
//! `connect` validates the remote before writing any local state, and
//! removes the partially built working copy if anything later in the
//! sequence fails, so a failed connect leaves the application exactly as
//! unconnected as before.

use std::path::{Path, PathBuf};

use crate::core::types::{ApplicationId, BranchName, UserId};
use crate::error::SyncError;
use crate::git::{browser_url, GitWorkspace, RemoteAuth};
use crate::store::{Application, BranchRecord, GitProfile, GitRef, RepositoryBinding};

use super::GitSyncService;

/// Remote configuration supplied to `connect`.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Remote URL (https, ssh, or file form)
    pub remote_url: String,
    /// Credentials for the remote
    pub auth: RemoteAuth,
    /// The connecting user; recorded on the binding as the author of
    /// service-generated commits
    pub user: UserId,
    /// Default branch override; otherwise the remote's advertised default,
    /// falling back to `main` on an empty remote
    pub default_branch: Option<BranchName>,
    /// Whether the remote repository is private
    pub is_private: bool,
    /// Commit identity to register for this application; omitted, the
    /// user's configured profile is used
    pub profile: Option<GitProfile>,
}

/// Mutable binding fields for `update_metadata`.
#[derive(Debug, Clone, Default)]
pub struct BindingPatch {
    /// Rename the default branch (binding metadata only; repository
    /// contents are untouched)
    pub default_branch: Option<BranchName>,
    /// Change the privacy flag
    pub is_private: Option<bool>,
    /// Replace the browser-facing URL
    pub browser_url: Option<String>,
}

/// Removes a partially built working copy unless defused.
struct WorkdirCleanup<'a> {
    path: &'a Path,
    armed: bool,
}

impl<'a> WorkdirCleanup<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, armed: true }
    }

    fn defuse(&mut self) {
        self.armed = false;
    }
}

impl Drop for WorkdirCleanup<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_dir_all(self.path);
        }
    }
}

impl GitSyncService {
    /// Connect an application to a remote repository.
    ///
    /// Validates reachability and credentials, clones (non-empty remote) or
    /// initializes the working copy, writes the binding and the default
    /// branch record, commits the current application state on the default
    /// branch, and pushes it.
    ///
    /// # Errors
    ///
    /// - [`SyncError::AlreadyConnected`] when a binding already exists
    /// - [`SyncError::RemoteUnreachable`] / [`SyncError::AuthFailed`] from
    ///   remote validation
    /// - [`SyncError::ProfileNotConfigured`] without a usable identity
    pub async fn connect(
        &self,
        application: ApplicationId,
        remote: RemoteConfig,
        origin: &str,
    ) -> Result<Application, SyncError> {
        let mut app = self.store.application(&application).await?;
        if self.store.binding(&application).await?.is_some() {
            return Err(SyncError::AlreadyConnected(application));
        }

        // Register a supplied profile, then resolve the author through the
        // identity store so the fallback rules apply uniformly
        if let Some(profile) = &remote.profile {
            self.upsert_profile(&remote.user, profile.clone(), false, Some(&application))
                .await?;
        }
        let author = self.resolve_author(&remote.user, Some(&application)).await?;

        // Validate the remote before any local state exists
        let heads = GitWorkspace::probe_remote(&remote.remote_url, &remote.auth)?;
        let default_branch = match &remote.default_branch {
            Some(branch) => branch.clone(),
            None => match GitWorkspace::default_branch_of(&heads) {
                Some(branch) => branch,
                None => BranchName::new("main")?,
            },
        };

        let _guard = self.structural_guard(&application, &default_branch).await?;

        let workdir = self.prepare_workdir(&application)?;
        let mut cleanup = WorkdirCleanup::new(&workdir);

        let remote_has_history = heads.iter().any(|h| h.name.starts_with("refs/heads/"));
        let workspace = if remote_has_history {
            GitWorkspace::clone_from(
                &workdir,
                &remote.remote_url,
                &self.config.remote_name,
                &remote.auth,
            )?
        } else {
            GitWorkspace::init(
                &workdir,
                &remote.remote_url,
                &self.config.remote_name,
                &default_branch,
            )?
        };

        match workspace.try_branch_tip(&default_branch)? {
            Some(_) => workspace.checkout_branch(&default_branch)?,
            None if workspace.remote_tip(&default_branch)?.is_some() => {
                workspace.create_tracking_branch(&default_branch)?;
                workspace.checkout_branch(&default_branch)?;
            }
            None => workspace.set_head_unborn(&default_branch)?,
        }

        // Initial commit of the current application state
        let tree = self.export_state(&app.state).await?;
        workspace.materialize(&tree)?;
        workspace.stage_all()?;
        workspace.commit_staged(&author, "Initial commit of application state")?;
        let remote_tip = workspace.push(&default_branch, &remote.auth)?;

        let record = RepositoryBinding {
            application,
            remote_url: remote.remote_url.clone(),
            local_path: workdir.clone(),
            default_branch: default_branch.clone(),
            is_private: remote.is_private,
            browser_url: browser_url(&remote.remote_url)
                .or_else(|| (!origin.is_empty()).then(|| origin.to_string())),
            connected_by: remote.user.clone(),
        };
        self.store.put_binding(record).await?;
        self.store
            .put_branch_record(BranchRecord {
                application,
                branch: default_branch.clone(),
                root_application: application,
                is_default: true,
                last_synced_commit: Some(remote_tip),
            })
            .await?;

        app.git = Some(GitRef {
            root_application: application,
            branch: default_branch,
            git_enabled: true,
        });
        let app = self.store.put_application(app).await?;

        cleanup.defuse();
        self.invalidate_branch_cache(&application);
        Ok(app)
    }

    /// The binding of a connected application.
    ///
    /// # Errors
    ///
    /// - [`SyncError::BindingNotFound`] when unconnected
    pub async fn metadata(
        &self,
        application: &ApplicationId,
    ) -> Result<RepositoryBinding, SyncError> {
        self.require_binding(application).await
    }

    /// Update binding fields without touching repository contents.
    ///
    /// # Errors
    ///
    /// - [`SyncError::BindingNotFound`] when unconnected
    pub async fn update_metadata(
        &self,
        application: &ApplicationId,
        patch: BindingPatch,
    ) -> Result<Application, SyncError> {
        let mut binding = self.require_binding(application).await?;

        if let Some(default_branch) = patch.default_branch {
            binding.default_branch = default_branch;
        }
        if let Some(is_private) = patch.is_private {
            binding.is_private = is_private;
        }
        if let Some(url) = patch.browser_url {
            binding.browser_url = Some(url);
        }

        self.store.put_binding(binding).await?;
        self.invalidate_branch_cache(application);
        Ok(self.store.application(application).await?)
    }

    /// Detach the application from its remote.
    ///
    /// Removes the binding and the local working copy. Branch documents
    /// become orphaned stubs: their git capability is disabled but their
    /// last-known artifact content is retained. Irreversible; the remote
    /// repository itself is untouched.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidState`] when the application is not connected
    pub async fn detach(&self, application: ApplicationId) -> Result<Application, SyncError> {
        let binding = self.store.binding(&application).await?.ok_or_else(|| {
            SyncError::InvalidState(format!("application {application} is not connected"))
        })?;

        let _guard = self
            .structural_guard(&application, &binding.default_branch)
            .await?;

        for record in self.store.branch_records(&application).await? {
            if let Ok(mut doc) = self.store.application(&record.application).await {
                if let Some(git) = doc.git.as_mut() {
                    git.git_enabled = false;
                }
                self.store.put_application(doc).await?;
            }
            self.store
                .delete_branch_record(&application, &record.branch)
                .await?;
        }
        self.store.delete_binding(&application).await?;

        if binding.local_path.exists() {
            std::fs::remove_dir_all(&binding.local_path).map_err(|e| {
                Self::io_error(format!(
                    "cannot remove {}: {e}",
                    binding.local_path.display()
                ))
            })?;
        }

        self.invalidate_branch_cache(&application);
        Ok(self.store.application(&application).await?)
    }

    /// Create a fresh working directory for `application`.
    fn prepare_workdir(&self, application: &ApplicationId) -> Result<PathBuf, SyncError> {
        let workdir = self.paths.workdir(application);
        if workdir.exists() {
            // Leftover from an interrupted connect; a live binding would
            // have returned AlreadyConnected above
            std::fs::remove_dir_all(&workdir).map_err(|e| {
                Self::io_error(format!("cannot clear {}: {e}", workdir.display()))
            })?;
        }
        std::fs::create_dir_all(&workdir)
            .map_err(|e| Self::io_error(format!("cannot create {}: {e}", workdir.display())))?;
        Ok(workdir)
    }
}
