//! service::branches
//!
//! Branch lifecycle: listing, creation, checkout, deletion.
//!
//! Each branch corresponds to exactly one materialized application
//! document. Creating a branch clones the source branch's document;
//! checking out re-imports the checked-out tree into the branch's
//! document.
//!
//! # Caching
//!
//! Listings are served from a short-TTL cache keyed by application id and
//! invalidated by every structural write. Staleness is acceptable,
//! inconsistency is not: a forced listing (`ignore_cache`) fetches the
//! remote first and repopulates the cache.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::core::types::{ApplicationId, BranchName, Oid};
use crate::error::SyncError;
use crate::git::GitError;
use crate::store::{Application, BranchRecord, GitRef};

use super::GitSyncService;

/// One entry in a branch listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchListEntry {
    /// Branch name
    pub name: BranchName,
    /// Whether this is the repository's default branch
    pub is_default: bool,
    /// Last known tip, local if present, else remote-tracking
    pub last_commit: Option<Oid>,
}

/// Parameters for branch creation.
#[derive(Debug, Clone)]
pub struct BranchSpec {
    /// Name of the branch to create
    pub name: BranchName,
}

struct CacheSlot {
    stored_at: Instant,
    entries: Vec<BranchListEntry>,
}

/// TTL cache of branch listings, keyed by application id.
pub(crate) struct BranchListCache {
    slots: Mutex<HashMap<ApplicationId, CacheSlot>>,
    ttl: Duration,
}

impl BranchListCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn get(&self, application: &ApplicationId) -> Option<Vec<BranchListEntry>> {
        let slots = self.slots.lock().expect("branch cache poisoned");
        let slot = slots.get(application)?;
        if slot.stored_at.elapsed() > self.ttl {
            return None;
        }
        Some(slot.entries.clone())
    }

    fn put(&self, application: ApplicationId, entries: Vec<BranchListEntry>) {
        self.slots.lock().expect("branch cache poisoned").insert(
            application,
            CacheSlot {
                stored_at: Instant::now(),
                entries,
            },
        );
    }

    pub(crate) fn invalidate(&self, application: &ApplicationId) {
        self.slots
            .lock()
            .expect("branch cache poisoned")
            .remove(application);
    }
}

impl GitSyncService {
    /// List local and remote-tracking branches, default first.
    ///
    /// Serves from the cache unless it is stale or `ignore_cache` is set;
    /// a forced listing fetches the remote before reading refs.
    pub async fn list_branches(
        &self,
        application: &ApplicationId,
        ignore_cache: bool,
    ) -> Result<Vec<BranchListEntry>, SyncError> {
        let binding = self.require_binding(application).await?;

        if !ignore_cache {
            if let Some(entries) = self.branch_cache.get(application) {
                return Ok(entries);
            }
        }

        let _read = self.read_guard(application)?;
        let workspace = self.open_workspace(&binding)?;

        if ignore_cache {
            let auth = self.remote_auth(&binding).await?;
            workspace.fetch(&auth)?;
        }

        let mut names: BTreeSet<BranchName> =
            workspace.list_local_branches()?.into_iter().collect();
        names.extend(workspace.list_remote_branches()?);

        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            let last_commit = match workspace.try_branch_tip(&name)? {
                Some(tip) => Some(tip),
                None => workspace.remote_tip(&name)?,
            };
            entries.push(BranchListEntry {
                is_default: name == binding.default_branch,
                name,
                last_commit,
            });
        }
        entries.sort_by(|a, b| {
            b.is_default
                .cmp(&a.is_default)
                .then_with(|| a.name.as_str().cmp(b.name.as_str()))
        });

        self.branch_cache.put(*application, entries.clone());
        Ok(entries)
    }

    /// Create a branch from the tip of `source` and materialize its child
    /// application document with the source branch's artifact.
    ///
    /// The working copy switches to the new branch.
    ///
    /// # Errors
    ///
    /// - [`SyncError::BranchAlreadyExists`]
    /// - [`SyncError::SourceBranchNotFound`]
    pub async fn create_branch(
        &self,
        application: &ApplicationId,
        spec: BranchSpec,
        source: &BranchName,
    ) -> Result<Application, SyncError> {
        let binding = self.require_binding(application).await?;
        let _guard = self.structural_guard(application, &spec.name).await?;
        self.invalidate_branch_cache(application);

        let workspace = self.open_workspace(&binding)?;
        if workspace.try_branch_tip(&spec.name)?.is_some() {
            return Err(SyncError::BranchAlreadyExists(spec.name.to_string()));
        }
        if workspace.try_branch_tip(source)?.is_none() {
            return Err(SyncError::SourceBranchNotFound(source.to_string()));
        }

        let source_doc = self.branch_application(&binding, source).await?;

        workspace.create_branch_from(&spec.name, source)?;
        workspace.checkout_branch(&spec.name)?;

        let mut child = Application::new(source_doc.name.clone(), source_doc.state.clone());
        child.git = Some(GitRef {
            root_application: *application,
            branch: spec.name.clone(),
            git_enabled: true,
        });
        let child = self.store.put_application(child).await?;
        self.store
            .put_branch_record(BranchRecord {
                application: child.id,
                branch: spec.name,
                root_application: *application,
                is_default: false,
                last_synced_commit: None,
            })
            .await?;

        Ok(child)
    }

    /// Switch the working copy to `branch` and re-import its tree into the
    /// branch's application document.
    ///
    /// With `is_remote` set, a local tracking branch is created from the
    /// remote ref first (fetching if needed), and a child application
    /// document is materialized for it.
    ///
    /// Checkout is refused, never forced, while the current branch's
    /// artifact has uncommitted edits.
    ///
    /// # Errors
    ///
    /// - [`SyncError::BranchNotFound`]
    /// - [`SyncError::UncommittedChanges`] when switching would discard
    ///   local edits
    pub async fn checkout_branch(
        &self,
        application: &ApplicationId,
        branch: &BranchName,
        is_remote: bool,
    ) -> Result<Application, SyncError> {
        let binding = self.require_binding(application).await?;
        let _guard = self.structural_guard(application, branch).await?;
        self.invalidate_branch_cache(application);

        let workspace = self.open_workspace(&binding)?;

        if let Some(current) = workspace.current_branch()? {
            if let Ok(doc) = self.branch_application(&binding, &current).await {
                if self.artifact_dirty(&workspace, &current, &doc.state).await? {
                    return Err(SyncError::UncommittedChanges {
                        branch: current.to_string(),
                    });
                }
            }
        }

        if is_remote && workspace.try_branch_tip(branch)?.is_none() {
            if workspace.remote_tip(branch)?.is_none() {
                let auth = self.remote_auth(&binding).await?;
                workspace.fetch(&auth)?;
            }
            match workspace.create_tracking_branch(branch) {
                Ok(_) => {}
                Err(GitError::RefNotFound { .. }) => {
                    return Err(SyncError::BranchNotFound(branch.to_string()));
                }
                Err(e) => return Err(e.into()),
            }
        }

        workspace.checkout_branch(branch)?;
        let tip = workspace.branch_tip(branch)?;

        match self.store.branch_record(application, branch).await? {
            Some(_) => self
                .reimport_branch_document(&workspace, &binding, branch)
                .await,
            None => {
                // First checkout of a remote branch: materialize its child
                // document from the checked-out tree
                let state = self
                    .serializer
                    .import(&workspace.tree_snapshot(&tip)?)
                    .await?;
                let root_doc = self.store.application(application).await?;

                let mut child = Application::new(root_doc.name.clone(), state);
                child.git = Some(GitRef {
                    root_application: *application,
                    branch: branch.clone(),
                    git_enabled: true,
                });
                let child = self.store.put_application(child).await?;
                self.store
                    .put_branch_record(BranchRecord {
                        application: child.id,
                        branch: branch.clone(),
                        root_application: *application,
                        is_default: false,
                        last_synced_commit: Some(tip),
                    })
                    .await?;
                Ok(child)
            }
        }
    }

    /// Delete a branch: the local ref, the branch record, and the child
    /// document's git capability (its artifact content is retained).
    ///
    /// The working copy switches to the default branch first when the
    /// deleted branch is checked out.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidState`] for the default branch
    /// - [`SyncError::BranchNotFound`]
    pub async fn delete_branch(
        &self,
        application: &ApplicationId,
        branch: &BranchName,
    ) -> Result<Application, SyncError> {
        let binding = self.require_binding(application).await?;
        if *branch == binding.default_branch {
            return Err(SyncError::InvalidState(
                "the default branch cannot be deleted".into(),
            ));
        }

        let _guard = self.structural_guard(application, branch).await?;
        self.invalidate_branch_cache(application);

        let workspace = self.open_workspace(&binding)?;
        if workspace.current_branch()?.as_ref() == Some(branch) {
            workspace.checkout_branch(&binding.default_branch)?;
        }
        workspace.delete_branch(branch)?;

        if let Some(record) = self.store.branch_record(application, branch).await? {
            if let Ok(mut doc) = self.store.application(&record.application).await {
                if let Some(git) = doc.git.as_mut() {
                    git.git_enabled = false;
                }
                self.store.put_application(doc).await?;
            }
            self.store.delete_branch_record(application, branch).await?;
        }

        Ok(self.store.application(application).await?)
    }
}
