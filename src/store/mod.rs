//! store
//!
//! Document-store boundary: the records the core persists and the
//! [`DocumentStore`] trait it persists them through.
//!
//! # Records
//!
//! - [`Application`] - an application document (default or child), carrying
//!   its artifact state and an optional [`GitRef`] back-reference
//! - [`RepositoryBinding`] - one per connected default application; the
//!   single source of truth for repository location and remote
//! - [`BranchRecord`] - one per branch per repository, linking a branch to
//!   its child application document
//! - [`GitProfile`] - commit author identity, keyed by user and optionally
//!   by application
//!
//! The store is an external collaborator; [`InMemoryDocumentStore`] is the
//! reference implementation used for embedding and tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::ApplicationState;
use crate::core::types::{ApplicationId, BranchName, Oid, UserId};

/// Errors from document-store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Record kind ("application", "binding", ...)
        kind: &'static str,
        /// The missing key
        id: String,
    },

    /// Backend failure (connection, serialization, ...).
    #[error("document store error: {0}")]
    Backend(String),
}

/// Commit author identity.
///
/// `use_global_profile` marks a per-application profile as deferring to the
/// user's global profile; resolution treats such a profile as absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitProfile {
    pub author_name: String,
    pub author_email: String,
    #[serde(default)]
    pub use_global_profile: bool,
}

/// Back-reference from an application document to its repository binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRef {
    /// The default application owning the binding
    pub root_application: ApplicationId,
    /// The branch this document materializes
    pub branch: BranchName,
    /// Cleared by `detach`: the document keeps its artifact but loses its
    /// git-backed capability
    pub git_enabled: bool,
}

/// An application document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub name: String,
    pub state: ApplicationState,
    /// Present once the application participates in a connected repository
    pub git: Option<GitRef>,
}

impl Application {
    /// A fresh, unconnected application document.
    pub fn new(name: impl Into<String>, state: ApplicationState) -> Self {
        Self {
            id: ApplicationId::generate(),
            name: name.into(),
            state,
            git: None,
        }
    }
}

/// The repository binding of a connected default application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryBinding {
    /// The default application
    pub application: ApplicationId,
    /// Remote URL as supplied at connect time
    pub remote_url: String,
    /// Local working copy location (owned exclusively by the core)
    pub local_path: PathBuf,
    /// Name of the default branch
    pub default_branch: BranchName,
    /// Whether the remote repository is private
    pub is_private: bool,
    /// Browser-facing URL of the remote, when derivable
    pub browser_url: Option<String>,
    /// User who connected the repository; author of service-generated
    /// commits (auto-stage, merges)
    pub connected_by: UserId,
}

/// One branch of a connected repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRecord {
    /// The application document materializing this branch
    pub application: ApplicationId,
    /// Branch name, unique per repository
    pub branch: BranchName,
    /// The default application owning the repository
    pub root_application: ApplicationId,
    /// Exactly one record per repository has this set
    pub is_default: bool,
    /// Tip last known to match the remote
    pub last_synced_commit: Option<Oid>,
}

/// Storage key for a git profile: global per user, or per application.
pub const GLOBAL_PROFILE_KEY: &str = "default";

/// Document-store access used by the core.
///
/// Implementations must be internally consistent but need no transactional
/// coupling with the repository: the binding is the single source of truth
/// for repository location, and branch records are weak references that the
/// service validates against live refs.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch an application document.
    async fn application(&self, id: &ApplicationId) -> Result<Application, StoreError>;

    /// Insert or replace an application document.
    async fn put_application(&self, app: Application) -> Result<Application, StoreError>;

    /// Fetch the binding of a default application, if connected.
    async fn binding(&self, app: &ApplicationId) -> Result<Option<RepositoryBinding>, StoreError>;

    /// Insert or replace a binding.
    async fn put_binding(&self, binding: RepositoryBinding) -> Result<(), StoreError>;

    /// Delete a binding.
    async fn delete_binding(&self, app: &ApplicationId) -> Result<(), StoreError>;

    /// All branch records of a repository.
    async fn branch_records(&self, root: &ApplicationId) -> Result<Vec<BranchRecord>, StoreError>;

    /// One branch record, if registered.
    async fn branch_record(
        &self,
        root: &ApplicationId,
        branch: &BranchName,
    ) -> Result<Option<BranchRecord>, StoreError>;

    /// Insert or replace a branch record.
    async fn put_branch_record(&self, record: BranchRecord) -> Result<(), StoreError>;

    /// Delete a branch record.
    async fn delete_branch_record(
        &self,
        root: &ApplicationId,
        branch: &BranchName,
    ) -> Result<(), StoreError>;

    /// Fetch a profile: the user's global one for `application = None`,
    /// else the per-application one.
    async fn profile(
        &self,
        user: &UserId,
        application: Option<&ApplicationId>,
    ) -> Result<Option<GitProfile>, StoreError>;

    /// Insert or replace a profile.
    async fn put_profile(
        &self,
        user: &UserId,
        application: Option<&ApplicationId>,
        profile: GitProfile,
    ) -> Result<(), StoreError>;

    /// All profiles of a user, keyed by [`GLOBAL_PROFILE_KEY`] or
    /// application id.
    async fn profiles(&self, user: &UserId) -> Result<HashMap<String, GitProfile>, StoreError>;
}

type ProfileKey = (UserId, Option<ApplicationId>);

/// In-memory document store for embedding and tests.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    applications: RwLock<HashMap<ApplicationId, Application>>,
    bindings: RwLock<HashMap<ApplicationId, RepositoryBinding>>,
    branches: RwLock<HashMap<(ApplicationId, BranchName), BranchRecord>>,
    profiles: RwLock<HashMap<ProfileKey, GitProfile>>,
}

impl InMemoryDocumentStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn application(&self, id: &ApplicationId) -> Result<Application, StoreError> {
        self.applications
            .read()
            .expect("store poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "application",
                id: id.to_string(),
            })
    }

    async fn put_application(&self, app: Application) -> Result<Application, StoreError> {
        self.applications
            .write()
            .expect("store poisoned")
            .insert(app.id, app.clone());
        Ok(app)
    }

    async fn binding(&self, app: &ApplicationId) -> Result<Option<RepositoryBinding>, StoreError> {
        Ok(self
            .bindings
            .read()
            .expect("store poisoned")
            .get(app)
            .cloned())
    }

    async fn put_binding(&self, binding: RepositoryBinding) -> Result<(), StoreError> {
        self.bindings
            .write()
            .expect("store poisoned")
            .insert(binding.application, binding);
        Ok(())
    }

    async fn delete_binding(&self, app: &ApplicationId) -> Result<(), StoreError> {
        self.bindings.write().expect("store poisoned").remove(app);
        Ok(())
    }

    async fn branch_records(&self, root: &ApplicationId) -> Result<Vec<BranchRecord>, StoreError> {
        let mut records: Vec<BranchRecord> = self
            .branches
            .read()
            .expect("store poisoned")
            .values()
            .filter(|r| r.root_application == *root)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.branch.as_str().cmp(b.branch.as_str()));
        Ok(records)
    }

    async fn branch_record(
        &self,
        root: &ApplicationId,
        branch: &BranchName,
    ) -> Result<Option<BranchRecord>, StoreError> {
        Ok(self
            .branches
            .read()
            .expect("store poisoned")
            .get(&(*root, branch.clone()))
            .cloned())
    }

    async fn put_branch_record(&self, record: BranchRecord) -> Result<(), StoreError> {
        self.branches
            .write()
            .expect("store poisoned")
            .insert((record.root_application, record.branch.clone()), record);
        Ok(())
    }

    async fn delete_branch_record(
        &self,
        root: &ApplicationId,
        branch: &BranchName,
    ) -> Result<(), StoreError> {
        self.branches
            .write()
            .expect("store poisoned")
            .remove(&(*root, branch.clone()));
        Ok(())
    }

    async fn profile(
        &self,
        user: &UserId,
        application: Option<&ApplicationId>,
    ) -> Result<Option<GitProfile>, StoreError> {
        Ok(self
            .profiles
            .read()
            .expect("store poisoned")
            .get(&(user.clone(), application.copied()))
            .cloned())
    }

    async fn put_profile(
        &self,
        user: &UserId,
        application: Option<&ApplicationId>,
        profile: GitProfile,
    ) -> Result<(), StoreError> {
        self.profiles
            .write()
            .expect("store poisoned")
            .insert((user.clone(), application.copied()), profile);
        Ok(())
    }

    async fn profiles(&self, user: &UserId) -> Result<HashMap<String, GitProfile>, StoreError> {
        let profiles = self.profiles.read().expect("store poisoned");
        let mut result = HashMap::new();
        for ((owner, application), profile) in profiles.iter() {
            if owner != user {
                continue;
            }
            let key = match application {
                Some(app) => app.to_string(),
                None => GLOBAL_PROFILE_KEY.to_string(),
            };
            result.insert(key, profile.clone());
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn branch(name: &str) -> BranchName {
        BranchName::new(name).unwrap()
    }

    fn profile(name: &str) -> GitProfile {
        GitProfile {
            author_name: name.to_string(),
            author_email: format!("{name}@example.com"),
            use_global_profile: false,
        }
    }

    #[tokio::test]
    async fn application_roundtrip() {
        let store = InMemoryDocumentStore::new();
        let app = Application::new("demo", ApplicationState::new());
        let id = app.id;

        store.put_application(app.clone()).await.unwrap();
        assert_eq!(store.application(&id).await.unwrap(), app);
    }

    #[tokio::test]
    async fn missing_application_is_not_found() {
        let store = InMemoryDocumentStore::new();
        let err = store
            .application(&ApplicationId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "application", .. }));
    }

    #[tokio::test]
    async fn binding_lifecycle() {
        let store = InMemoryDocumentStore::new();
        let app = ApplicationId::generate();
        let binding = RepositoryBinding {
            application: app,
            remote_url: "file:///tmp/remote.git".into(),
            local_path: PathBuf::from("/tmp/work"),
            default_branch: branch("main"),
            is_private: false,
            browser_url: None,
            connected_by: user("u1"),
        };

        assert!(store.binding(&app).await.unwrap().is_none());
        store.put_binding(binding.clone()).await.unwrap();
        assert_eq!(store.binding(&app).await.unwrap(), Some(binding));
        store.delete_binding(&app).await.unwrap();
        assert!(store.binding(&app).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn branch_records_scoped_to_root() {
        let store = InMemoryDocumentStore::new();
        let root_a = ApplicationId::generate();
        let root_b = ApplicationId::generate();

        for (root, name) in [(root_a, "main"), (root_a, "feature"), (root_b, "main")] {
            store
                .put_branch_record(BranchRecord {
                    application: ApplicationId::generate(),
                    branch: branch(name),
                    root_application: root,
                    is_default: name == "main",
                    last_synced_commit: None,
                })
                .await
                .unwrap();
        }

        let records = store.branch_records(&root_a).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].branch.as_str(), "feature");
        assert_eq!(records[1].branch.as_str(), "main");
    }

    #[tokio::test]
    async fn delete_branch_record_is_scoped() {
        let store = InMemoryDocumentStore::new();
        let root = ApplicationId::generate();
        store
            .put_branch_record(BranchRecord {
                application: ApplicationId::generate(),
                branch: branch("feature"),
                root_application: root,
                is_default: false,
                last_synced_commit: None,
            })
            .await
            .unwrap();

        store
            .delete_branch_record(&root, &branch("feature"))
            .await
            .unwrap();
        assert!(store
            .branch_record(&root, &branch("feature"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn profiles_keyed_by_scope() {
        let store = InMemoryDocumentStore::new();
        let u = user("u1");
        let app = ApplicationId::generate();

        store.put_profile(&u, None, profile("global")).await.unwrap();
        store
            .put_profile(&u, Some(&app), profile("scoped"))
            .await
            .unwrap();

        let map = store.profiles(&u).await.unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[GLOBAL_PROFILE_KEY].author_name, "global");
        assert_eq!(map[&app.to_string()].author_name, "scoped");

        // Another user sees nothing
        assert!(store.profiles(&user("u2")).await.unwrap().is_empty());
    }
}
