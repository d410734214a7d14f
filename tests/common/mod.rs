//! Shared fixtures for integration tests.
//!
//! Tests run against real git repositories: a bare repository on disk
//! plays the remote, and a second clone driven through the `git` CLI plays
//! a collaborator pushing out-of-band changes.

// Shared by several test binaries; none uses every helper
#![allow(dead_code)]

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use gitloom::artifact::{ApplicationState, JsonTreeSerializer};
use gitloom::core::config::CoreConfig;
use gitloom::core::types::{ApplicationId, BranchName, UserId};
use gitloom::git::RemoteAuth;
use gitloom::service::{GitSyncService, RemoteConfig, StaticCredentials};
use gitloom::store::{Application, DocumentStore, GitProfile, InMemoryDocumentStore};

/// Run a git command, panicking on failure.
pub fn run_git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git command failed to start");
    if !output.status.success() {
        panic!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

/// Run a git command and capture its trimmed stdout.
pub fn git_stdout(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git command failed to start");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

/// A service wired to an in-memory store and a bare on-disk remote.
pub struct Harness {
    pub service: GitSyncService,
    pub store: Arc<InMemoryDocumentStore>,
    pub remote_url: String,
    _workspace_root: TempDir,
    _remote_dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let workspace_root = TempDir::new().expect("create workspace root");
        let remote_dir = TempDir::new().expect("create remote dir");

        let remote_path = remote_dir.path().join("remote.git");
        std::fs::create_dir_all(&remote_path).unwrap();
        run_git(&remote_path, &["init", "--bare"]);
        run_git(&remote_path, &["symbolic-ref", "HEAD", "refs/heads/main"]);

        let store = Arc::new(InMemoryDocumentStore::new());
        let service = GitSyncService::new(
            store.clone(),
            Arc::new(JsonTreeSerializer),
            Arc::new(StaticCredentials(RemoteAuth::Anonymous)),
            CoreConfig::with_root(workspace_root.path().to_path_buf()),
        )
        .expect("create service");

        Self {
            service,
            store,
            remote_url: remote_path.to_string_lossy().into_owned(),
            _workspace_root: workspace_root,
            _remote_dir: remote_dir,
        }
    }

    /// Store a fresh application document with a small sample artifact.
    pub async fn seed_application(&self) -> Application {
        let mut state = ApplicationState::new();
        state
            .set_resource("home-page", json!({"widgets": ["header"]}))
            .unwrap();
        state
            .set_resource("settings", json!({"theme": "light"}))
            .unwrap();
        self.store
            .put_application(Application::new("demo", state))
            .await
            .unwrap()
    }

    /// Register a global git profile for a user.
    pub async fn seed_profile(&self, user: &UserId, name: &str) {
        self.service
            .upsert_profile(
                user,
                GitProfile {
                    author_name: name.to_string(),
                    author_email: format!("{name}@example.com"),
                    use_global_profile: false,
                },
                true,
                None,
            )
            .await
            .unwrap();
    }

    /// Connect an application to the harness remote on `main`.
    pub async fn connect(&self, application: ApplicationId, user: &UserId) -> Application {
        self.connect_result(application, user)
            .await
            .expect("connect application")
    }

    /// Like [`Harness::connect`], surfacing the error to the caller.
    pub async fn connect_result(
        &self,
        application: ApplicationId,
        user: &UserId,
    ) -> Result<Application, gitloom::error::SyncError> {
        self.service
            .connect(
                application,
                RemoteConfig {
                    remote_url: self.remote_url.clone(),
                    auth: RemoteAuth::Anonymous,
                    user: user.clone(),
                    default_branch: Some(branch("main")),
                    is_private: false,
                    profile: None,
                },
                "",
            )
            .await
    }

    /// Fully seeded harness state: application + profile + connection.
    pub async fn connected(&self) -> (Application, UserId) {
        let user = user("dev");
        self.seed_profile(&user, "dev").await;
        let app = self.seed_application().await;
        let app = self.connect(app.id, &user).await;
        (app, user)
    }

    /// Apply out-of-band edits through a collaborator clone and push them.
    ///
    /// Each edit is `(path, content)`; `branch` is created from the remote
    /// branch of the same name when it exists, from `main` otherwise.
    pub fn collaborator_push(&self, branch_name: &str, edits: &[(&str, &str)], message: &str) {
        let clone_dir = TempDir::new().expect("create collaborator dir");
        let dir = clone_dir.path();

        run_git(dir, &["clone", &self.remote_url, "."]);
        run_git(dir, &["config", "user.email", "collab@example.com"]);
        run_git(dir, &["config", "user.name", "Collaborator"]);

        let has_remote_branch = Command::new("git")
            .args(["rev-parse", "--verify", &format!("origin/{branch_name}")])
            .current_dir(dir)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);
        if has_remote_branch {
            run_git(dir, &["checkout", "-B", branch_name, &format!("origin/{branch_name}")]);
        } else {
            run_git(dir, &["checkout", "-B", branch_name, "origin/main"]);
        }

        for (path, content) in edits {
            let target = dir.join(path);
            std::fs::create_dir_all(target.parent().unwrap()).unwrap();
            std::fs::write(target, content).unwrap();
        }
        run_git(dir, &["add", "-A"]);
        run_git(dir, &["commit", "-m", message]);
        run_git(dir, &["push", "origin", branch_name]);
    }

    /// Tip of a branch in the bare remote.
    pub fn remote_tip(&self, branch_name: &str) -> String {
        git_stdout(Path::new(&self.remote_url), &["rev-parse", branch_name])
    }
}

pub fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

pub fn branch(name: &str) -> BranchName {
    BranchName::new(name).unwrap()
}

/// Pretty-printed JSON content matching the serializer's export format.
pub fn resource_json(value: serde_json::Value) -> String {
    let mut text = serde_json::to_string_pretty(&value).unwrap();
    text.push('\n');
    text
}
