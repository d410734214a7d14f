//! git::workspace
//!
//! Git workspace implementation using git2.
//!
//! # Architecture
//!
//! [`GitWorkspace`] wraps the working copy of one connected repository and
//! is the only type in the crate that touches `git2`. It provides:
//!
//! - Structured results and typed failure categories
//! - Remote access (probe, fetch, push) with credential callbacks
//! - Tree materialization and snapshotting for the artifact serializer
//! - Merge primitives: analysis, fast-forward, in-worktree merge with
//!   conflict reporting, and in-memory merge preview
//!
//! # Error Handling
//!
//! `git2` errors are normalized into [`GitError`] variants. Network and
//! authentication failures are classified so the service layer can mark
//! them retryable.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::artifact::FileTree;
use crate::core::types::{BranchName, Oid, RefName, TypeError};

/// Errors from Git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// No repository at the expected working directory.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was opened
        path: PathBuf,
    },

    /// Requested ref does not exist.
    #[error("ref not found: {refname}")]
    RefNotFound {
        /// The ref that was not found
        refname: String,
    },

    /// Local branch does not exist.
    #[error("branch not found: {branch}")]
    BranchNotFound {
        /// The missing branch
        branch: String,
    },

    /// Branch already exists.
    #[error("branch already exists: {branch}")]
    BranchExists {
        /// The conflicting branch
        branch: String,
    },

    /// Remote could not be reached.
    #[error("remote unreachable: {message}")]
    RemoteUnreachable {
        /// Transport-level failure description
        message: String,
    },

    /// Remote rejected the supplied credentials.
    #[error("authentication failed: {message}")]
    Auth {
        /// Failure description from the transport
        message: String,
    },

    /// Network failure mid-transfer; the local repository remains valid.
    #[error("network error: {message}")]
    Network {
        /// Failure description from the transport
        message: String,
    },

    /// Push rejected because the remote branch has diverged.
    #[error("push rejected for {branch}: remote has diverged")]
    NonFastForward {
        /// The rejected branch
        branch: String,
    },

    /// Object not found in the repository.
    #[error("object not found: {oid}")]
    ObjectNotFound {
        /// The missing object id
        oid: String,
    },

    /// Invalid object id or ref name.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of the problem
        message: String,
    },

    /// Filesystem error while manipulating the working directory.
    #[error("workspace io error: {message}")]
    Io {
        /// Description of the failure
        message: String,
    },

    /// Internal git2 error.
    #[error("git error: {message}")]
    Internal {
        /// The underlying message
        message: String,
    },
}

impl GitError {
    /// Classify a transport-level git2 error from a remote operation.
    fn from_remote(err: git2::Error) -> Self {
        match (err.class(), err.code()) {
            (_, git2::ErrorCode::Auth) => GitError::Auth {
                message: err.message().to_string(),
            },
            (git2::ErrorClass::Ssh | git2::ErrorClass::Http, _)
                if err.message().to_ascii_lowercase().contains("auth") =>
            {
                GitError::Auth {
                    message: err.message().to_string(),
                }
            }
            (git2::ErrorClass::Net, _) => GitError::Network {
                message: err.message().to_string(),
            },
            _ => GitError::Internal {
                message: err.message().to_string(),
            },
        }
    }
}

impl From<git2::Error> for GitError {
    fn from(err: git2::Error) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => GitError::RefNotFound {
                refname: err.message().to_string(),
            },
            git2::ErrorCode::InvalidSpec => GitError::InvalidId {
                message: err.message().to_string(),
            },
            _ => GitError::Internal {
                message: err.message().to_string(),
            },
        }
    }
}

impl From<TypeError> for GitError {
    fn from(err: TypeError) -> Self {
        GitError::InvalidId {
            message: err.to_string(),
        }
    }
}

/// Credentials for remote access, supplied by the caller at connect time
/// and resolved per operation afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteAuth {
    /// No credentials (public or filesystem remotes).
    Anonymous,
    /// Username/password over HTTPS.
    UserPass {
        username: String,
        password: String,
    },
    /// Personal access token over HTTPS.
    Token {
        token: String,
    },
}

impl RemoteAuth {
    /// Build remote callbacks carrying these credentials.
    fn callbacks(&self) -> git2::RemoteCallbacks<'static> {
        let mut cbs = git2::RemoteCallbacks::new();
        let auth = self.clone();
        cbs.credentials(move |_url, username_from_url, _allowed| match &auth {
            RemoteAuth::Anonymous => git2::Cred::default(),
            RemoteAuth::UserPass { username, password } => {
                git2::Cred::userpass_plaintext(username, password)
            }
            RemoteAuth::Token { token } => {
                // Token auth follows the common forge convention of a fixed
                // username with the token as password
                let user = username_from_url.unwrap_or("x-access-token");
                git2::Cred::userpass_plaintext(user, token)
            }
        });
        cbs
    }
}

/// Author identity for a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

impl CommitAuthor {
    fn signature(&self) -> Result<git2::Signature<'static>, GitError> {
        git2::Signature::now(&self.name, &self.email).map_err(|e| GitError::InvalidId {
            message: format!("invalid author identity: {}", e.message()),
        })
    }
}

/// Summary of working tree status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorktreeStatus {
    /// Staged changes
    pub staged: usize,
    /// Unstaged changes to tracked files
    pub unstaged: usize,
    /// Untracked files
    pub untracked: usize,
    /// Unresolved conflicts present
    pub has_conflicts: bool,
}

impl WorktreeStatus {
    /// No changes of any kind, including untracked files.
    pub fn is_clean(&self) -> bool {
        self.staged == 0 && self.unstaged == 0 && self.untracked == 0 && !self.has_conflicts
    }
}

/// Information about one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// The commit OID
    pub oid: Oid,
    /// First line of the message
    pub summary: String,
    /// Full message
    pub message: String,
    /// Author name
    pub author_name: String,
    /// Author email
    pub author_email: String,
    /// Author timestamp
    pub committed_at: DateTime<Utc>,
}

/// One head advertised by a remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHeadInfo {
    /// Full ref name (`HEAD`, `refs/heads/...`)
    pub name: String,
    /// Target OID
    pub oid: Oid,
    /// Symbolic target, set for the remote `HEAD` entry
    pub symref_target: Option<String>,
}

/// Relationship between a local branch tip and a fetched remote tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTarget {
    /// Local branch already contains the remote tip.
    UpToDate,
    /// Remote tip is reachable by advancing the branch pointer.
    FastForward,
    /// Histories diverged; a merge is required.
    MergeRequired,
}

/// Result of a worktree merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Merge committed cleanly.
    Clean {
        /// The merge commit
        commit: Oid,
    },
    /// Merge produced conflicts; the index and worktree hold the
    /// conflicted state until the caller resolves or aborts.
    Conflicts {
        /// Conflicting paths, sorted
        paths: Vec<String>,
    },
}

/// Result of an in-memory merge dry run. Never touches the worktree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePreview {
    /// Conflicting paths, sorted; empty when the merge would be clean
    pub conflicting: Vec<String>,
}

impl MergePreview {
    /// Whether the merge would apply without conflicts.
    pub fn is_clean(&self) -> bool {
        self.conflicting.is_empty()
    }
}

/// The working copy of one connected repository.
///
/// All branches of an application share this single working directory;
/// callers serialize structural access through `core::lock`.
pub struct GitWorkspace {
    repo: git2::Repository,
    remote_name: String,
}

impl std::fmt::Debug for GitWorkspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitWorkspace")
            .field("path", &self.repo.path())
            .field("remote", &self.remote_name)
            .finish()
    }
}

impl GitWorkspace {
    // =========================================================================
    // Opening, initialization, cloning
    // =========================================================================

    /// Initialize a fresh repository with `default_branch` as the unborn
    /// HEAD and `url` configured as the remote.
    pub fn init(
        path: &Path,
        url: &str,
        remote_name: &str,
        default_branch: &BranchName,
    ) -> Result<Self, GitError> {
        let mut opts = git2::RepositoryInitOptions::new();
        opts.initial_head(default_branch.as_str());
        let repo = git2::Repository::init_opts(path, &opts)?;
        repo.remote(remote_name, url)?;
        Ok(Self {
            repo,
            remote_name: remote_name.to_string(),
        })
    }

    /// Clone `url` into `path`.
    pub fn clone_from(
        path: &Path,
        url: &str,
        remote_name: &str,
        auth: &RemoteAuth,
    ) -> Result<Self, GitError> {
        let mut fetch = git2::FetchOptions::new();
        fetch.remote_callbacks(auth.callbacks());

        let repo = git2::build::RepoBuilder::new()
            .fetch_options(fetch)
            .clone(url, path)
            .map_err(GitError::from_remote)?;

        // git2 names the origin remote itself; rename when the caller uses
        // a different convention
        if remote_name != "origin" {
            repo.remote_rename("origin", remote_name)?;
        }

        Ok(Self {
            repo,
            remote_name: remote_name.to_string(),
        })
    }

    /// Open an existing working copy.
    pub fn open(path: &Path, remote_name: &str) -> Result<Self, GitError> {
        let repo = git2::Repository::open(path).map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;
        Ok(Self {
            repo,
            remote_name: remote_name.to_string(),
        })
    }

    /// Path of the working directory.
    pub fn workdir(&self) -> Result<&Path, GitError> {
        self.repo.workdir().ok_or_else(|| GitError::NotARepo {
            path: self.repo.path().to_path_buf(),
        })
    }

    // =========================================================================
    // Remote probing
    // =========================================================================

    /// List the heads advertised by a remote without creating a repository.
    ///
    /// Used by `connect` to validate reachability and credentials before
    /// any local state is written.
    ///
    /// # Errors
    ///
    /// - [`GitError::Auth`] when the remote rejects the credentials
    /// - [`GitError::RemoteUnreachable`] for transport failures
    pub fn probe_remote(url: &str, auth: &RemoteAuth) -> Result<Vec<RemoteHeadInfo>, GitError> {
        let mut remote = git2::Remote::create_detached(url)?;
        let connection = remote
            .connect_auth(git2::Direction::Fetch, Some(auth.callbacks()), None)
            .map_err(|e| match GitError::from_remote(e) {
                GitError::Network { message } | GitError::Internal { message } => {
                    GitError::RemoteUnreachable { message }
                }
                other => other,
            })?;

        let mut heads = Vec::new();
        for head in connection.list()? {
            heads.push(RemoteHeadInfo {
                name: head.name().to_string(),
                oid: Oid::new(head.oid().to_string())?,
                symref_target: head.symref_target().map(String::from),
            });
        }
        Ok(heads)
    }

    /// The default branch advertised by a probed remote, if any.
    pub fn default_branch_of(heads: &[RemoteHeadInfo]) -> Option<BranchName> {
        heads
            .iter()
            .find(|h| h.name == "HEAD")
            .and_then(|h| h.symref_target.as_deref())
            .and_then(|target| target.strip_prefix("refs/heads/"))
            .and_then(|name| BranchName::new(name).ok())
    }

    // =========================================================================
    // Refs and branches
    // =========================================================================

    /// The currently checked-out branch, or `None` on detached or unborn
    /// HEAD.
    pub fn current_branch(&self) -> Result<Option<BranchName>, GitError> {
        let head = match self.repo.head() {
            Ok(h) => h,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => {
                // Unborn HEAD still names its target branch symbolically
                let head_ref = self.repo.find_reference("HEAD")?;
                let target = head_ref
                    .symbolic_target()
                    .and_then(|t| t.strip_prefix("refs/heads/"))
                    .map(BranchName::new)
                    .transpose()?;
                return Ok(target);
            }
            Err(e) => return Err(e.into()),
        };

        if head.is_branch() {
            if let Some(name) = head.shorthand() {
                return Ok(Some(BranchName::new(name)?));
            }
        }
        Ok(None)
    }

    /// HEAD commit, or `None` while HEAD is unborn.
    pub fn head_oid(&self) -> Result<Option<Oid>, GitError> {
        match self.repo.head() {
            Ok(head) => {
                let oid = head.peel_to_commit()?.id();
                Ok(Some(Oid::new(oid.to_string())?))
            }
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Tip of a local branch.
    ///
    /// # Errors
    ///
    /// - [`GitError::BranchNotFound`] if the branch does not exist
    pub fn branch_tip(&self, branch: &BranchName) -> Result<Oid, GitError> {
        self.try_branch_tip(branch)?
            .ok_or_else(|| GitError::BranchNotFound {
                branch: branch.to_string(),
            })
    }

    /// Tip of a local branch, or `None` if it does not exist.
    pub fn try_branch_tip(&self, branch: &BranchName) -> Result<Option<Oid>, GitError> {
        self.try_resolve(RefName::for_branch(branch).as_str())
    }

    /// Tip of the remote-tracking ref for a branch, or `None`.
    pub fn remote_tip(&self, branch: &BranchName) -> Result<Option<Oid>, GitError> {
        self.try_resolve(RefName::for_remote_branch(&self.remote_name, branch).as_str())
    }

    fn try_resolve(&self, refname: &str) -> Result<Option<Oid>, GitError> {
        match self.repo.find_reference(refname) {
            Ok(reference) => {
                let oid = reference.peel_to_commit()?.id();
                Ok(Some(Oid::new(oid.to_string())?))
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List local branch names.
    pub fn list_local_branches(&self) -> Result<Vec<BranchName>, GitError> {
        self.list_branches(git2::BranchType::Local)
    }

    /// List remote-tracking branch names (without the remote prefix).
    ///
    /// The remote's `HEAD` symref is not a branch and is skipped.
    pub fn list_remote_branches(&self) -> Result<Vec<BranchName>, GitError> {
        Ok(self
            .list_branches(git2::BranchType::Remote)?
            .into_iter()
            .filter_map(|name| {
                name.as_str()
                    .strip_prefix(&format!("{}/", self.remote_name))
                    .filter(|n| *n != "HEAD")
                    .and_then(|n| BranchName::new(n).ok())
            })
            .collect())
    }

    fn list_branches(&self, kind: git2::BranchType) -> Result<Vec<BranchName>, GitError> {
        let mut names = Vec::new();
        for entry in self.repo.branches(Some(kind))? {
            let (branch, _) = entry?;
            if let Some(name) = branch.name().ok().flatten() {
                // Skip names we cannot validate (e.g. "origin/HEAD")
                if let Ok(branch_name) = BranchName::new(name) {
                    names.push(branch_name);
                }
            }
        }
        Ok(names)
    }

    /// Create `branch` at the tip of `source`.
    ///
    /// # Errors
    ///
    /// - [`GitError::BranchExists`] if `branch` already exists
    /// - [`GitError::BranchNotFound`] if `source` does not exist
    pub fn create_branch_from(
        &self,
        branch: &BranchName,
        source: &BranchName,
    ) -> Result<Oid, GitError> {
        if self.try_branch_tip(branch)?.is_some() {
            return Err(GitError::BranchExists {
                branch: branch.to_string(),
            });
        }
        let tip = self.branch_tip(source)?;
        let commit = self.find_commit(&tip)?;
        self.repo.branch(branch.as_str(), &commit, false)?;
        Ok(tip)
    }

    /// Create a local branch tracking the remote ref of the same name.
    ///
    /// # Errors
    ///
    /// - [`GitError::RefNotFound`] if the remote-tracking ref is absent
    pub fn create_tracking_branch(&self, branch: &BranchName) -> Result<Oid, GitError> {
        let remote_ref = RefName::for_remote_branch(&self.remote_name, branch);
        let tip = self
            .try_resolve(remote_ref.as_str())?
            .ok_or_else(|| GitError::RefNotFound {
                refname: remote_ref.to_string(),
            })?;

        let commit = self.find_commit(&tip)?;
        let mut created = self.repo.branch(branch.as_str(), &commit, false)?;
        created.set_upstream(Some(&format!("{}/{}", self.remote_name, branch)))?;
        Ok(tip)
    }

    /// Delete a local branch.
    pub fn delete_branch(&self, branch: &BranchName) -> Result<(), GitError> {
        let mut found = self
            .repo
            .find_branch(branch.as_str(), git2::BranchType::Local)
            .map_err(|_| GitError::BranchNotFound {
                branch: branch.to_string(),
            })?;
        found.delete()?;
        Ok(())
    }

    /// Switch the working copy to `branch`, overwriting local file changes.
    ///
    /// Callers enforce the dirty-tree policy before switching; the forced
    /// checkout keeps the worktree in lockstep with the branch tip.
    pub fn checkout_branch(&self, branch: &BranchName) -> Result<(), GitError> {
        let refname = RefName::for_branch(branch);
        if self.try_branch_tip(branch)?.is_none() {
            return Err(GitError::BranchNotFound {
                branch: branch.to_string(),
            });
        }
        self.repo.set_head(refname.as_str())?;
        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.force().remove_untracked(true);
        self.repo.checkout_head(Some(&mut checkout))?;
        Ok(())
    }

    /// Point an unborn HEAD at `branch` without touching the worktree.
    pub fn set_head_unborn(&self, branch: &BranchName) -> Result<(), GitError> {
        self.repo
            .set_head(RefName::for_branch(branch).as_str())?;
        Ok(())
    }

    // =========================================================================
    // Working tree and commits
    // =========================================================================

    /// Working tree status summary, including untracked files.
    pub fn worktree_status(&self) -> Result<WorktreeStatus, GitError> {
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);

        let statuses = self.repo.statuses(Some(&mut opts))?;
        let mut result = WorktreeStatus::default();

        for entry in statuses.iter() {
            let status = entry.status();
            if status.is_conflicted() {
                result.has_conflicts = true;
            }
            if status.is_index_new()
                || status.is_index_modified()
                || status.is_index_deleted()
                || status.is_index_renamed()
                || status.is_index_typechange()
            {
                result.staged += 1;
            }
            if status.is_wt_modified()
                || status.is_wt_deleted()
                || status.is_wt_renamed()
                || status.is_wt_typechange()
            {
                result.unstaged += 1;
            }
            if status.is_wt_new() {
                result.untracked += 1;
            }
        }
        Ok(result)
    }

    /// Replace the working tree contents with `tree`.
    ///
    /// Everything except the `.git` directory is removed first, so the
    /// worktree becomes exactly the exported artifact.
    pub fn materialize(&self, tree: &FileTree) -> Result<(), GitError> {
        let root = self.workdir()?.to_path_buf();

        let entries = std::fs::read_dir(&root).map_err(|e| GitError::Io {
            message: format!("cannot read {}: {}", root.display(), e),
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| GitError::Io {
                message: e.to_string(),
            })?;
            if entry.file_name() == ".git" {
                continue;
            }
            let path = entry.path();
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            result.map_err(|e| GitError::Io {
                message: format!("cannot remove {}: {}", path.display(), e),
            })?;
        }

        for (path, content) in tree.iter() {
            let target = root.join(path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| GitError::Io {
                    message: format!("cannot create {}: {}", parent.display(), e),
                })?;
            }
            std::fs::write(&target, content).map_err(|e| GitError::Io {
                message: format!("cannot write {}: {}", target.display(), e),
            })?;
        }
        Ok(())
    }

    /// Stage every change in the working tree and return the staged tree id.
    pub fn stage_all(&self) -> Result<Oid, GitError> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        let tree_id = index.write_tree()?;
        Ok(Oid::new(tree_id.to_string())?)
    }

    /// Tree id of the HEAD commit, or `None` while HEAD is unborn.
    pub fn head_tree_id(&self) -> Result<Option<Oid>, GitError> {
        match self.head_oid()? {
            Some(oid) => {
                let commit = self.find_commit(&oid)?;
                Ok(Some(Oid::new(commit.tree_id().to_string())?))
            }
            None => Ok(None),
        }
    }

    /// Commit the staged index onto HEAD.
    pub fn commit_staged(
        &self,
        author: &CommitAuthor,
        message: &str,
    ) -> Result<Oid, GitError> {
        let signature = author.signature()?;
        let mut index = self.repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;

        let parent = match self.head_oid()? {
            Some(oid) => Some(self.find_commit(&oid)?),
            None => None,
        };
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

        let oid = self
            .repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
        Ok(Oid::new(oid.to_string())?)
    }

    /// Commit history of a branch, newest first.
    ///
    /// Ordered by commit time with topological parent order breaking ties.
    pub fn history(&self, branch: &BranchName) -> Result<Vec<CommitInfo>, GitError> {
        let tip = self.branch_tip(branch)?;

        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::TIME)?;
        revwalk.push(to_git_oid(&tip)?)?;

        let mut commits = Vec::new();
        for entry in revwalk {
            let oid = Oid::new(entry?.to_string())?;
            commits.push(self.commit_info(&oid)?);
        }
        Ok(commits)
    }

    /// Information about one commit.
    pub fn commit_info(&self, oid: &Oid) -> Result<CommitInfo, GitError> {
        let commit = self.find_commit(oid)?;
        let author = commit.author();
        let committed_at = DateTime::from_timestamp(commit.time().seconds(), 0)
            .unwrap_or(DateTime::UNIX_EPOCH)
            .with_timezone(&Utc);

        Ok(CommitInfo {
            oid: oid.clone(),
            summary: commit.summary().unwrap_or("").to_string(),
            message: commit.message().unwrap_or("").to_string(),
            author_name: author.name().unwrap_or("").to_string(),
            author_email: author.email().unwrap_or("").to_string(),
            committed_at,
        })
    }

    /// Snapshot the file tree of a commit into memory.
    pub fn tree_snapshot(&self, tip: &Oid) -> Result<FileTree, GitError> {
        let commit = self.find_commit(tip)?;
        let tree = commit.tree()?;

        let mut files = FileTree::new();
        let mut walk_error = None;
        tree.walk(git2::TreeWalkMode::PreOrder, |dir, entry| {
            if entry.kind() == Some(git2::ObjectType::Blob) {
                let name = entry.name().unwrap_or_default();
                let path = format!("{dir}{name}");
                match entry.to_object(&self.repo) {
                    Ok(object) => {
                        if let Some(blob) = object.as_blob() {
                            if let Err(e) = files.insert(&path, blob.content().to_vec()) {
                                walk_error = Some(GitError::Io {
                                    message: e.to_string(),
                                });
                                return git2::TreeWalkResult::Abort;
                            }
                        }
                    }
                    Err(e) => {
                        walk_error = Some(e.into());
                        return git2::TreeWalkResult::Abort;
                    }
                }
            }
            git2::TreeWalkResult::Ok
        })?;

        match walk_error {
            Some(e) => Err(e),
            None => Ok(files),
        }
    }

    // =========================================================================
    // Remote transfer
    // =========================================================================

    /// Fetch all branch heads from the configured remote.
    pub fn fetch(&self, auth: &RemoteAuth) -> Result<(), GitError> {
        let mut remote = self.repo.find_remote(&self.remote_name)?;
        let mut opts = git2::FetchOptions::new();
        opts.remote_callbacks(auth.callbacks());

        let refspec = format!("+refs/heads/*:refs/remotes/{}/*", self.remote_name);
        remote
            .fetch(&[refspec.as_str()], Some(&mut opts), None)
            .map_err(GitError::from_remote)?;
        Ok(())
    }

    /// Push a branch to the configured remote and update the local
    /// remote-tracking ref.
    ///
    /// # Errors
    ///
    /// - [`GitError::NonFastForward`] when the remote rejected the update
    /// - [`GitError::Auth`] / [`GitError::Network`] for transport failures
    pub fn push(&self, branch: &BranchName, auth: &RemoteAuth) -> Result<Oid, GitError> {
        let tip = self.branch_tip(branch)?;
        let mut remote = self.repo.find_remote(&self.remote_name)?;

        let rejection: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&rejection);
        let mut cbs = auth.callbacks();
        cbs.push_update_reference(move |_refname, status| {
            if let Some(message) = status {
                *sink.lock().expect("push rejection sink poisoned") = Some(message.to_string());
            }
            Ok(())
        });

        let mut opts = git2::PushOptions::new();
        opts.remote_callbacks(cbs);

        let refspec = format!(
            "refs/heads/{branch}:refs/heads/{branch}",
            branch = branch.as_str()
        );
        let pushed = remote.push(&[refspec.as_str()], Some(&mut opts));

        let rejection = rejection.lock().expect("push rejection sink poisoned").take();
        if let Some(message) = rejection {
            if message.contains("fast-forward") || message.contains("fetch first") {
                return Err(GitError::NonFastForward {
                    branch: branch.to_string(),
                });
            }
            return Err(GitError::Internal {
                message: format!("push rejected: {message}"),
            });
        }
        pushed.map_err(|e| {
            if e.code() == git2::ErrorCode::NotFastForward {
                GitError::NonFastForward {
                    branch: branch.to_string(),
                }
            } else {
                GitError::from_remote(e)
            }
        })?;

        // Keep the remote-tracking ref in step so ahead/behind stays accurate
        self.repo.reference(
            RefName::for_remote_branch(&self.remote_name, branch).as_str(),
            to_git_oid(&tip)?,
            true,
            "push: update tracking ref",
        )?;

        Ok(tip)
    }

    // =========================================================================
    // Merging
    // =========================================================================

    /// Classify how `their_tip` relates to the current HEAD.
    pub fn analyze(&self, their_tip: &Oid) -> Result<SyncTarget, GitError> {
        let annotated = self.repo.find_annotated_commit(to_git_oid(their_tip)?)?;
        let (analysis, _) = self.repo.merge_analysis(&[&annotated])?;

        if analysis.is_up_to_date() {
            Ok(SyncTarget::UpToDate)
        } else if analysis.is_fast_forward() {
            Ok(SyncTarget::FastForward)
        } else {
            Ok(SyncTarget::MergeRequired)
        }
    }

    /// Advance `branch` to `to` and synchronize the worktree.
    ///
    /// Only valid when `to` is a descendant of the branch tip.
    pub fn fast_forward(&self, branch: &BranchName, to: &Oid) -> Result<(), GitError> {
        let refname = RefName::for_branch(branch);
        let mut reference = self.repo.find_reference(refname.as_str())?;
        reference.set_target(to_git_oid(to)?, "fast-forward")?;
        self.repo.set_head(refname.as_str())?;
        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.force();
        self.repo.checkout_head(Some(&mut checkout))?;
        Ok(())
    }

    /// Merge `their_tip` into the current HEAD inside the worktree.
    ///
    /// On conflicts the index and worktree are left in the conflicted state
    /// for inspection; callers either surface it (pull) or roll back with
    /// [`GitWorkspace::abort_merge`] (merge).
    pub fn merge_into_head(
        &self,
        their_tip: &Oid,
        author: &CommitAuthor,
        message: &str,
    ) -> Result<MergeOutcome, GitError> {
        let annotated = self.repo.find_annotated_commit(to_git_oid(their_tip)?)?;

        let mut merge_opts = git2::MergeOptions::new();
        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.allow_conflicts(true).conflict_style_merge(true);
        self.repo
            .merge(&[&annotated], Some(&mut merge_opts), Some(&mut checkout))?;

        let mut index = self.repo.index()?;
        if index.has_conflicts() {
            return Ok(MergeOutcome::Conflicts {
                paths: conflict_paths(&index)?,
            });
        }

        let signature = author.signature()?;
        let tree_id = index.write_tree_to(&self.repo)?;
        let tree = self.repo.find_tree(tree_id)?;

        let head_oid = self.head_oid()?.ok_or_else(|| GitError::Internal {
            message: "cannot merge onto unborn HEAD".to_string(),
        })?;
        let ours = self.find_commit(&head_oid)?;
        let theirs = self.find_commit(their_tip)?;

        let merge_oid = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &[&ours, &theirs],
        )?;
        self.repo.cleanup_state()?;

        let mut sync = git2::build::CheckoutBuilder::new();
        sync.force();
        self.repo.checkout_head(Some(&mut sync))?;

        Ok(MergeOutcome::Clean {
            commit: Oid::new(merge_oid.to_string())?,
        })
    }

    /// Abort an in-progress merge, restoring the worktree to `snapshot`.
    pub fn abort_merge(&self, snapshot: &Oid) -> Result<(), GitError> {
        self.repo.cleanup_state()?;
        self.reset_hard(snapshot)
    }

    /// Hard-reset HEAD and the worktree to `target`.
    pub fn reset_hard(&self, target: &Oid) -> Result<(), GitError> {
        let object = self.repo.find_object(to_git_oid(target)?, None)?;
        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.force().remove_untracked(true);
        self.repo
            .reset(&object, git2::ResetType::Hard, Some(&mut checkout))?;
        Ok(())
    }

    /// Dry-run merge of `source_tip` into `dest_tip` entirely in memory.
    ///
    /// Neither the worktree nor any ref is touched.
    pub fn merge_preview(
        &self,
        source_tip: &Oid,
        dest_tip: &Oid,
    ) -> Result<MergePreview, GitError> {
        let ours = self.find_commit(dest_tip)?;
        let theirs = self.find_commit(source_tip)?;

        let index = self
            .repo
            .merge_commits(&ours, &theirs, Some(&git2::MergeOptions::new()))?;

        let conflicting = if index.has_conflicts() {
            conflict_paths(&index)?
        } else {
            Vec::new()
        };
        Ok(MergePreview { conflicting })
    }

    // =========================================================================
    // Ancestry
    // =========================================================================

    /// Merge base of two commits, or `None` without a common ancestor.
    pub fn merge_base(&self, a: &Oid, b: &Oid) -> Result<Option<Oid>, GitError> {
        match self.repo.merge_base(to_git_oid(a)?, to_git_oid(b)?) {
            Ok(oid) => Ok(Some(Oid::new(oid.to_string())?)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether `ancestor` is reachable from `descendant`.
    pub fn is_ancestor(&self, ancestor: &Oid, descendant: &Oid) -> Result<bool, GitError> {
        if ancestor == descendant {
            return Ok(true);
        }
        Ok(self
            .repo
            .graph_descendant_of(to_git_oid(descendant)?, to_git_oid(ancestor)?)?)
    }

    /// Commits unique to each side: `(ahead, behind)` of `local` relative
    /// to `upstream`.
    pub fn ahead_behind(&self, local: &Oid, upstream: &Oid) -> Result<(usize, usize), GitError> {
        Ok(self
            .repo
            .graph_ahead_behind(to_git_oid(local)?, to_git_oid(upstream)?)?)
    }

    fn find_commit(&self, oid: &Oid) -> Result<git2::Commit<'_>, GitError> {
        self.repo
            .find_commit(to_git_oid(oid)?)
            .map_err(|_| GitError::ObjectNotFound {
                oid: oid.to_string(),
            })
    }
}

/// Convert a validated [`Oid`] into a git2 oid.
fn to_git_oid(oid: &Oid) -> Result<git2::Oid, GitError> {
    git2::Oid::from_str(oid.as_str()).map_err(|e| GitError::InvalidId {
        message: format!("{}: {}", oid, e.message()),
    })
}

/// Sorted conflicting paths from a conflicted index.
fn conflict_paths(index: &git2::Index) -> Result<Vec<String>, GitError> {
    let mut paths = std::collections::BTreeSet::new();
    for conflict in index.conflicts()? {
        let conflict = conflict?;
        let entry = conflict.our.or(conflict.their).or(conflict.ancestor);
        if let Some(entry) = entry {
            paths.insert(String::from_utf8_lossy(&entry.path).into_owned());
        }
    }
    Ok(paths.into_iter().collect())
}
