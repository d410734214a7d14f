//! Integration tests for the Git workspace doorway.
//!
//! These drive `GitWorkspace` against real repositories created with
//! tempfile, using the `git` CLI as the out-of-band oracle.

mod common;

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use gitloom::artifact::FileTree;
use gitloom::core::types::{BranchName, Oid};
use gitloom::git::{
    CommitAuthor, GitError, GitWorkspace, MergeOutcome, RemoteAuth, SyncTarget,
};

use common::{git_stdout, run_git};

fn branch(name: &str) -> BranchName {
    BranchName::new(name).unwrap()
}

fn author() -> CommitAuthor {
    CommitAuthor {
        name: "Test User".into(),
        email: "test@example.com".into(),
    }
}

fn tree_of(pairs: &[(&str, &str)]) -> FileTree {
    let mut tree = FileTree::new();
    for (path, content) in pairs {
        tree.insert(path, content.as_bytes().to_vec()).unwrap();
    }
    tree
}

/// A workspace wired to a bare remote, with an initial commit on `main`.
struct Fixture {
    workspace: GitWorkspace,
    remote_url: String,
    workdir: PathBuf,
    _dirs: (TempDir, TempDir),
}

impl Fixture {
    fn new() -> Self {
        let remote_dir = TempDir::new().unwrap();
        let work_parent = TempDir::new().unwrap();

        let remote_path = remote_dir.path().join("remote.git");
        std::fs::create_dir_all(&remote_path).unwrap();
        run_git(&remote_path, &["init", "--bare"]);
        run_git(&remote_path, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        let remote_url = remote_path.to_string_lossy().into_owned();

        let workdir = work_parent.path().join("work");
        std::fs::create_dir_all(&workdir).unwrap();
        let workspace =
            GitWorkspace::init(&workdir, &remote_url, "origin", &branch("main")).unwrap();

        workspace
            .materialize(&tree_of(&[("a.txt", "alpha\n"), ("b.txt", "beta\n")]))
            .unwrap();
        workspace.stage_all().unwrap();
        workspace.commit_staged(&author(), "Initial commit").unwrap();
        workspace.push(&branch("main"), &RemoteAuth::Anonymous).unwrap();

        Self {
            workspace,
            remote_url,
            workdir,
            _dirs: (remote_dir, work_parent),
        }
    }

    fn commit_tree(&self, pairs: &[(&str, &str)], message: &str) -> Oid {
        self.workspace.materialize(&tree_of(pairs)).unwrap();
        self.workspace.stage_all().unwrap();
        self.workspace.commit_staged(&author(), message).unwrap()
    }

    fn head_raw(&self) -> String {
        git_stdout(&self.workdir, &["rev-parse", "HEAD"])
    }
}

// =============================================================================
// Initialization and probing
// =============================================================================

#[test]
fn init_sets_unborn_head_and_remote() {
    let dir = TempDir::new().unwrap();
    let ws = GitWorkspace::init(dir.path(), "file:///nowhere", "origin", &branch("trunk")).unwrap();

    assert_eq!(ws.head_oid().unwrap(), None);
    assert_eq!(ws.current_branch().unwrap(), Some(branch("trunk")));
}

#[test]
fn probe_empty_remote_lists_nothing() {
    let empty = TempDir::new().unwrap();
    let bare = empty.path().join("bare.git");
    std::fs::create_dir_all(&bare).unwrap();
    run_git(&bare, &["init", "--bare"]);

    let heads =
        GitWorkspace::probe_remote(bare.to_str().unwrap(), &RemoteAuth::Anonymous).unwrap();
    assert!(heads.is_empty());
}

#[test]
fn probe_populated_remote_advertises_main() {
    let fixture = Fixture::new();
    let heads =
        GitWorkspace::probe_remote(&fixture.remote_url, &RemoteAuth::Anonymous).unwrap();
    assert!(heads.iter().any(|h| h.name == "refs/heads/main"));
    assert_eq!(
        GitWorkspace::default_branch_of(&heads),
        Some(branch("main"))
    );
}

#[test]
fn probe_unreachable_remote_fails() {
    let err = GitWorkspace::probe_remote("/definitely/not/there", &RemoteAuth::Anonymous)
        .unwrap_err();
    assert!(matches!(err, GitError::RemoteUnreachable { .. }));
}

#[test]
fn clone_checks_out_remote_content() {
    let fixture = Fixture::new();
    let target = TempDir::new().unwrap();
    let clone_dir = target.path().join("clone");

    let cloned =
        GitWorkspace::clone_from(&clone_dir, &fixture.remote_url, "origin", &RemoteAuth::Anonymous)
            .unwrap();
    assert_eq!(cloned.current_branch().unwrap(), Some(branch("main")));

    let tip = cloned.branch_tip(&branch("main")).unwrap();
    let snapshot = cloned.tree_snapshot(&tip).unwrap();
    assert_eq!(snapshot.get("a.txt"), Some(b"alpha\n".as_slice()));
}

// =============================================================================
// Working tree, staging, commits
// =============================================================================

#[test]
fn materialize_replaces_previous_content() {
    let fixture = Fixture::new();
    fixture
        .workspace
        .materialize(&tree_of(&[("c.txt", "gamma\n")]))
        .unwrap();

    assert!(!fixture.workdir.join("a.txt").exists());
    assert!(fixture.workdir.join("c.txt").exists());
    // The .git directory survives
    assert!(fixture.workdir.join(".git").exists());
}

#[test]
fn stage_all_covers_deletions() {
    let fixture = Fixture::new();
    fixture
        .workspace
        .materialize(&tree_of(&[("a.txt", "alpha\n")]))
        .unwrap();
    fixture.workspace.stage_all().unwrap();
    let oid = fixture
        .workspace
        .commit_staged(&author(), "Drop b.txt")
        .unwrap();

    let snapshot = fixture.workspace.tree_snapshot(&oid).unwrap();
    assert!(snapshot.get("b.txt").is_none());
    assert!(snapshot.get("a.txt").is_some());
}

#[test]
fn unchanged_tree_matches_head_tree_id() {
    let fixture = Fixture::new();
    fixture
        .workspace
        .materialize(&tree_of(&[("a.txt", "alpha\n"), ("b.txt", "beta\n")]))
        .unwrap();
    let staged = fixture.workspace.stage_all().unwrap();
    assert_eq!(fixture.workspace.head_tree_id().unwrap(), Some(staged));
}

#[test]
fn commit_advances_head() {
    let fixture = Fixture::new();
    let oid = fixture.commit_tree(&[("a.txt", "alpha 2\n"), ("b.txt", "beta\n")], "Edit a");
    assert_eq!(fixture.head_raw(), oid.as_str());
    assert_eq!(fixture.workspace.head_oid().unwrap(), Some(oid));
}

#[test]
fn history_is_newest_first() {
    let fixture = Fixture::new();
    let second = fixture.commit_tree(&[("a.txt", "2\n"), ("b.txt", "beta\n")], "Second");
    let third = fixture.commit_tree(&[("a.txt", "3\n"), ("b.txt", "beta\n")], "Third");

    let history = fixture.workspace.history(&branch("main")).unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].oid, third);
    assert_eq!(history[1].oid, second);
    assert_eq!(history[0].summary, "Third");
    assert_eq!(history[0].author_name, "Test User");
}

#[test]
fn worktree_status_counts_changes() {
    let fixture = Fixture::new();
    assert!(fixture.workspace.worktree_status().unwrap().is_clean());

    std::fs::write(fixture.workdir.join("a.txt"), "changed\n").unwrap();
    std::fs::write(fixture.workdir.join("new.txt"), "untracked\n").unwrap();

    let status = fixture.workspace.worktree_status().unwrap();
    assert_eq!(status.unstaged, 1);
    assert_eq!(status.untracked, 1);
    assert!(!status.is_clean());
}

// =============================================================================
// Branches and checkout
// =============================================================================

#[test]
fn create_branch_from_source_tip() {
    let fixture = Fixture::new();
    let main_tip = fixture.workspace.branch_tip(&branch("main")).unwrap();
    let created = fixture
        .workspace
        .create_branch_from(&branch("feature"), &branch("main"))
        .unwrap();
    assert_eq!(created, main_tip);

    let err = fixture
        .workspace
        .create_branch_from(&branch("feature"), &branch("main"))
        .unwrap_err();
    assert!(matches!(err, GitError::BranchExists { .. }));

    let err = fixture
        .workspace
        .create_branch_from(&branch("other"), &branch("ghost"))
        .unwrap_err();
    assert!(matches!(err, GitError::BranchNotFound { .. }));
}

#[test]
fn checkout_switches_worktree() {
    let fixture = Fixture::new();
    fixture
        .workspace
        .create_branch_from(&branch("feature"), &branch("main"))
        .unwrap();
    fixture.workspace.checkout_branch(&branch("feature")).unwrap();
    assert_eq!(
        fixture.workspace.current_branch().unwrap(),
        Some(branch("feature"))
    );

    fixture.commit_tree(&[("a.txt", "feature\n"), ("b.txt", "beta\n")], "Feature work");

    fixture.workspace.checkout_branch(&branch("main")).unwrap();
    assert_eq!(
        std::fs::read_to_string(fixture.workdir.join("a.txt")).unwrap(),
        "alpha\n"
    );
}

#[test]
fn tracking_branch_follows_remote_ref() {
    let fixture = Fixture::new();

    // Push a branch out of band, then fetch and track it
    let collaborator = TempDir::new().unwrap();
    run_git(collaborator.path(), &["clone", &fixture.remote_url, "."]);
    run_git(collaborator.path(), &["config", "user.email", "c@example.com"]);
    run_git(collaborator.path(), &["config", "user.name", "C"]);
    run_git(collaborator.path(), &["checkout", "-b", "shared"]);
    std::fs::write(collaborator.path().join("shared.txt"), "shared\n").unwrap();
    run_git(collaborator.path(), &["add", "-A"]);
    run_git(collaborator.path(), &["commit", "-m", "Shared branch"]);
    run_git(collaborator.path(), &["push", "origin", "shared"]);

    fixture.workspace.fetch(&RemoteAuth::Anonymous).unwrap();
    let tip = fixture
        .workspace
        .create_tracking_branch(&branch("shared"))
        .unwrap();
    assert_eq!(
        fixture.workspace.branch_tip(&branch("shared")).unwrap(),
        tip
    );
}

#[test]
fn delete_branch_removes_ref() {
    let fixture = Fixture::new();
    fixture
        .workspace
        .create_branch_from(&branch("doomed"), &branch("main"))
        .unwrap();
    fixture.workspace.delete_branch(&branch("doomed")).unwrap();
    assert!(fixture
        .workspace
        .try_branch_tip(&branch("doomed"))
        .unwrap()
        .is_none());
}

// =============================================================================
// Push, fetch, divergence
// =============================================================================

#[test]
fn push_updates_remote_and_tracking_ref() {
    let fixture = Fixture::new();
    let oid = fixture.commit_tree(&[("a.txt", "2\n"), ("b.txt", "beta\n")], "Edit");
    let pushed = fixture
        .workspace
        .push(&branch("main"), &RemoteAuth::Anonymous)
        .unwrap();
    assert_eq!(pushed, oid);
    assert_eq!(
        git_stdout(Path::new(&fixture.remote_url), &["rev-parse", "main"]),
        oid.as_str()
    );
    assert_eq!(
        fixture.workspace.remote_tip(&branch("main")).unwrap(),
        Some(oid)
    );
}

#[test]
fn push_to_diverged_remote_is_rejected() {
    let fixture = Fixture::new();

    // Remote advances out of band
    let collaborator = TempDir::new().unwrap();
    run_git(collaborator.path(), &["clone", &fixture.remote_url, "."]);
    run_git(collaborator.path(), &["config", "user.email", "c@example.com"]);
    run_git(collaborator.path(), &["config", "user.name", "C"]);
    std::fs::write(collaborator.path().join("remote.txt"), "remote\n").unwrap();
    run_git(collaborator.path(), &["add", "-A"]);
    run_git(collaborator.path(), &["commit", "-m", "Remote edit"]);
    run_git(collaborator.path(), &["push", "origin", "main"]);

    fixture.commit_tree(&[("a.txt", "local\n"), ("b.txt", "beta\n")], "Local edit");
    let err = fixture
        .workspace
        .push(&branch("main"), &RemoteAuth::Anonymous)
        .unwrap_err();
    assert!(matches!(err, GitError::NonFastForward { .. }));
}

#[test]
fn analyze_classifies_relationships() {
    let fixture = Fixture::new();
    let main_tip = fixture.workspace.branch_tip(&branch("main")).unwrap();
    assert_eq!(
        fixture.workspace.analyze(&main_tip).unwrap(),
        SyncTarget::UpToDate
    );

    // A descendant commit on another branch fast-forwards
    fixture
        .workspace
        .create_branch_from(&branch("ahead"), &branch("main"))
        .unwrap();
    fixture.workspace.checkout_branch(&branch("ahead")).unwrap();
    let ahead_tip = fixture.commit_tree(&[("a.txt", "2\n"), ("b.txt", "beta\n")], "Ahead");
    fixture.workspace.checkout_branch(&branch("main")).unwrap();
    assert_eq!(
        fixture.workspace.analyze(&ahead_tip).unwrap(),
        SyncTarget::FastForward
    );

    assert_eq!(
        fixture
            .workspace
            .ahead_behind(&main_tip, &ahead_tip)
            .unwrap(),
        (0, 1)
    );
    assert!(fixture
        .workspace
        .is_ancestor(&main_tip, &ahead_tip)
        .unwrap());
}

#[test]
fn fast_forward_moves_branch_and_tree() {
    let fixture = Fixture::new();
    fixture
        .workspace
        .create_branch_from(&branch("ahead"), &branch("main"))
        .unwrap();
    fixture.workspace.checkout_branch(&branch("ahead")).unwrap();
    let ahead_tip = fixture.commit_tree(&[("a.txt", "2\n"), ("b.txt", "beta\n")], "Ahead");
    fixture.workspace.checkout_branch(&branch("main")).unwrap();

    fixture
        .workspace
        .fast_forward(&branch("main"), &ahead_tip)
        .unwrap();
    assert_eq!(
        fixture.workspace.branch_tip(&branch("main")).unwrap(),
        ahead_tip
    );
    assert_eq!(
        std::fs::read_to_string(fixture.workdir.join("a.txt")).unwrap(),
        "2\n"
    );
}

// =============================================================================
// Merging
// =============================================================================

/// Build divergent branches: `feature` and `main` both edit from the same
/// base. When `conflicting`, both touch a.txt; otherwise disjoint files.
fn diverge(fixture: &Fixture, conflicting: bool) -> (Oid, Oid) {
    fixture
        .workspace
        .create_branch_from(&branch("feature"), &branch("main"))
        .unwrap();
    fixture.workspace.checkout_branch(&branch("feature")).unwrap();
    let feature_tip = if conflicting {
        fixture.commit_tree(&[("a.txt", "feature\n"), ("b.txt", "beta\n")], "Feature a")
    } else {
        fixture.commit_tree(
            &[("a.txt", "alpha\n"), ("b.txt", "beta\n"), ("f.txt", "f\n")],
            "Feature f",
        )
    };

    fixture.workspace.checkout_branch(&branch("main")).unwrap();
    let main_tip = if conflicting {
        fixture.commit_tree(&[("a.txt", "mainline\n"), ("b.txt", "beta\n")], "Main a")
    } else {
        fixture.commit_tree(
            &[("a.txt", "alpha\n"), ("b.txt", "beta\n"), ("m.txt", "m\n")],
            "Main m",
        )
    };
    (feature_tip, main_tip)
}

#[test]
fn merge_preview_reports_conflicts_without_mutation() {
    let fixture = Fixture::new();
    let (feature_tip, main_tip) = diverge(&fixture, true);

    let preview = fixture
        .workspace
        .merge_preview(&feature_tip, &main_tip)
        .unwrap();
    assert_eq!(preview.conflicting, vec!["a.txt"]);

    // Nothing moved
    assert_eq!(
        fixture.workspace.branch_tip(&branch("main")).unwrap(),
        main_tip
    );
    assert_eq!(
        fixture.workspace.branch_tip(&branch("feature")).unwrap(),
        feature_tip
    );
    assert!(fixture.workspace.worktree_status().unwrap().is_clean());
}

#[test]
fn merge_preview_clean_for_disjoint_edits() {
    let fixture = Fixture::new();
    let (feature_tip, main_tip) = diverge(&fixture, false);
    let preview = fixture
        .workspace
        .merge_preview(&feature_tip, &main_tip)
        .unwrap();
    assert!(preview.is_clean());
}

#[test]
fn clean_merge_commits_with_two_parents() {
    let fixture = Fixture::new();
    let (feature_tip, main_tip) = diverge(&fixture, false);

    let outcome = fixture
        .workspace
        .merge_into_head(&feature_tip, &author(), "Merge feature into main")
        .unwrap();
    let MergeOutcome::Clean { commit } = outcome else {
        panic!("expected a clean merge");
    };

    assert!(fixture.workspace.is_ancestor(&feature_tip, &commit).unwrap());
    assert!(fixture.workspace.is_ancestor(&main_tip, &commit).unwrap());

    let merged = fixture.workspace.tree_snapshot(&commit).unwrap();
    assert!(merged.get("f.txt").is_some());
    assert!(merged.get("m.txt").is_some());
}

#[test]
fn conflicted_merge_aborts_cleanly() {
    let fixture = Fixture::new();
    let (feature_tip, main_tip) = diverge(&fixture, true);

    let outcome = fixture
        .workspace
        .merge_into_head(&feature_tip, &author(), "Merge feature into main")
        .unwrap();
    let MergeOutcome::Conflicts { paths } = outcome else {
        panic!("expected conflicts");
    };
    assert_eq!(paths, vec!["a.txt"]);

    fixture.workspace.abort_merge(&main_tip).unwrap();
    assert_eq!(
        fixture.workspace.branch_tip(&branch("main")).unwrap(),
        main_tip
    );
    assert!(fixture.workspace.worktree_status().unwrap().is_clean());
    assert_eq!(
        std::fs::read_to_string(fixture.workdir.join("a.txt")).unwrap(),
        "mainline\n"
    );
}

#[test]
fn merge_base_of_diverged_branches() {
    let fixture = Fixture::new();
    let base = fixture.workspace.branch_tip(&branch("main")).unwrap();
    let (feature_tip, main_tip) = diverge(&fixture, false);

    assert_eq!(
        fixture
            .workspace
            .merge_base(&feature_tip, &main_tip)
            .unwrap(),
        Some(base)
    );
}
