//! git
//!
//! Single interface for all Git operations.
//!
//! All repository reads and writes flow through [`GitWorkspace`]; no other
//! module imports `git2`. Errors are normalized into the typed
//! [`GitError`] categories so higher layers can map them onto the service
//! error taxonomy.

mod workspace;

pub use workspace::{
    CommitAuthor, CommitInfo, GitError, GitWorkspace, MergeOutcome, MergePreview, RemoteAuth,
    RemoteHeadInfo, SyncTarget, WorktreeStatus,
};

/// Derive a browser-facing URL from a remote URL.
///
/// Handles the two common remote forms:
/// - `https://host/owner/repo.git` -> `https://host/owner/repo`
/// - `git@host:owner/repo.git` -> `https://host/owner/repo`
///
/// Returns `None` when the URL matches neither form (e.g. `file://` remotes).
///
/// # Example
///
/// ```
/// use gitloom::git::browser_url;
///
/// assert_eq!(
///     browser_url("git@github.com:acme/site.git").as_deref(),
///     Some("https://github.com/acme/site")
/// );
/// assert_eq!(
///     browser_url("https://gitlab.com/acme/site.git").as_deref(),
///     Some("https://gitlab.com/acme/site")
/// );
/// assert_eq!(browser_url("file:///tmp/repo.git"), None);
/// ```
pub fn browser_url(remote: &str) -> Option<String> {
    if let Some(rest) = remote.strip_prefix("https://") {
        let rest = rest.strip_suffix(".git").unwrap_or(rest);
        let (host, path) = rest.split_once('/')?;
        if host.is_empty() || path.is_empty() {
            return None;
        }
        return Some(format!("https://{host}/{path}"));
    }

    if let Some(rest) = remote.strip_prefix("git@") {
        let (host, path) = rest.split_once(':')?;
        let path = path.strip_suffix(".git").unwrap_or(path);
        if host.is_empty() || path.is_empty() {
            return None;
        }
        return Some(format!("https://{host}/{path}"));
    }

    None
}
