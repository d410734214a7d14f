//! core::types
//!
//! Strong types for the domain vocabulary.
//!
//! # Types
//!
//! - [`ApplicationId`] / [`UserId`] - Identifiers for document-store records
//! - [`BranchName`] - Validated Git branch name
//! - [`RefName`] - Validated fully-qualified Git reference name
//! - [`Oid`] - Git object identifier (SHA)
//!
//! Git-facing names validate at construction time, so an invalid branch or
//! ref name cannot reach the git layer.
//!
//! # Examples
//!
//! ```
//! use gitloom::core::types::{BranchName, Oid};
//!
//! let branch = BranchName::new("feature/login").unwrap();
//! assert_eq!(branch.as_str(), "feature/login");
//!
//! assert!(BranchName::new("bad..name").is_err());
//! assert!(Oid::new("not-a-sha").is_err());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid ref name: {0}")]
    InvalidRefName(String),

    #[error("invalid object id: {0}")]
    InvalidOid(String),

    #[error("invalid user id: {0}")]
    InvalidUserId(String),

    #[error("invalid application id: {0}")]
    InvalidApplicationId(String),
}

/// Identifier of an application document.
///
/// Every branch of a connected repository has its own application document,
/// so the default application and each child carry distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(Uuid);

impl ApplicationId {
    /// Mint a fresh application id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an id from its canonical hyphenated form.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| TypeError::InvalidApplicationId(format!("{s}: {e}")))
    }
}

impl std::fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a user, as issued by the external auth collaborator.
///
/// The core does not interpret user ids; it only requires them to be
/// non-empty so profile lookups have a usable key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Create a new user id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidUserId` for empty or whitespace-only input.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(TypeError::InvalidUserId("user id cannot be empty".into()));
        }
        Ok(Self(id))
    }

    /// Get the user id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Characters Git rejects anywhere in a refname.
const REF_INVALID_CHARS: [char; 8] = [' ', '~', '^', ':', '\\', '?', '*', '['];

/// Validate a `/`-separated refname, shared by branch and ref validation.
///
/// Enforces the `git check-ref-format` rules that apply to both forms:
/// no empty name, no `..`/`@{`/`//`, no control characters, no reserved
/// punctuation, and per-component restrictions on `.` and `.lock`.
fn validate_ref_syntax(name: &str, err: impl Fn(String) -> TypeError) -> Result<(), TypeError> {
    if name.is_empty() {
        return Err(err("name cannot be empty".into()));
    }
    if name.ends_with('/') {
        return Err(err("name cannot end with '/'".into()));
    }
    if name.ends_with(".lock") {
        return Err(err("name cannot end with '.lock'".into()));
    }
    for needle in ["..", "@{", "//"] {
        if name.contains(needle) {
            return Err(err(format!("name cannot contain '{needle}'")));
        }
    }
    for c in REF_INVALID_CHARS {
        if name.contains(c) {
            return Err(err(format!("name cannot contain '{c}'")));
        }
    }
    if name.chars().any(|c| c.is_ascii_control()) {
        return Err(err("name cannot contain control characters".into()));
    }
    for component in name.split('/') {
        if component.starts_with('.') {
            return Err(err("path component cannot start with '.'".into()));
        }
        if component.ends_with(".lock") {
            return Err(err("path component cannot end with '.lock'".into()));
        }
    }
    Ok(())
}

/// A validated Git branch name.
///
/// Conforms to Git's refname rules (see `git check-ref-format`): cannot be
/// empty, start with `.` or `-`, end with `.lock` or `/`, contain `..`,
/// `@{`, `//`, control characters, or reserved punctuation, and cannot be
/// exactly `@`.
///
/// # Example
///
/// ```
/// use gitloom::core::types::BranchName;
///
/// let name = BranchName::new("release/2024.1").unwrap();
/// assert_eq!(name.as_str(), "release/2024.1");
///
/// assert!(BranchName::new("").is_err());
/// assert!(BranchName::new("-flag").is_err());
/// assert!(BranchName::new("has space").is_err());
/// assert!(BranchName::new("@").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` if the name violates Git's
    /// refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if name == "@" {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot be '@' (reserved)".into(),
            ));
        }
        if name.starts_with('.') || name.starts_with('-') {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot start with '.' or '-'".into(),
            ));
        }
        validate_ref_syntax(&name, TypeError::InvalidBranchName)?;
        Ok(Self(name))
    }

    /// Get the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated fully-qualified Git reference name.
///
/// # Example
///
/// ```
/// use gitloom::core::types::{BranchName, RefName};
///
/// let branch = BranchName::new("feature/login").unwrap();
/// assert_eq!(RefName::for_branch(&branch).as_str(), "refs/heads/feature/login");
/// assert_eq!(
///     RefName::for_remote_branch("origin", &branch).as_str(),
///     "refs/remotes/origin/feature/login"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RefName(String);

impl RefName {
    /// Create a new validated ref name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRefName` if the name violates Git's
    /// refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if name.starts_with('/') {
            return Err(TypeError::InvalidRefName(
                "ref name cannot start with '/'".into(),
            ));
        }
        validate_ref_syntax(&name, TypeError::InvalidRefName)?;
        Ok(Self(name))
    }

    /// Ref name for a local branch (`refs/heads/<branch>`).
    pub fn for_branch(branch: &BranchName) -> Self {
        // Branch names are validated, the prefix keeps the result valid
        Self(format!("refs/heads/{}", branch.as_str()))
    }

    /// Ref name for a remote-tracking branch (`refs/remotes/<remote>/<branch>`).
    pub fn for_remote_branch(remote: &str, branch: &BranchName) -> Self {
        Self(format!("refs/remotes/{}/{}", remote, branch.as_str()))
    }

    /// Strip a prefix and return the remainder, or `None` if absent.
    pub fn strip_prefix(&self, prefix: &str) -> Option<&str> {
        self.0.strip_prefix(prefix)
    }

    /// Whether this ref lives under `refs/heads/`.
    pub fn is_branch_ref(&self) -> bool {
        self.0.starts_with("refs/heads/")
    }

    /// Get the ref name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RefName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RefName> for String {
    fn from(name: RefName) -> Self {
        name.0
    }
}

impl std::fmt::Display for RefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A Git object identifier (SHA-1 or SHA-256), normalized to lowercase.
///
/// # Example
///
/// ```
/// use gitloom::core::types::Oid;
///
/// let oid = Oid::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
/// assert_eq!(oid.as_str(), "abc123def4567890abc123def4567890abc12345");
/// assert_eq!(oid.short(7), "abc123d");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    /// Create a new validated object id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidOid` unless the input is 40 or 64 hex
    /// characters.
    pub fn new(oid: impl Into<String>) -> Result<Self, TypeError> {
        let oid = oid.into().to_ascii_lowercase();
        if oid.len() != 40 && oid.len() != 64 {
            return Err(TypeError::InvalidOid(format!(
                "expected 40 or 64 hex characters, got {}",
                oid.len()
            )));
        }
        if !oid.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidOid(
                "object id must be hexadecimal".into(),
            ));
        }
        Ok(Self(oid))
    }

    /// Abbreviated form: the first `len` characters (clamped to full length).
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }

    /// Get the object id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Oid {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}

impl AsRef<str> for Oid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
