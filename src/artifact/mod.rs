//! artifact
//!
//! The canonical artifact representations on both sides of the serializer
//! boundary: [`ApplicationState`] (the live, structured application
//! definition) and [`FileTree`] (its committed file form).
//!
//! Domain equality for application state is structural equality of its
//! resource map; the round-trip property `import(export(state)) == state`
//! is part of the serializer contract.

mod serializer;

pub use serializer::{ArtifactSerializer, JsonTreeSerializer};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from artifact handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArtifactError {
    /// Resource or file name unusable as a tree path.
    #[error("invalid artifact path: {0}")]
    InvalidPath(String),

    /// Failure turning application state into a file tree.
    #[error("artifact export failed: {0}")]
    ExportFailed(String),

    /// Failure turning a file tree back into application state.
    #[error("artifact import failed: {0}")]
    ImportFailed(String),
}

/// Validate a resource name: path-safe, visible, single-segment.
fn validate_resource_name(name: &str) -> Result<(), ArtifactError> {
    if name.is_empty() {
        return Err(ArtifactError::InvalidPath(
            "resource name cannot be empty".into(),
        ));
    }
    if name.starts_with('.') {
        return Err(ArtifactError::InvalidPath(
            "resource name cannot start with '.'".into(),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(ArtifactError::InvalidPath(format!(
            "resource name contains unsupported characters: {name}"
        )));
    }
    Ok(())
}

/// The live application definition: a named map of structured resources.
///
/// Resource values are opaque JSON documents owned by the application's
/// business model; the core only requires names to be path-safe and the
/// map ordering to be stable (`BTreeMap`) so exports are deterministic.
///
/// # Example
///
/// ```
/// use gitloom::artifact::ApplicationState;
/// use serde_json::json;
///
/// let mut state = ApplicationState::new();
/// state.set_resource("home-page", json!({"widgets": []})).unwrap();
/// assert_eq!(state.resource_names(), vec!["home-page"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationState {
    resources: BTreeMap<String, serde_json::Value>,
}

impl ApplicationState {
    /// Empty application state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a resource.
    ///
    /// # Errors
    ///
    /// - [`ArtifactError::InvalidPath`] for names that cannot become file
    ///   paths
    pub fn set_resource(
        &mut self,
        name: &str,
        value: serde_json::Value,
    ) -> Result<(), ArtifactError> {
        validate_resource_name(name)?;
        self.resources.insert(name.to_string(), value);
        Ok(())
    }

    /// Remove a resource; returns its previous value if present.
    pub fn remove_resource(&mut self, name: &str) -> Option<serde_json::Value> {
        self.resources.remove(name)
    }

    /// Look up a resource by name.
    pub fn resource(&self, name: &str) -> Option<&serde_json::Value> {
        self.resources.get(name)
    }

    /// Resource names in stable order.
    pub fn resource_names(&self) -> Vec<&str> {
        self.resources.keys().map(String::as_str).collect()
    }

    /// Iterate resources in stable order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.resources.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the state holds no resources.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// A file-tree representation of an artifact: relative path to content.
///
/// Paths are `/`-separated, relative, and may not contain `..` segments;
/// ordering is stable so two equal trees are byte-identical.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTree {
    files: BTreeMap<String, Vec<u8>>,
}

impl FileTree {
    /// Empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file.
    ///
    /// # Errors
    ///
    /// - [`ArtifactError::InvalidPath`] for absolute paths, `..` segments,
    ///   or empty components
    pub fn insert(&mut self, path: &str, content: Vec<u8>) -> Result<(), ArtifactError> {
        if path.is_empty() || path.starts_with('/') || path.ends_with('/') {
            return Err(ArtifactError::InvalidPath(format!(
                "tree path must be relative and non-empty: {path:?}"
            )));
        }
        for segment in path.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(ArtifactError::InvalidPath(format!(
                    "tree path contains invalid segment: {path:?}"
                )));
            }
        }
        self.files.insert(path.to_string(), content);
        Ok(())
    }

    /// Look up a file's content.
    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// Paths in stable order.
    pub fn paths(&self) -> Vec<&str> {
        self.files.keys().map(String::as_str).collect()
    }

    /// Iterate `(path, content)` in stable order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Vec<u8>)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the tree holds no files.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Paths whose content differs between the two trees, including files
    /// present on only one side. Sorted.
    pub fn changed_paths(&self, other: &FileTree) -> Vec<String> {
        let mut changed = Vec::new();
        for (path, content) in &self.files {
            match other.files.get(path) {
                Some(theirs) if theirs == content => {}
                _ => changed.push(path.clone()),
            }
        }
        for path in other.files.keys() {
            if !self.files.contains_key(path) {
                changed.push(path.clone());
            }
        }
        changed.sort();
        changed.dedup();
        changed
    }

    /// Content fingerprint: SHA-256 over the length-prefixed path/content
    /// sequence in stable order. Equal trees always fingerprint equal.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (path, content) in &self.files {
            hasher.update((path.len() as u64).to_be_bytes());
            hasher.update(path.as_bytes());
            hasher.update((content.len() as u64).to_be_bytes());
            hasher.update(content);
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    mod application_state {
        use super::*;

        #[test]
        fn set_and_get() {
            let mut state = ApplicationState::new();
            state.set_resource("page", json!({"n": 1})).unwrap();
            assert_eq!(state.resource("page"), Some(&json!({"n": 1})));
            assert_eq!(state.len(), 1);
        }

        #[test]
        fn names_are_sorted() {
            let mut state = ApplicationState::new();
            state.set_resource("zeta", json!(1)).unwrap();
            state.set_resource("alpha", json!(2)).unwrap();
            assert_eq!(state.resource_names(), vec!["alpha", "zeta"]);
        }

        #[test]
        fn invalid_names_rejected() {
            let mut state = ApplicationState::new();
            for name in ["", ".hidden", "a/b", "a b", "a\\b"] {
                assert!(state.set_resource(name, json!(null)).is_err(), "{name:?}");
            }
        }

        #[test]
        fn remove_returns_value() {
            let mut state = ApplicationState::new();
            state.set_resource("page", json!(1)).unwrap();
            assert_eq!(state.remove_resource("page"), Some(json!(1)));
            assert!(state.is_empty());
        }

        #[test]
        fn equality_is_structural() {
            let mut a = ApplicationState::new();
            let mut b = ApplicationState::new();
            a.set_resource("x", json!({"k": [1, 2]})).unwrap();
            b.set_resource("x", json!({"k": [1, 2]})).unwrap();
            assert_eq!(a, b);

            b.set_resource("x", json!({"k": [1, 3]})).unwrap();
            assert_ne!(a, b);
        }
    }

    mod file_tree {
        use super::*;

        #[test]
        fn insert_and_get() {
            let mut tree = FileTree::new();
            tree.insert("resources/page.json", b"{}".to_vec()).unwrap();
            assert_eq!(tree.get("resources/page.json"), Some(b"{}".as_slice()));
        }

        #[test]
        fn invalid_paths_rejected() {
            let mut tree = FileTree::new();
            for path in ["", "/abs", "a//b", "a/../b", "./a", "trailing/"] {
                assert!(tree.insert(path, vec![]).is_err(), "{path:?}");
            }
        }

        #[test]
        fn changed_paths_symmetric_difference() {
            let mut a = FileTree::new();
            let mut b = FileTree::new();
            a.insert("same.json", b"x".to_vec()).unwrap();
            b.insert("same.json", b"x".to_vec()).unwrap();
            a.insert("edited.json", b"old".to_vec()).unwrap();
            b.insert("edited.json", b"new".to_vec()).unwrap();
            a.insert("only-a.json", b"a".to_vec()).unwrap();
            b.insert("only-b.json", b"b".to_vec()).unwrap();

            assert_eq!(
                a.changed_paths(&b),
                vec!["edited.json", "only-a.json", "only-b.json"]
            );
            assert_eq!(a.changed_paths(&b), b.changed_paths(&a));
        }

        #[test]
        fn fingerprint_tracks_content() {
            let mut a = FileTree::new();
            let mut b = FileTree::new();
            a.insert("f.json", b"1".to_vec()).unwrap();
            b.insert("f.json", b"1".to_vec()).unwrap();
            assert_eq!(a.fingerprint(), b.fingerprint());

            b.insert("f.json", b"2".to_vec()).unwrap();
            assert_ne!(a.fingerprint(), b.fingerprint());
        }

        #[test]
        fn fingerprint_not_confused_by_boundaries() {
            // "ab" + "c" must not collide with "a" + "bc"
            let mut a = FileTree::new();
            let mut b = FileTree::new();
            a.insert("ab", b"c".to_vec()).unwrap();
            b.insert("a", b"bc".to_vec()).unwrap();
            assert_ne!(a.fingerprint(), b.fingerprint());
        }
    }
}
