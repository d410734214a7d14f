//! artifact::serializer
//!
//! The serializer boundary between application state and committed trees.
//!
//! # Determinism
//!
//! Exports must be deterministic: the same state always produces a
//! byte-identical tree, so working-tree diffs reflect real changes only.
//! [`JsonTreeSerializer`] achieves this with stable resource ordering and
//! canonical JSON rendering (sorted object keys).

use async_trait::async_trait;

use super::{ApplicationState, ArtifactError, FileTree};

/// Converts application state to and from its file-tree representation.
///
/// Implementations are supplied by the embedding application; the crate
/// ships [`JsonTreeSerializer`] as the default.
///
/// # Contract
///
/// - `export` is deterministic
/// - `import(export(state))` equals `state` under domain equality
#[async_trait]
pub trait ArtifactSerializer: Send + Sync {
    /// Render the state as a committable file tree.
    async fn export(&self, state: &ApplicationState) -> Result<FileTree, ArtifactError>;

    /// Reconstruct state from a committed file tree.
    async fn import(&self, tree: &FileTree) -> Result<ApplicationState, ArtifactError>;
}

/// Directory prefix holding serialized resources.
const RESOURCE_DIR: &str = "resources";

/// Default serializer: one pretty-printed JSON file per resource under
/// `resources/`.
///
/// Files outside `resources/` (a README committed remotely, for example)
/// are ignored on import and therefore survive untouched only in history,
/// not in re-exports.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTreeSerializer;

impl JsonTreeSerializer {
    fn resource_path(name: &str) -> String {
        format!("{RESOURCE_DIR}/{name}.json")
    }

    fn resource_name(path: &str) -> Option<&str> {
        path.strip_prefix("resources/")?
            .strip_suffix(".json")
            .filter(|name| !name.contains('/'))
    }
}

#[async_trait]
impl ArtifactSerializer for JsonTreeSerializer {
    async fn export(&self, state: &ApplicationState) -> Result<FileTree, ArtifactError> {
        let mut tree = FileTree::new();
        for (name, value) in state.iter() {
            let mut content = serde_json::to_vec_pretty(value)
                .map_err(|e| ArtifactError::ExportFailed(format!("{name}: {e}")))?;
            content.push(b'\n');
            tree.insert(&Self::resource_path(name), content)?;
        }
        Ok(tree)
    }

    async fn import(&self, tree: &FileTree) -> Result<ApplicationState, ArtifactError> {
        let mut state = ApplicationState::new();
        for (path, content) in tree.iter() {
            let Some(name) = Self::resource_name(path) else {
                continue;
            };
            let value: serde_json::Value = serde_json::from_slice(content)
                .map_err(|e| ArtifactError::ImportFailed(format!("{path}: {e}")))?;
            state.set_resource(name, value)?;
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_state() -> ApplicationState {
        let mut state = ApplicationState::new();
        state
            .set_resource("home-page", json!({"widgets": [{"kind": "text", "label": "hi"}]}))
            .unwrap();
        state
            .set_resource("settings", json!({"theme": "dark", "grid": 8}))
            .unwrap();
        state
    }

    #[tokio::test]
    async fn export_layout() {
        let tree = JsonTreeSerializer.export(&sample_state()).await.unwrap();
        assert_eq!(
            tree.paths(),
            vec!["resources/home-page.json", "resources/settings.json"]
        );
    }

    #[tokio::test]
    async fn export_is_deterministic() {
        let state = sample_state();
        let a = JsonTreeSerializer.export(&state).await.unwrap();
        let b = JsonTreeSerializer.export(&state).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[tokio::test]
    async fn roundtrip_preserves_state() {
        let state = sample_state();
        let tree = JsonTreeSerializer.export(&state).await.unwrap();
        let back = JsonTreeSerializer.import(&tree).await.unwrap();
        assert_eq!(state, back);
    }

    #[tokio::test]
    async fn import_ignores_foreign_files() {
        let state = sample_state();
        let mut tree = JsonTreeSerializer.export(&state).await.unwrap();
        tree.insert("README.md", b"# hello\n".to_vec()).unwrap();
        tree.insert("resources/nested/deep.json", b"{}".to_vec())
            .unwrap();

        let back = JsonTreeSerializer.import(&tree).await.unwrap();
        assert_eq!(state, back);
    }

    #[tokio::test]
    async fn import_rejects_malformed_json() {
        let mut tree = FileTree::new();
        tree.insert("resources/bad.json", b"{not json".to_vec())
            .unwrap();
        let err = JsonTreeSerializer.import(&tree).await.unwrap_err();
        assert!(matches!(err, ArtifactError::ImportFailed(_)));
    }

    #[tokio::test]
    async fn empty_state_exports_empty_tree() {
        let tree = JsonTreeSerializer
            .export(&ApplicationState::new())
            .await
            .unwrap();
        assert!(tree.is_empty());
    }
}
