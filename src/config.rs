// Protolens Configuration
// Import search roots, read from LSP initialization options and settings

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Resolver configuration.
///
/// `import_paths` is the ordered list of directories searched for import
/// literals. An empty list is legal; the backend seeds it with the
/// workspace root before first use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerConfig {
    #[serde(default, rename = "importPath", alias = "importPaths")]
    pub import_paths: Vec<PathBuf>,
}

impl AnalyzerConfig {
    pub fn new(import_paths: Vec<PathBuf>) -> Self {
        Self { import_paths }
    }

    /// Reads the configuration from a settings object.
    ///
    /// Accepts both `{"importPath": [...]}` and `{"protolens": {"importPath": [...]}}`.
    /// Returns `None` when the value carries no recognizable configuration.
    pub fn from_settings(value: &Value) -> Option<Self> {
        let section = match value.get("protolens") {
            Some(nested) => nested,
            None => value,
        };
        if section.get("importPath").is_none() && section.get("importPaths").is_none() {
            return None;
        }
        match serde_json::from_value::<AnalyzerConfig>(section.clone()) {
            Ok(config) => Some(config),
            Err(err) => {
                tracing::warn!("ignoring malformed configuration: {}", err);
                None
            }
        }
    }

    /// Appends a root unless it is already listed.
    pub fn push_root(&mut self, root: impl Into<PathBuf>) {
        let root = root.into();
        if !self.import_paths.contains(&root) {
            self.import_paths.push(root);
        }
    }

    /// Merges `other` into `self`, keeping order and dropping duplicates.
    pub fn extend(&mut self, other: AnalyzerConfig) {
        for root in other.import_paths {
            self.push_root(root);
        }
    }
}
