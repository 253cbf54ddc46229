//! API definition documents: loading, `$ref` resolution, and the pure
//! transforms that wire CORS, compute bindings and the authorizer into them.

pub mod loader;
pub mod transform;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Where API documents (the root and any externally referenced files) come from.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Load and parse the document at `location`.
    async fn load(&self, location: &str) -> Result<Value, String>;
}

/// Reads documents from disk, relative to a base directory.
#[derive(Debug, Clone)]
pub struct FileSource {
    base_dir: PathBuf,
}

impl FileSource {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn resolve(&self, location: &str) -> PathBuf {
        self.base_dir.join(location)
    }
}

#[async_trait]
impl DocumentSource for FileSource {
    async fn load(&self, location: &str) -> Result<Value, String> {
        let path = self.resolve(location);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("cannot read API definition {}: {}", path.display(), e))?;
        parse_document(&content, &path)
    }
}

/// In-memory documents keyed by location.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    documents: HashMap<String, Value>,
}

impl StaticSource {
    pub fn with(mut self, location: &str, document: Value) -> Self {
        self.documents.insert(location.to_string(), document);
        self
    }
}

#[async_trait]
impl DocumentSource for StaticSource {
    async fn load(&self, location: &str) -> Result<Value, String> {
        self.documents
            .get(location)
            .cloned()
            .ok_or_else(|| format!("no document at '{}'", location))
    }
}

/// Parse YAML or JSON (by extension) into a JSON value.
pub fn parse_document(content: &str, path: &Path) -> Result<Value, String> {
    let is_json = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if is_json {
        serde_json::from_str(content)
            .map_err(|e| format!("JSON parse error in {}: {}", path.display(), e))
    } else {
        serde_yaml_ng::from_str(content)
            .map_err(|e| format!("YAML parse error in {}: {}", path.display(), e))
    }
}
