//! Stack builders.
//!
//! Every builder reads the resolved configuration and returns a
//! [`SynthesizedStack`]. Builders that consume another stack's outputs read
//! them through [`SynthState::import`], which fails if the producing stack has
//! not been built yet. That makes a wrong build order a synthesis error
//! rather than a dangling reference.

pub mod api;
pub mod domain;
pub mod frontend;
pub mod identity;
pub mod media;
pub mod policy;
pub mod tables;

use crate::core::types::*;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::BTreeMap;

/// Mutable state threaded through one synthesis pass.
#[derive(Debug, Clone, Default)]
pub struct SynthState {
    /// Dereferenced API document, before any transform
    pub document: Value,
    /// Fingerprinted files of the assets directory
    pub assets: Vec<AssetFile>,
    /// Outputs of every stack built so far, by stack name
    pub outputs: IndexMap<String, IndexMap<String, String>>,
    /// Transformed API document, once the API stack is built
    pub api_definition: Option<Value>,
    pub skipped: Vec<SkippedBinding>,
}

impl SynthState {
    pub fn new(document: Value, assets: Vec<AssetFile>) -> Self {
        Self {
            document,
            assets,
            ..Self::default()
        }
    }

    /// Reference to an output of an already-built stack.
    pub fn import(&self, stack: &str, output: &str) -> Result<String, String> {
        let outputs = self
            .outputs
            .get(stack)
            .ok_or_else(|| format!("stack '{}' has not been built yet", stack))?;
        if !outputs.contains_key(output) {
            return Err(format!("stack '{}' has no output '{}'", stack, output));
        }
        Ok(import_token(stack, output))
    }

    /// Literal value of an output of an already-built stack.
    pub fn output_value(&self, stack: &str, output: &str) -> Option<&str> {
        self.outputs
            .get(stack)
            .and_then(|o| o.get(output))
            .map(|s| s.as_str())
    }
}

/// A provisioned compute unit and its gateway invoke permission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeUnit {
    /// Controller (resource) name
    pub resource: String,
    pub logical_id: String,
    pub function: FunctionSpec,
    pub permission: PermissionSpec,
}

/// Compute units keyed by resource name, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComputeUnits {
    pub units: IndexMap<String, ComputeUnit>,
}

impl ComputeUnits {
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn get(&self, resource: &str) -> Option<&ComputeUnit> {
        self.units.get(resource)
    }

    pub fn logical_ids(&self) -> Vec<String> {
        self.units.values().map(|u| u.logical_id.clone()).collect()
    }

    /// Set an environment binding on every unit.
    pub fn bind_all(&mut self, key: &str, value: &str) {
        for unit in self.units.values_mut() {
            unit.function
                .environment
                .insert(key.to_string(), value.to_string());
        }
    }

    /// Set several environment bindings on every unit.
    pub fn bind_all_from(&mut self, bindings: &BTreeMap<String, String>) {
        for (key, value) in bindings {
            self.bind_all(key, value);
        }
    }
}

/// Logical id of a resource scoped to a controller or table name.
pub fn logical_id(name: &str, suffix: &str) -> String {
    format!("{}-{}", name, suffix)
}

/// Uppercase a name for use in an environment binding key.
pub fn env_key_segment(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::core::parser::parse_config;
    use crate::core::resolver::resolve_stage;
    use crate::core::synth::synthesize_document;
    use crate::core::types::{ProjectConfig, SynthesizedApp};
    use serde_json::{json, Value};

    pub const PROJECT: &str = r#"
version: "1.0"
project: members
account: "123456789012"
region: eu-south-1
organization_prefix: idea
base_domain: example.org
stages:
  dev:
    domain: dev.example.org
  prod:
    domain: app.example.org
    alternative_domains: [www.example.org]
    retain_data: true
api:
  definition: openapi.yaml
  controllers:
    auth:
      is_authorizer: true
    books:
      paths: ["/books", "/books/{bookId}", "/books/{bookId}/cover"]
    topics:
      paths: ["/topics"]
      memory_mb: 1024
tables:
  books:
    partition_key: { name: bookId }
    indexes:
      - name: byTitle
        partition_key: { name: title }
  sessions:
    partition_key: { name: sessionId }
    sort_key: { name: userId }
    stream: new_and_old_images
    expires_at: expiresAt
shared_tables:
  badges:
    partition_key: { name: badge }
media:
  folders: [images, attachments, assets]
  assets_folder: assets
"#;

    pub fn config() -> ProjectConfig {
        parse_config(PROJECT).unwrap()
    }

    /// Full synthesis of the fixture project for `stage`.
    pub fn app(stage: &str) -> SynthesizedApp {
        let config = config();
        let ctx = resolve_stage(&config, stage).unwrap();
        synthesize_document(&ctx, document(), Vec::new()).unwrap()
    }

    pub fn document() -> Value {
        json!({
            "openapi": "3.0.3",
            "info": {"title": "Members", "version": "1.0.0"},
            "paths": {
                "/books": {
                    "get": {"operationId": "listBooks"},
                    "post": {"operationId": "createBook"}
                },
                "/books/{bookId}": {
                    "get": {"operationId": "getBook"},
                    "put": {"operationId": "updateBook"},
                    "delete": {"operationId": "deleteBook"}
                },
                "/topics": {"get": {"operationId": "listTopics"}}
            },
            "components": {
                "securitySchemes": {"auth": {"type": "apiKey"}}
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_requires_built_stack() {
        let mut state = SynthState::default();
        let err = state.import("members-media", "BucketName").unwrap_err();
        assert!(err.contains("not been built"));

        state.outputs.insert(
            "members-media".to_string(),
            IndexMap::from([("BucketName".to_string(), "members-media".to_string())]),
        );
        assert_eq!(
            state.import("members-media", "BucketName").unwrap(),
            "${import:members-media.BucketName}"
        );
        assert!(state
            .import("members-media", "Nope")
            .unwrap_err()
            .contains("no output 'Nope'"));
        assert_eq!(
            state.output_value("members-media", "BucketName"),
            Some("members-media")
        );
    }

    #[test]
    fn test_env_key_segment() {
        assert_eq!(env_key_segment("images"), "IMAGES");
        assert_eq!(env_key_segment("user-photos"), "USER_PHOTOS");
    }
}
