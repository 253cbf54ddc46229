//! Project file parsing and validation.
//!
//! Parses stackwright.yaml and validates structural constraints:
//! - Version must be "1.0"
//! - Project key, controller names and paths are well-formed
//! - At most one authorizer controller
//! - Table keys and index names are sane, table names unique
//! - The assets folder is one of the media folders
//!
//! Validation never opens the API document; path mismatches surface during
//! synthesis.

use super::types::*;
use crate::stacks::env_key_segment;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

fn project_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9-]*$").expect("static regex"))
}

fn resource_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex"))
}

/// Parse a stackwright.yaml file from disk.
pub fn parse_config_file(path: &Path) -> Result<ProjectConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_config(&content)
}

/// Parse a stackwright.yaml from a string.
pub fn parse_config(yaml: &str) -> Result<ProjectConfig, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
pub fn validate_config(config: &ProjectConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut push = |message: String| errors.push(ValidationError { message });

    if config.version != "1.0" {
        push(format!("version must be \"1.0\", got \"{}\"", config.version));
    }

    if config.project.is_empty() {
        push("project must not be empty".to_string());
    } else if !project_key_re().is_match(&config.project) {
        push(format!(
            "project '{}' must be lowercase letters, digits and dashes",
            config.project
        ));
    }

    if config.account.is_empty() {
        push("account must not be empty".to_string());
    }
    if config.region.is_empty() {
        push("region must not be empty".to_string());
    }
    if config.organization_prefix.is_empty() {
        push("organization_prefix must not be empty".to_string());
    }

    // Stages
    if config.stages.is_empty() {
        push("at least one stage is required".to_string());
    }
    for (name, stage) in &config.stages {
        if !project_key_re().is_match(name) {
            push(format!(
                "stage '{}' must be lowercase letters, digits and dashes",
                name
            ));
        }
        if stage.domain.is_empty() {
            push(format!("stage '{}' has no domain", name));
        }
        if stage.alternative_domains.contains(&stage.domain) {
            push(format!(
                "stage '{}' lists its domain as an alternative domain",
                name
            ));
        }
    }

    // Controllers
    let authorizers: Vec<&String> = config
        .api
        .controllers
        .iter()
        .filter(|(_, c)| c.is_authorizer)
        .map(|(name, _)| name)
        .collect();
    if authorizers.len() > 1 {
        let names: Vec<&str> = authorizers.iter().map(|s| s.as_str()).collect();
        push(format!(
            "only one authorizer controller allowed, found: {}",
            names.join(", ")
        ));
    }
    for (name, controller) in &config.api.controllers {
        if !resource_name_re().is_match(name) {
            push(format!("controller name '{}' is not a valid resource name", name));
        }
        let mut seen = HashSet::new();
        for path in &controller.paths {
            if !path.starts_with('/') {
                push(format!(
                    "controller '{}' path '{}' must start with '/'",
                    name, path
                ));
            }
            if !seen.insert(path) {
                push(format!("controller '{}' lists path '{}' twice", name, path));
            }
        }
        if controller.memory_mb == Some(0) {
            push(format!("controller '{}' memory_mb must be positive", name));
        }
        if controller.timeout_seconds == Some(0) {
            push(format!("controller '{}' timeout_seconds must be positive", name));
        }
    }

    // Tables
    for (name, schema) in config.tables.iter().chain(config.shared_tables.iter()) {
        validate_table(name, schema, &mut push);
    }
    for name in config.tables.keys() {
        if config.shared_tables.contains_key(name) {
            push(format!(
                "table '{}' is declared both as a stage table and a shared table",
                name
            ));
        }
    }

    // Media
    if let Some(ref assets) = config.media.assets_folder {
        if !config.media.folders.contains(assets) {
            push(format!(
                "assets folder '{}' is not one of the media folders",
                assets
            ));
        }
    }
    let mut folder_keys: HashMap<String, &str> = HashMap::new();
    for folder in &config.media.folders {
        if folder.is_empty() || folder.contains('/') {
            push(format!("media folder '{}' must be a single path segment", folder));
        }
        let key = format!("S3_{}_FOLDER", env_key_segment(folder));
        if let Some(first) = folder_keys.insert(key.clone(), folder) {
            push(format!(
                "media folders '{}' and '{}' both bind {}",
                first, folder, key
            ));
        }
    }

    errors
}

fn validate_table(name: &str, schema: &TableSchema, push: &mut impl FnMut(String)) {
    if !resource_name_re().is_match(name) {
        push(format!("table name '{}' is not a valid resource name", name));
    }
    if schema.partition_key.name.is_empty() {
        push(format!("table '{}' has an empty partition key", name));
    }
    if let Some(ref sk) = schema.sort_key {
        if sk.name.is_empty() {
            push(format!("table '{}' has an empty sort key", name));
        }
    }
    let mut index_names = HashSet::new();
    for index in &schema.indexes {
        if !index_names.insert(index.name.as_str()) {
            push(format!(
                "table '{}' declares index '{}' twice",
                name, index.name
            ));
        }
        if index.partition_key.name.is_empty() {
            push(format!(
                "table '{}' index '{}' has an empty partition key",
                name, index.name
            ));
        }
    }
    if let Some(ref ttl) = schema.expires_at {
        if ttl.is_empty() {
            push(format!("table '{}' has an empty expiry attribute", name));
        }
    }
}
