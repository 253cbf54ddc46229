//! Input drift: compare the files a synthesis read against the hashes
//! recorded in its lock.

use crate::core::types::SynthLock;
use crate::provenance::hasher;
use std::path::Path;

/// A single drift finding.
#[derive(Debug, Clone)]
pub struct DriftFinding {
    /// Which input drifted (`config`, `api_definition`, `assets`)
    pub input: String,
    pub path: String,
    pub expected_hash: String,
    pub actual_hash: String,
    pub detail: String,
}

/// Check one recorded input (file or directory) for drift.
pub fn check_input_drift(input: &str, path: &str, expected_hash: &str) -> Option<DriftFinding> {
    let input_path = Path::new(path);
    if !input_path.exists() {
        return Some(DriftFinding {
            input: input.to_string(),
            path: path.to_string(),
            expected_hash: expected_hash.to_string(),
            actual_hash: "MISSING".to_string(),
            detail: format!("{} does not exist", path),
        });
    }

    let actual = if input_path.is_dir() {
        hasher::hash_directory(input_path).unwrap_or_else(|e| format!("ERROR:{}", e))
    } else {
        hasher::hash_file(input_path).unwrap_or_else(|e| format!("ERROR:{}", e))
    };

    if actual != expected_hash {
        Some(DriftFinding {
            input: input.to_string(),
            path: path.to_string(),
            expected_hash: expected_hash.to_string(),
            actual_hash: actual,
            detail: format!("{} changed since last synthesis", path),
        })
    } else {
        None
    }
}

/// Check every input recorded in a lock.
pub fn detect_drift(lock: &SynthLock) -> Vec<DriftFinding> {
    let inputs = &lock.inputs;
    let mut checks = vec![
        ("config", inputs.config_path.as_str(), inputs.config.as_str()),
        (
            "api_definition",
            inputs.api_definition_path.as_str(),
            inputs.api_definition.as_str(),
        ),
    ];
    if let (Some(path), Some(hash)) = (&inputs.assets_path, &inputs.assets) {
        checks.push(("assets", path.as_str(), hash.as_str()));
    }

    checks
        .into_iter()
        .filter(|(_, path, _)| !path.is_empty())
        .filter_map(|(input, path, hash)| check_input_drift(input, path, hash))
        .collect()
}
