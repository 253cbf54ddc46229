//! Synthesis lock file: load, save (atomic), path derivation, construction.

use super::planner;
use super::types::{InputHashes, ResourceLock, SynthLock, SynthesizedApp};
use crate::provenance::hasher;
use std::path::{Path, PathBuf};

/// Derive the lock file path for a stage within the state directory.
pub fn lock_file_path(state_dir: &Path, stage: &str) -> PathBuf {
    state_dir.join(stage).join("synth.lock.yaml")
}

/// Load the lock file of a stage. Returns None if the file doesn't exist.
pub fn load_lock(state_dir: &Path, stage: &str) -> Result<Option<SynthLock>, String> {
    let path = lock_file_path(state_dir, stage);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let lock: SynthLock = serde_yaml_ng::from_str(&content)
        .map_err(|e| format!("invalid lock file {}: {}", path.display(), e))?;
    Ok(Some(lock))
}

/// Save a lock file atomically (write to temp, then rename).
pub fn save_lock(state_dir: &Path, lock: &SynthLock) -> Result<(), String> {
    let path = lock_file_path(state_dir, &lock.stage);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create dir {}: {}", parent.display(), e))?;
    }

    let yaml = serde_yaml_ng::to_string(lock).map_err(|e| format!("serialize error: {}", e))?;

    let tmp_path = path.with_extension("lock.yaml.tmp");
    std::fs::write(&tmp_path, &yaml)
        .map_err(|e| format!("cannot write {}: {}", tmp_path.display(), e))?;
    std::fs::rename(&tmp_path, &path).map_err(|e| {
        format!(
            "cannot rename {} → {}: {}",
            tmp_path.display(),
            path.display(),
            e
        )
    })?;

    Ok(())
}

/// Create an empty lock for a project stage.
pub fn new_lock(project: &str, stage: &str) -> SynthLock {
    use crate::provenance::eventlog::now_iso8601;
    SynthLock {
        schema: "1.0".to_string(),
        project: project.to_string(),
        stage: stage.to_string(),
        generated_at: now_iso8601(),
        generator: format!("stackwright {}", env!("CARGO_PKG_VERSION")),
        graph_hash: String::new(),
        inputs: InputHashes::default(),
        resources: indexmap::IndexMap::new(),
    }
}

/// Lock recording every resource of a synthesis, in build order.
pub fn lock_from_app(app: &SynthesizedApp, inputs: InputHashes) -> Result<SynthLock, String> {
    let mut lock = new_lock(&app.project, &app.stage);
    lock.inputs = inputs;
    for (qualified, stack, spec) in app.qualified_resources() {
        lock.resources.insert(
            qualified,
            ResourceLock {
                resource_type: spec.kind().to_string(),
                stack: stack.name.clone(),
                hash: planner::hash_resource(spec)?,
            },
        );
    }
    let hashes: Vec<&str> = lock.resources.values().map(|r| r.hash.as_str()).collect();
    lock.graph_hash = hasher::composite_hash(&hashes);
    Ok(lock)
}
