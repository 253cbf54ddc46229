//! Synthesis orchestrator.
//!
//! resolve stage → build plan → load API document → for each stack in
//! order: build, publish outputs → strict check → lock + events.
//!
//! An unknown stage fails before anything is read from disk or logged.

use super::codegen;
use super::resolver::{self, BuildPlan, ResolvedConfig};
use super::state;
use super::types::*;
use crate::apidef::{loader, FileSource};
use crate::provenance::{eventlog, hasher};
use crate::stacks::SynthState;
use indexmap::IndexMap;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Configuration for a synthesis run.
pub struct SynthConfig<'a> {
    pub config: &'a ProjectConfig,
    /// Project file; relative paths in the config resolve against its directory
    pub config_path: &'a Path,
    pub stage: &'a str,
    /// Where the lock and event log go. None = record nothing.
    pub state_dir: Option<&'a Path>,
    /// Fail on any binding that did not attach
    pub strict: bool,
}

/// Run a full synthesis for one stage.
pub fn synthesize(cfg: &SynthConfig) -> Result<SynthesizedApp, String> {
    let start = Instant::now();
    let ctx = resolver::resolve_stage(cfg.config, cfg.stage)?;
    let base_dir = base_dir(cfg.config_path);
    let run_id = eventlog::generate_run_id();

    log(
        cfg,
        SynthEvent::SynthStarted {
            project: cfg.config.project.clone(),
            stage: cfg.stage.to_string(),
            run_id: run_id.clone(),
            stackwright_version: env!("CARGO_PKG_VERSION").to_string(),
        },
    )?;

    let result = load_inputs(&ctx, &base_dir)
        .and_then(|(document, assets)| synthesize_document(&ctx, document, assets))
        .and_then(|app| check_strict(cfg.strict, app));

    let app = match result {
        Ok(app) => app,
        Err(e) => return Err(record_failure(cfg, run_id, e)),
    };

    if let Some(state_dir) = cfg.state_dir {
        let inputs = input_hashes(cfg, &base_dir)?;
        record(state_dir, &run_id, &app, inputs, start)?;
    }

    Ok(app)
}

/// Build every stack of the standard plan from an already-loaded document.
pub fn synthesize_document(
    ctx: &ResolvedConfig,
    document: Value,
    assets: Vec<AssetFile>,
) -> Result<SynthesizedApp, String> {
    let plan = BuildPlan::standard(ctx.project(), &ctx.stage_name);
    let order = plan.execution_order()?;

    let mut synth_state = SynthState::new(document, assets);
    let mut stacks = IndexMap::new();
    for name in &order {
        let node = plan
            .stacks
            .get(name)
            .ok_or_else(|| format!("stack '{}' missing from build plan", name))?;
        let mut stack = codegen::build_stack(node.kind, ctx, &mut synth_state)?;
        stack.depends_on = node.depends_on.clone();
        synth_state
            .outputs
            .insert(name.clone(), stack.outputs.clone());
        stacks.insert(name.clone(), stack);
    }

    let api_definition = synth_state
        .api_definition
        .take()
        .ok_or_else(|| "API stack produced no API definition".to_string())?;

    Ok(SynthesizedApp {
        project: ctx.project().to_string(),
        stage: ctx.stage_name.clone(),
        build_order: order,
        stacks,
        api_definition,
        skipped: synth_state.skipped,
    })
}

/// Load and dereference the API document.
pub fn load_api_definition(base_dir: &Path, definition: &str) -> Result<Value, String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("cannot start runtime: {}", e))?;
    let source = FileSource::new(base_dir);
    runtime.block_on(loader::load_document(&source, definition))
}

/// Fingerprint every regular file under `dir`, sorted by relative path.
pub fn collect_assets(dir: &Path) -> Result<Vec<AssetFile>, String> {
    if !dir.is_dir() {
        return Err(format!("assets directory {} not found", dir.display()));
    }
    let pattern = format!("{}/**/*", glob::Pattern::escape(&dir.to_string_lossy()));
    let entries = glob::glob(&pattern).map_err(|e| format!("invalid assets pattern: {}", e))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| format!("cannot read asset: {}", e))?;
        if !is_regular_file(&path)? {
            continue;
        }
        let rel = path
            .strip_prefix(dir)
            .map_err(|e| format!("path prefix error: {}", e))?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        files.push(AssetFile {
            path: parts.join("/"),
            sha256: hasher::sha256_file(&path)?,
        });
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// Whether `path` is a regular file. Symlinks are not followed.
fn is_regular_file(path: &Path) -> Result<bool, String> {
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_file())
        .map_err(|e| format!("cannot stat asset {}: {}", path.display(), e))
}

/// Write one JSON file per stack, the transformed API document and a
/// manifest. Returns the written paths.
pub fn write_output(app: &SynthesizedApp, out_dir: &Path) -> Result<Vec<PathBuf>, String> {
    std::fs::create_dir_all(out_dir)
        .map_err(|e| format!("cannot create dir {}: {}", out_dir.display(), e))?;
    let mut written = Vec::new();

    for stack in app.stacks.values() {
        let path = out_dir.join(format!("{}.json", stack.name));
        write_json(&path, stack)?;
        written.push(path);
    }

    let path = out_dir.join("api-definition.json");
    write_json(&path, &app.api_definition)?;
    written.push(path);

    let stacks: serde_json::Map<String, Value> = app
        .stacks
        .values()
        .map(|s| {
            (
                s.name.clone(),
                json!({
                    "kind": s.kind,
                    "stage_dependent": s.stage_dependent,
                    "depends_on": s.depends_on,
                    "resources": s.resources.len(),
                    "outputs": s.outputs,
                }),
            )
        })
        .collect();
    let manifest = json!({
        "project": app.project,
        "stage": app.stage,
        "generator": format!("stackwright {}", env!("CARGO_PKG_VERSION")),
        "build_order": app.build_order,
        "stacks": stacks,
        "skipped": app.skipped,
    });
    let path = out_dir.join("manifest.json");
    write_json(&path, &manifest)?;
    written.push(path);

    Ok(written)
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), String> {
    let mut json =
        serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialize error: {}", e))?;
    json.push('\n');
    std::fs::write(path, json).map_err(|e| format!("cannot write {}: {}", path.display(), e))
}

fn base_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

fn assets_dir(ctx: &ResolvedConfig, base_dir: &Path) -> Option<PathBuf> {
    ctx.config
        .media
        .assets_folder
        .as_ref()
        .map(|_| base_dir.join(&ctx.config.media.assets_dir))
}

fn load_inputs(ctx: &ResolvedConfig, base_dir: &Path) -> Result<(Value, Vec<AssetFile>), String> {
    let document = load_api_definition(base_dir, &ctx.config.api.definition)?;
    let assets = match assets_dir(ctx, base_dir) {
        Some(dir) => collect_assets(&dir)?,
        None => Vec::new(),
    };
    Ok((document, assets))
}

fn check_strict(strict: bool, app: SynthesizedApp) -> Result<SynthesizedApp, String> {
    if !strict || app.skipped.is_empty() {
        return Ok(app);
    }
    let list: Vec<String> = app.skipped.iter().map(|s| s.to_string()).collect();
    Err(format!(
        "{} binding(s) did not attach: {}",
        list.len(),
        list.join("; ")
    ))
}

fn input_hashes(cfg: &SynthConfig, base_dir: &Path) -> Result<InputHashes, String> {
    let api_path = base_dir.join(&cfg.config.api.definition);
    let mut inputs = InputHashes {
        config_path: cfg.config_path.display().to_string(),
        config: hasher::hash_file(cfg.config_path)?,
        api_definition_path: api_path.display().to_string(),
        api_definition: hasher::hash_file(&api_path)?,
        assets_path: None,
        assets: None,
    };
    if cfg.config.media.assets_folder.is_some() {
        let dir = base_dir.join(&cfg.config.media.assets_dir);
        inputs.assets = Some(hasher::hash_directory(&dir)?);
        inputs.assets_path = Some(dir.display().to_string());
    }
    Ok(inputs)
}

/// Log `SynthFailed` and hand back the synthesis error. A logging failure
/// is appended to the message instead of replacing it.
fn record_failure(cfg: &SynthConfig, run_id: String, error: String) -> String {
    let event = SynthEvent::SynthFailed {
        run_id,
        error: error.clone(),
    };
    match log(cfg, event) {
        Ok(()) => error,
        Err(log_err) => format!("{} (event log: {})", error, log_err),
    }
}

fn log(cfg: &SynthConfig, event: SynthEvent) -> Result<(), String> {
    match cfg.state_dir {
        Some(dir) => eventlog::append_event(dir, cfg.stage, event),
        None => Ok(()),
    }
}

/// Persist the lock and the per-stack events of a successful run.
fn record(
    state_dir: &Path,
    run_id: &str,
    app: &SynthesizedApp,
    inputs: InputHashes,
    start: Instant,
) -> Result<(), String> {
    for skip in &app.skipped {
        eventlog::append_event(
            state_dir,
            &app.stage,
            SynthEvent::BindingSkipped {
                run_id: run_id.to_string(),
                controller: skip.controller.clone(),
                path: skip.path.clone(),
                reason: skip.reason,
            },
        )?;
    }

    let lock = state::lock_from_app(app, inputs)?;
    for stack in app.stacks.values() {
        let hashes: Vec<&str> = lock
            .resources
            .values()
            .filter(|r| r.stack == stack.name)
            .map(|r| r.hash.as_str())
            .collect();
        eventlog::append_event(
            state_dir,
            &app.stage,
            SynthEvent::StackSynthesized {
                run_id: run_id.to_string(),
                stack: stack.name.clone(),
                resources: stack.resources.len() as u32,
                hash: hasher::composite_hash(&hashes),
            },
        )?;
    }
    state::save_lock(state_dir, &lock)?;

    eventlog::append_event(
        state_dir,
        &app.stage,
        SynthEvent::SynthCompleted {
            run_id: run_id.to_string(),
            stacks: app.stacks.len() as u32,
            resources: app.resource_count() as u32,
            graph_hash: lock.graph_hash.clone(),
            total_seconds: start.elapsed().as_secs_f64(),
        },
    )
}
