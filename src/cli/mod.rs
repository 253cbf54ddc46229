//! CLI subcommands: init, validate, synth, plan, drift, status, outputs,
//! completions, schema.

use crate::core::{parser, planner, state, synth, types};
use crate::provenance::drift;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "stackwright",
    version,
    about = "Synthesize serverless API stacks from a project file and an OpenAPI document"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new stackwright project
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate stackwright.yaml without reading the API definition
    Validate {
        /// Path to stackwright.yaml
        #[arg(short, long, default_value = "stackwright.yaml")]
        file: PathBuf,
    },

    /// Synthesize every stack of a stage and write them to disk
    Synth {
        /// Path to stackwright.yaml
        #[arg(short, long, default_value = "stackwright.yaml")]
        file: PathBuf,

        /// Stage to synthesize
        #[arg(short, long)]
        stage: String,

        /// Output directory
        #[arg(short, long, default_value = "synth.out")]
        out: PathBuf,

        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        /// Fail if any declared path or authorizer scheme is missing from the API definition
        #[arg(long)]
        strict: bool,
    },

    /// Show what changed since the last synthesis of a stage
    Plan {
        /// Path to stackwright.yaml
        #[arg(short, long, default_value = "stackwright.yaml")]
        file: PathBuf,

        /// Stage to plan
        #[arg(short, long)]
        stage: String,

        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,
    },

    /// Detect input files changed since the last synthesis
    Drift {
        /// Target specific stage
        #[arg(short, long)]
        stage: Option<String>,

        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        /// Exit non-zero on any drift (for CI)
        #[arg(long)]
        fail_on_drift: bool,
    },

    /// Show current state from lock files
    Status {
        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        /// Target specific stage
        #[arg(short, long)]
        stage: Option<String>,
    },

    /// Print the deployment-time outputs of a stage
    Outputs {
        /// Path to stackwright.yaml
        #[arg(short, long, default_value = "stackwright.yaml")]
        file: PathBuf,

        /// Stage to synthesize
        #[arg(short, long)]
        stage: String,

        /// Only this stack
        #[arg(long)]
        stack: Option<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },

    /// Print the JSON schema of stackwright.yaml
    Schema,
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Synth {
            file,
            stage,
            out,
            state_dir,
            strict,
        } => cmd_synth(&file, &stage, &out, &state_dir, strict),
        Commands::Plan {
            file,
            stage,
            state_dir,
        } => cmd_plan(&file, &stage, &state_dir),
        Commands::Drift {
            stage,
            state_dir,
            fail_on_drift,
        } => cmd_drift(&state_dir, stage.as_deref(), fail_on_drift),
        Commands::Status { state_dir, stage } => cmd_status(&state_dir, stage.as_deref()),
        Commands::Outputs {
            file,
            stage,
            stack,
            json,
        } => cmd_outputs(&file, &stage, stack.as_deref(), json),
        Commands::Completions { shell } => {
            cmd_completions(shell, &mut std::io::stdout());
            Ok(())
        }
        Commands::Schema => cmd_schema(),
    }
}

const PROJECT_TEMPLATE: &str = r#"version: "1.0"
project: my-app
description: "Managed by stackwright"

account: "000000000000"
region: eu-west-1
organization_prefix: my-org
base_domain: example.com

params: {}

stages:
  dev:
    domain: "dev.{{base_domain}}"
  prod:
    domain: "app.{{base_domain}}"
    retain_data: true

api:
  definition: openapi.yaml
  controllers:
    auth:
      is_authorizer: true
    items:
      paths: ["/items", "/items/{itemId}"]

tables:
  items:
    partition_key: { name: itemId }

media:
  folders: [images, attachments]
"#;

const API_TEMPLATE: &str = r#"openapi: 3.0.3
info:
  title: my-app
  version: 1.0.0
paths:
  /items:
    get:
      security: [{ auth: [] }]
      responses:
        "200": { description: OK }
  /items/{itemId}:
    get:
      security: [{ auth: [] }]
      responses:
        "200": { description: OK }
components:
  securitySchemes:
    auth:
      type: apiKey
      name: Authorization
      in: header
"#;

fn cmd_init(path: &Path) -> Result<(), String> {
    let config_path = path.join("stackwright.yaml");
    if config_path.exists() {
        return Err(format!("{} already exists", config_path.display()));
    }

    let state_dir = path.join("state");
    std::fs::create_dir_all(&state_dir).map_err(|e| format!("cannot create state dir: {}", e))?;

    std::fs::write(&config_path, PROJECT_TEMPLATE)
        .map_err(|e| format!("cannot write {}: {}", config_path.display(), e))?;

    let api_path = path.join("openapi.yaml");
    if !api_path.exists() {
        std::fs::write(&api_path, API_TEMPLATE)
            .map_err(|e| format!("cannot write {}: {}", api_path.display(), e))?;
    }

    println!("Initialized stackwright project at {}", path.display());
    println!("  Created: {}", config_path.display());
    println!("  Created: {}", api_path.display());
    println!("  Created: {}/", state_dir.display());
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let config = parser::parse_config_file(file)?;
    let errors = parser::validate_config(&config);

    if errors.is_empty() {
        println!(
            "OK: {} ({} stages, {} controllers, {} tables)",
            config.project,
            config.stages.len(),
            config.api.controllers.len(),
            config.tables.len() + config.shared_tables.len()
        );
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(format!("{} validation error(s)", errors.len()))
    }
}

/// Parse and validate a project file, returning errors if invalid.
fn parse_and_validate(file: &Path) -> Result<types::ProjectConfig, String> {
    let config = parser::parse_config_file(file)?;
    let errors = parser::validate_config(&config);
    if errors.is_empty() {
        return Ok(config);
    }
    for e in &errors {
        eprintln!("  ERROR: {}", e);
    }
    Err("validation failed".to_string())
}

/// Synthesize without touching the state directory.
fn synthesize_only(file: &Path, stage: &str) -> Result<types::SynthesizedApp, String> {
    let config = parse_and_validate(file)?;
    synth::synthesize(&synth::SynthConfig {
        config: &config,
        config_path: file,
        stage,
        state_dir: None,
        strict: false,
    })
}

fn print_skipped(skipped: &[types::SkippedBinding]) {
    for s in skipped {
        eprintln!("  WARNING: binding skipped: {}", s);
    }
}

fn cmd_synth(
    file: &Path,
    stage: &str,
    out: &Path,
    state_dir: &Path,
    strict: bool,
) -> Result<(), String> {
    let config = parse_and_validate(file)?;
    let app = synth::synthesize(&synth::SynthConfig {
        config: &config,
        config_path: file,
        stage,
        state_dir: Some(state_dir),
        strict,
    })?;
    print_skipped(&app.skipped);

    let written = synth::write_output(&app, out)?;
    for stack_name in &app.build_order {
        if let Some(stack) = app.stacks.get(stack_name) {
            println!("{}: {} resources", stack.name, stack.resources.len());
        }
    }
    println!();
    println!(
        "Synthesized {} ({}): {} stacks, {} resources, {} files in {}",
        app.project,
        app.stage,
        app.stacks.len(),
        app.resource_count(),
        written.len(),
        out.display()
    );
    Ok(())
}

fn cmd_plan(file: &Path, stage: &str, state_dir: &Path) -> Result<(), String> {
    let app = synthesize_only(file, stage)?;
    print_skipped(&app.skipped);
    let lock = state::load_lock(state_dir, stage)?;
    let plan = planner::plan(&app, lock.as_ref())?;
    print_plan(&plan);
    Ok(())
}

/// Display a plan to stdout.
fn print_plan(plan: &types::SynthPlan) {
    println!(
        "Planning: {} ({}, {} resources)",
        plan.project,
        plan.stage,
        plan.changes.len()
    );
    println!();

    let mut current_stack = String::new();
    for change in &plan.changes {
        if change.stack != current_stack {
            current_stack = change.stack.clone();
            println!("{}:", current_stack);
        }
        let symbol = match change.action {
            types::PlanAction::Create => "+",
            types::PlanAction::Update => "~",
            types::PlanAction::Destroy => "-",
            types::PlanAction::NoOp => " ",
        };
        println!("  {} {}", symbol, change.description);
    }

    println!();
    println!(
        "Plan: {} to add, {} to change, {} to destroy, {} unchanged.",
        plan.to_create, plan.to_update, plan.to_destroy, plan.unchanged
    );
}

/// Stage directories under `state_dir` that hold a lock, sorted.
fn locked_stages(state_dir: &Path, filter: Option<&str>) -> Result<Vec<types::SynthLock>, String> {
    let entries = std::fs::read_dir(state_dir)
        .map_err(|e| format!("cannot read state dir {}: {}", state_dir.display(), e))?;
    let mut names: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| filter.is_none_or(|f| f == name.as_str()))
        .collect();
    names.sort();

    let mut locks = Vec::new();
    for name in names {
        if let Some(lock) = state::load_lock(state_dir, &name)? {
            locks.push(lock);
        }
    }
    Ok(locks)
}

fn cmd_drift(state_dir: &Path, stage_filter: Option<&str>, fail_on_drift: bool) -> Result<(), String> {
    let mut total_drift = 0;

    for lock in locked_stages(state_dir, stage_filter)? {
        println!("Checking {} ({})...", lock.stage, lock.project);
        let findings = drift::detect_drift(&lock);

        if findings.is_empty() {
            println!("  No drift detected.");
        } else {
            for f in &findings {
                println!("  DRIFTED: {} {} ({})", f.input, f.path, f.detail);
                println!("    Expected: {}", f.expected_hash);
                println!("    Actual:   {}", f.actual_hash);
            }
            total_drift += findings.len();
        }
    }

    if total_drift > 0 {
        println!();
        println!("Drift detected: {} input(s). Re-run `stackwright synth`.", total_drift);
        if fail_on_drift {
            return Err(format!("{} drift finding(s)", total_drift));
        }
    } else {
        println!("No drift detected.");
    }

    Ok(())
}

fn cmd_status(state_dir: &Path, stage_filter: Option<&str>) -> Result<(), String> {
    let locks = locked_stages(state_dir, stage_filter)?;

    for lock in &locks {
        println!("Stage: {} ({})", lock.stage, lock.project);
        println!("  Generated: {}", lock.generated_at);
        println!("  Generator: {}", lock.generator);
        println!("  Graph:     {}", lock.graph_hash);
        println!("  Resources: {}", lock.resources.len());

        let mut current_stack = "";
        for (id, rl) in &lock.resources {
            if rl.stack != current_stack {
                current_stack = rl.stack.as_str();
                println!("    {}:", current_stack);
            }
            let short = id.rsplit('/').next().unwrap_or(id);
            println!("      {} [{}]", short, rl.resource_type);
        }
        println!();
    }

    if locks.is_empty() {
        println!("No state found. Run `stackwright synth` first.");
    }

    Ok(())
}

fn cmd_outputs(file: &Path, stage: &str, stack_filter: Option<&str>, json: bool) -> Result<(), String> {
    let app = synthesize_only(file, stage)?;
    if let Some(name) = stack_filter {
        if !app.stacks.contains_key(name) {
            let known: Vec<&str> = app.stacks.keys().map(|s| s.as_str()).collect();
            return Err(format!("unknown stack '{}' (known: {})", name, known.join(", ")));
        }
    }
    let selected: indexmap::IndexMap<&str, &indexmap::IndexMap<String, String>> = app
        .stacks
        .values()
        .filter(|s| stack_filter.is_none_or(|f| f == s.name))
        .map(|s| (s.name.as_str(), &s.outputs))
        .collect();

    if json {
        let out = serde_json::to_string_pretty(&selected)
            .map_err(|e| format!("JSON serialize error: {}", e))?;
        println!("{}", out);
        return Ok(());
    }
    for (stack, outputs) in &selected {
        println!("{}:", stack);
        for (key, value) in outputs.iter() {
            println!("  {} = {}", key, value);
        }
    }
    Ok(())
}

fn cmd_completions(shell: clap_complete::Shell, out: &mut dyn std::io::Write) {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "stackwright", out);
}

fn cmd_schema() -> Result<(), String> {
    let schema = schemars::schema_for!(types::ProjectConfig);
    let out =
        serde_json::to_string_pretty(&schema).map_err(|e| format!("JSON serialize error: {}", e))?;
    println!("{}", out);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::fixtures;

    fn project_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stackwright.yaml"), fixtures::PROJECT).unwrap();
        std::fs::write(
            dir.path().join("openapi.yaml"),
            serde_json::to_string(&fixtures::document()).unwrap(),
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("assets").join("logo.png"), "png").unwrap();
        dir
    }

    #[test]
    fn test_init() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("new-project");
        std::fs::create_dir_all(&sub).unwrap();
        cmd_init(&sub).unwrap();
        assert!(sub.join("stackwright.yaml").exists());
        assert!(sub.join("openapi.yaml").exists());
        assert!(sub.join("state").is_dir());
        cmd_validate(&sub.join("stackwright.yaml")).unwrap();
    }

    #[test]
    fn test_init_then_synth() {
        let dir = tempfile::tempdir().unwrap();
        cmd_init(dir.path()).unwrap();
        let out = dir.path().join("out");
        cmd_synth(
            &dir.path().join("stackwright.yaml"),
            "dev",
            &out,
            &dir.path().join("state"),
            true,
        )
        .unwrap();
        assert!(out.join("my-app-dev-api.json").exists());
    }

    #[test]
    fn test_init_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stackwright.yaml"), "exists").unwrap();
        assert!(cmd_init(dir.path()).is_err());
    }

    #[test]
    fn test_validate_valid() {
        let dir = project_dir();
        cmd_validate(&dir.path().join("stackwright.yaml")).unwrap();
    }

    #[test]
    fn test_validate_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("stackwright.yaml");
        std::fs::write(&config, fixtures::PROJECT.replace("\"1.0\"", "\"2.0\"")).unwrap();
        assert!(cmd_validate(&config).is_err());
    }

    #[test]
    fn test_synth_writes_output_and_state() {
        let dir = project_dir();
        let out = dir.path().join("out");
        let state_dir = dir.path().join("state");
        cmd_synth(&dir.path().join("stackwright.yaml"), "prod", &out, &state_dir, false).unwrap();
        assert!(out.join("manifest.json").exists());
        assert!(out.join("members-prod-front-end.json").exists());
        assert!(state::lock_file_path(&state_dir, "prod").exists());
    }

    #[test]
    fn test_synth_strict_fails() {
        let dir = project_dir();
        let result = cmd_synth(
            &dir.path().join("stackwright.yaml"),
            "dev",
            &dir.path().join("out"),
            &dir.path().join("state"),
            true,
        );
        assert!(result.unwrap_err().contains("did not attach"));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_synth_unknown_stage() {
        let dir = project_dir();
        let result = cmd_synth(
            &dir.path().join("stackwright.yaml"),
            "qa",
            &dir.path().join("out"),
            &dir.path().join("state"),
            false,
        );
        assert!(result.unwrap_err().contains("unknown stage"));
    }

    #[test]
    fn test_plan_before_and_after_synth() {
        let dir = project_dir();
        let file = dir.path().join("stackwright.yaml");
        let state_dir = dir.path().join("state");
        cmd_plan(&file, "dev", &state_dir).unwrap();
        cmd_synth(&file, "dev", &dir.path().join("out"), &state_dir, false).unwrap();
        cmd_plan(&file, "dev", &state_dir).unwrap();
    }

    #[test]
    fn test_plan_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("stackwright.yaml");
        std::fs::write(&config, fixtures::PROJECT.replace("project: members", "project: \"\"")).unwrap();
        let result = cmd_plan(&config, "dev", &dir.path().join("state"));
        assert!(result.unwrap_err().contains("validation"));
    }

    #[test]
    fn test_drift_and_status() {
        let dir = project_dir();
        let file = dir.path().join("stackwright.yaml");
        let state_dir = dir.path().join("state");
        cmd_synth(&file, "dev", &dir.path().join("out"), &state_dir, false).unwrap();

        cmd_status(&state_dir, None).unwrap();
        cmd_drift(&state_dir, Some("dev"), true).unwrap();

        std::fs::write(dir.path().join("assets").join("logo.png"), "new png").unwrap();
        let result = cmd_drift(&state_dir, None, true);
        assert!(result.unwrap_err().contains("1 drift finding"));
    }

    #[test]
    fn test_status_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("state")).unwrap();
        cmd_status(&dir.path().join("state"), None).unwrap();
    }

    #[test]
    fn test_outputs() {
        let dir = project_dir();
        let file = dir.path().join("stackwright.yaml");
        cmd_outputs(&file, "dev", None, false).unwrap();
        cmd_outputs(&file, "dev", Some("members-dev-api"), true).unwrap();
        assert!(cmd_outputs(&file, "dev", Some("nope"), false)
            .unwrap_err()
            .contains("unknown stack"));
    }

    #[test]
    fn test_completions() {
        let mut buf = Vec::new();
        cmd_completions(clap_complete::Shell::Bash, &mut buf);
        let script = String::from_utf8(buf).unwrap();
        assert!(script.contains("stackwright"));
        assert!(script.contains("synth"));
    }

    #[test]
    fn test_schema() {
        let schema = schemars::schema_for!(types::ProjectConfig);
        let json = serde_json::to_value(&schema).unwrap();
        assert!(json["properties"]["stages"].is_object());
        assert!(json["required"]
            .as_array()
            .unwrap()
            .iter()
            .any(|r| r == "organization_prefix"));
        cmd_schema().unwrap();
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["stackwright", "synth", "--stage", "dev", "--strict"]).unwrap();
        match cli.command {
            Commands::Synth { stage, strict, .. } => {
                assert_eq!(stage, "dev");
                assert!(strict);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(Cli::try_parse_from(["stackwright", "synth"]).is_err());
    }
}
