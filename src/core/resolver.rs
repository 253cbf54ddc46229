//! Template resolution, stage selection, and stack build ordering.
//!
//! Resolves `{{params.key}}`, `{{project}}`, `{{base_domain}}`,
//! `{{stage.name}}` and `{{stage.domain}}` templates. Builds a DAG from
//! declared stack prerequisites and computes topological order using Kahn's
//! algorithm with deterministic (alphabetical) tie-breaking.

use super::types::*;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};

/// Variables visible to templates.
pub struct TemplateVars<'a> {
    pub params: &'a HashMap<String, serde_yaml_ng::Value>,
    pub project: &'a str,
    pub stage_name: &'a str,
    /// Unset while the stage domain itself is being resolved
    pub base_domain: Option<&'a str>,
    pub stage_domain: Option<&'a str>,
}

/// Resolve all template variables in a string.
pub fn resolve_template(template: &str, vars: &TemplateVars) -> Result<String, String> {
    let mut result = template.to_string();
    let mut start = 0;

    while let Some(open) = result[start..].find("{{") {
        let open = start + open;
        let close = result[open..]
            .find("}}")
            .ok_or_else(|| format!("unclosed template at position {}", open))?;
        let close = open + close + 2;
        let key = result[open + 2..close - 2].trim();

        let value = if let Some(param_key) = key.strip_prefix("params.") {
            vars.params
                .get(param_key)
                .map(yaml_value_to_string)
                .ok_or_else(|| format!("unknown param: {}", param_key))?
        } else {
            match key {
                "project" => vars.project.to_string(),
                "stage.name" => vars.stage_name.to_string(),
                "base_domain" => vars
                    .base_domain
                    .ok_or_else(|| "base_domain is not available here".to_string())?
                    .to_string(),
                "stage.domain" => vars
                    .stage_domain
                    .ok_or_else(|| "stage.domain is not available here".to_string())?
                    .to_string(),
                _ => return Err(format!("unknown template variable: {}", key)),
            }
        };

        result.replace_range(open..close, &value);
        start = open + value.len();
    }

    Ok(result)
}

/// The configuration of one synthesis: project file plus the selected,
/// fully resolved stage. Built once and passed by reference to every builder.
#[derive(Debug, Clone)]
pub struct ResolvedConfig<'a> {
    pub config: &'a ProjectConfig,
    pub stage_name: String,
    pub stage: Stage,
    pub base_domain: String,
    pub api_domain: String,
    pub media_domain: String,
    pub media_bucket: String,
    pub user_pool_name: String,
}

impl ResolvedConfig<'_> {
    pub fn project(&self) -> &str {
        &self.config.project
    }

    /// Stack name of `kind` for this project and stage.
    pub fn stack_name(&self, kind: StackKind) -> String {
        kind.stack_name(&self.config.project, &self.stage_name)
    }
}

/// Select a stage and resolve every templated field.
pub fn resolve_stage<'a>(
    config: &'a ProjectConfig,
    stage_name: &str,
) -> Result<ResolvedConfig<'a>, String> {
    let raw = config.stages.get(stage_name).ok_or_else(|| {
        let known: Vec<&str> = config.stages.keys().map(|s| s.as_str()).collect();
        format!(
            "unknown stage '{}' (known: {})",
            stage_name,
            known.join(", ")
        )
    })?;

    let mut vars = TemplateVars {
        params: &config.params,
        project: &config.project,
        stage_name,
        base_domain: None,
        stage_domain: None,
    };
    let base_domain = resolve_template(&config.base_domain, &vars)?;
    vars.base_domain = Some(&base_domain);

    let domain = resolve_template(&raw.domain, &vars)?;
    let alternative_domains = raw
        .alternative_domains
        .iter()
        .map(|d| resolve_template(d, &vars))
        .collect::<Result<Vec<_>, _>>()?;
    vars.stage_domain = Some(&domain);

    let media_bucket = match config.media.bucket {
        Some(ref b) => resolve_template(b, &vars)?,
        None => format!("{}-media", config.project),
    };
    let user_pool_name = match config.identity.user_pool_name {
        Some(ref n) => resolve_template(n, &vars)?,
        None => config.project.clone(),
    };

    Ok(ResolvedConfig {
        config,
        stage_name: stage_name.to_string(),
        api_domain: format!("api.{}", base_domain),
        media_domain: format!("media.{}", base_domain),
        stage: Stage {
            domain,
            alternative_domains,
            retain_data: raw.retain_data,
        },
        base_domain,
        media_bucket,
        user_pool_name,
    })
}

/// A node of the build plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackNode {
    pub kind: StackKind,
    pub depends_on: Vec<String>,
}

/// Stack name → prerequisites.
#[derive(Debug, Clone, Default)]
pub struct BuildPlan {
    pub stacks: IndexMap<String, StackNode>,
}

impl BuildPlan {
    /// Register a stack and the stacks it needs.
    pub fn add(&mut self, name: String, kind: StackKind, depends_on: Vec<String>) {
        self.stacks.insert(name, StackNode { kind, depends_on });
    }

    /// The fixed plan: API after its domain, identity, media and shared
    /// tables stacks; front-end after the API.
    pub fn standard(project: &str, stage: &str) -> Self {
        let name = |kind: StackKind| kind.stack_name(project, stage);
        let mut plan = Self::default();
        plan.add(name(StackKind::SharedTables), StackKind::SharedTables, vec![]);
        plan.add(name(StackKind::Media), StackKind::Media, vec![]);
        plan.add(name(StackKind::ApiDomain), StackKind::ApiDomain, vec![]);
        plan.add(name(StackKind::Identity), StackKind::Identity, vec![]);
        plan.add(
            name(StackKind::Api),
            StackKind::Api,
            vec![
                name(StackKind::ApiDomain),
                name(StackKind::Identity),
                name(StackKind::Media),
                name(StackKind::SharedTables),
            ],
        );
        plan.add(
            name(StackKind::FrontEnd),
            StackKind::FrontEnd,
            vec![name(StackKind::Api)],
        );
        plan
    }

    /// Topological order of stack names.
    /// Uses Kahn's algorithm with alphabetical tie-breaking for determinism.
    pub fn execution_order(&self) -> Result<Vec<String>, String> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

        for name in self.stacks.keys() {
            in_degree.insert(name, 0);
            adjacency.insert(name, Vec::new());
        }

        for (name, node) in &self.stacks {
            for dep in &node.depends_on {
                if dep == name {
                    return Err(format!("stack '{}' depends on itself", name));
                }
                let neighbors = adjacency
                    .get_mut(dep.as_str())
                    .ok_or_else(|| format!("stack '{}' depends on unknown '{}'", name, dep))?;
                neighbors.push(name);
                if let Some(degree) = in_degree.get_mut(name.as_str()) {
                    *degree += 1;
                }
            }
        }

        let mut zero_degree: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(name, _)| *name)
            .collect();
        zero_degree.sort_unstable();
        let mut queue: VecDeque<&str> = zero_degree.into_iter().collect();

        let mut order = Vec::new();
        while let Some(current) = queue.pop_front() {
            order.push(current.to_string());

            let mut next_ready: Vec<&str> = Vec::new();
            if let Some(neighbors) = adjacency.get(current) {
                for neighbor in neighbors {
                    if let Some(degree) = in_degree.get_mut(*neighbor) {
                        *degree -= 1;
                        if *degree == 0 {
                            next_ready.push(*neighbor);
                        }
                    }
                }
            }
            next_ready.sort_unstable();
            queue.extend(next_ready);
        }

        if order.len() != self.stacks.len() {
            let ordered: HashSet<&str> = order.iter().map(|s| s.as_str()).collect();
            let mut cycle_members: Vec<&str> = self
                .stacks
                .keys()
                .map(|s| s.as_str())
                .filter(|s| !ordered.contains(s))
                .collect();
            cycle_members.sort_unstable();
            return Err(format!(
                "dependency cycle detected involving: {}",
                cycle_members.join(", ")
            ));
        }

        Ok(order)
    }
}
