//! The stage-dependent API stack.
//!
//! Composition order: compute units and their bindings, then the shared
//! access policies, then the stage tables and the shared table bindings. Every later step sees the full
//! set of units.

use super::policy;
use super::tables;
use super::{logical_id, ComputeUnit, ComputeUnits, SynthState};
use crate::apidef::transform;
use crate::core::resolver::ResolvedConfig;
use crate::core::types::*;
use serde_json::Value;
use std::collections::BTreeMap;

/// Logical id of the HTTP API in the API stack.
pub const HTTP_API_ID: &str = "api";

/// Physical name of a compute unit.
pub fn function_name(project: &str, stage: &str, resource: &str) -> String {
    format!("{}_{}_{}", project, stage, resource)
}

/// Source ARN pattern that scopes an invoke permission to the stage's API.
pub fn api_source_arn(region: &str, account: &str) -> String {
    format!(
        "arn:aws:execute-api:{}:{}:{}/*/*/*",
        region,
        account,
        token(HTTP_API_ID, "ApiId")
    )
}

/// Compute units plus the document they were bound into.
#[derive(Debug, Clone)]
pub struct ProvisionedUnits {
    pub units: ComputeUnits,
    pub document: Value,
    pub skipped: Vec<SkippedBinding>,
}

/// One compute unit per controller, in declaration order, with proxy
/// bindings and the authorizer wired into `document`.
pub fn provision_units(ctx: &ResolvedConfig, document: &Value) -> ProvisionedUnits {
    let api = &ctx.config.api;
    let mut units = ComputeUnits::default();
    let mut document = document.clone();
    let mut skipped = Vec::new();

    for (name, controller) in &api.controllers {
        let id = logical_id(name, "function");
        let uri = transform::invocation_uri(&ctx.config.region, &token(&id, "Arn"));

        if !controller.paths.is_empty() {
            let outcome = transform::bind_controller(&document, name, &controller.paths, &uri);
            document = outcome.document;
            skipped.extend(outcome.skipped);
        }
        if controller.is_authorizer {
            let outcome = transform::bind_authorizer(&document, name, &uri);
            document = outcome.document;
            skipped.extend(outcome.skipped);
        }

        let environment = BTreeMap::from([
            ("PROJECT".to_string(), ctx.project().to_string()),
            ("STAGE".to_string(), ctx.stage_name.clone()),
            ("RESOURCE".to_string(), name.clone()),
        ]);

        let function = FunctionSpec {
            function_name: function_name(ctx.project(), &ctx.stage_name, name),
            runtime: api.runtime.clone(),
            handler: format!("{}.handler", name),
            code_path: api.handler_dir.clone(),
            memory_mb: controller.memory_mb.unwrap_or(api.memory_mb),
            timeout_seconds: controller.timeout_seconds.unwrap_or(api.timeout_seconds),
            environment,
            policies: Vec::new(),
        };
        let permission = PermissionSpec {
            function: token(&id, "Arn"),
            action: "lambda:InvokeFunction".to_string(),
            principal: "apigateway.amazonaws.com".to_string(),
            source_arn: api_source_arn(&ctx.config.region, &ctx.config.account),
        };

        units.units.insert(
            name.clone(),
            ComputeUnit {
                resource: name.clone(),
                logical_id: id,
                function,
                permission,
            },
        );
    }

    ProvisionedUnits {
        units,
        document,
        skipped,
    }
}

/// Build the API stack for the selected stage.
pub fn build(ctx: &ResolvedConfig, state: &mut SynthState) -> Result<SynthesizedStack, String> {
    let stack_name = ctx.stack_name(StackKind::Api);
    let domain_stack = ctx.stack_name(StackKind::ApiDomain);
    let identity_stack = ctx.stack_name(StackKind::Identity);
    let media_stack = ctx.stack_name(StackKind::Media);

    let domain_name = state.import(&domain_stack, "DomainName")?;
    let user_pool_id = state.import(&identity_stack, "UserPoolId")?;
    let media_bucket = state
        .output_value(&media_stack, "BucketName")
        .ok_or_else(|| format!("stack '{}' has no output 'BucketName'", media_stack))?
        .to_string();

    let document = transform::with_metadata(
        &transform::with_cors(&state.document),
        ctx.project(),
        &ctx.stage_name,
    );
    let ProvisionedUnits {
        mut units,
        document,
        skipped,
    } = provision_units(ctx, &document);

    // The authorizer validates tokens against the shared user pool.
    for (name, controller) in &ctx.config.api.controllers {
        if !controller.is_authorizer {
            continue;
        }
        if let Some(unit) = units.units.get_mut(name) {
            unit.function
                .environment
                .insert("COGNITO_USER_POOL_ID".to_string(), user_pool_id.clone());
        }
    }

    let policies = policy::compose(ctx, &media_bucket, &state.assets, &mut units);
    let tables = tables::provision_tables(
        &stack_name,
        &ctx.config.tables,
        RemovalPolicy::from_retain(ctx.stage.retain_data),
        &mut units,
    );
    tables::bind_shared(ctx, state, &mut units)?;

    let mut stack = SynthesizedStack::new(stack_name, StackKind::Api);
    stack.resources.insert(
        HTTP_API_ID.to_string(),
        ResourceSpec::HttpApi(HttpApiSpec {
            name: format!("{}-{}", ctx.project(), ctx.stage_name),
            body: document.clone(),
            disable_execute_api_endpoint: true,
        }),
    );
    stack.resources.insert(
        "api-mapping".to_string(),
        ResourceSpec::ApiMapping(ApiMappingSpec {
            domain_name,
            api: token(HTTP_API_ID, "ApiId"),
            api_stage: "$default".to_string(),
            mapping_key: ctx.stage_name.clone(),
        }),
    );

    for unit in units.units.values() {
        stack.resources.insert(
            unit.logical_id.clone(),
            ResourceSpec::Function(unit.function.clone()),
        );
        stack.resources.insert(
            logical_id(&unit.resource, "permission"),
            ResourceSpec::InvokePermission(unit.permission.clone()),
        );
    }
    for (id, spec) in policies.policies {
        stack.resources.insert(id, ResourceSpec::Policy(spec));
    }
    if let Some((id, upload)) = policies.asset_upload {
        stack.resources.insert(id, ResourceSpec::AssetUpload(upload));
    }
    for (id, spec) in tables {
        stack.resources.insert(id, ResourceSpec::Table(spec));
    }

    stack.outputs.insert(
        "ApiUrl".to_string(),
        format!("https://{}/{}", ctx.api_domain, ctx.stage_name),
    );
    stack
        .outputs
        .insert("ApiId".to_string(), token(HTTP_API_ID, "ApiId"));
    for unit in units.units.values() {
        stack.outputs.insert(
            format!("{}FunctionName", unit.resource),
            unit.function.function_name.clone(),
        );
    }

    state.api_definition = Some(document);
    state.skipped.extend(skipped);
    Ok(stack)
}
