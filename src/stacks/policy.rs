//! Shared access policies.
//!
//! Three policies exist per API stack, plus a fourth when shared tables are
//! declared. Each is built once and attached to every compute unit. Attachment is idempotent in both directions: a unit lists a
//! policy at most once and a policy lists a unit at most once.

use super::tables::table_name;
use super::{env_key_segment, ComputeUnits};
use crate::core::resolver::ResolvedConfig;
use crate::core::types::*;
use indexmap::IndexMap;
use std::collections::BTreeMap;

pub const ORGANIZATION_ACCESS: &str = "organization-access";
pub const MEDIA_FOLDERS_ACCESS: &str = "media-folders-access";
pub const SECRETS_READ: &str = "secrets-read";
pub const SHARED_TABLES_ACCESS: &str = "shared-tables-access";
pub const ASSETS_UPLOAD: &str = "assets-upload";

/// Policies keyed by logical id, plus the optional asset upload.
#[derive(Debug, Clone, Default)]
pub struct ComposedPolicies {
    pub policies: IndexMap<String, PolicySpec>,
    pub asset_upload: Option<(String, AssetUploadSpec)>,
}

/// Full access to tables and functions carrying the organization prefix.
pub fn organization_access(ctx: &ResolvedConfig) -> PolicySpec {
    let c = ctx.config;
    let prefix = &c.organization_prefix;
    PolicySpec {
        policy_name: policy_name(ctx, ORGANIZATION_ACCESS),
        statements: vec![
            PolicyStatement::allow(
                &["dynamodb:*"],
                vec![
                    format!("arn:aws:dynamodb:{}:{}:table/{}_*", c.region, c.account, prefix),
                    format!(
                        "arn:aws:dynamodb:{}:{}:table/{}_*/index/*",
                        c.region, c.account, prefix
                    ),
                ],
            ),
            PolicyStatement::allow(
                &["lambda:InvokeFunction"],
                vec![format!(
                    "arn:aws:lambda:{}:{}:function:{}_*",
                    c.region, c.account, prefix
                )],
            ),
        ],
        attached_to: Vec::new(),
    }
}

/// Object access under the stage's segment of the media bucket, plus the
/// environment bindings that tell handlers where each folder lives.
pub fn media_folders_access(
    ctx: &ResolvedConfig,
    bucket: &str,
) -> (PolicySpec, BTreeMap<String, String>) {
    let folders = &ctx.config.media.folders;
    let resources = folders
        .iter()
        .map(|f| format!("arn:aws:s3:::{}/{}/*", bucket, folder_prefix(ctx, f)))
        .collect();
    let policy = PolicySpec {
        policy_name: policy_name(ctx, MEDIA_FOLDERS_ACCESS),
        statements: vec![PolicyStatement::allow(
            &["s3:GetObject", "s3:PutObject", "s3:DeleteObject"],
            resources,
        )],
        attached_to: Vec::new(),
    };

    let mut bindings = BTreeMap::new();
    bindings.insert("S3_BUCKET_MEDIA".to_string(), bucket.to_string());
    for folder in folders {
        bindings.insert(
            format!("S3_{}_FOLDER", env_key_segment(folder)),
            folder_prefix(ctx, folder),
        );
    }
    (policy, bindings)
}

/// Read access to every secret.
pub fn secrets_read(ctx: &ResolvedConfig) -> PolicySpec {
    PolicySpec {
        policy_name: policy_name(ctx, SECRETS_READ),
        statements: vec![PolicyStatement::allow(
            &["secretsmanager:GetSecretValue"],
            vec!["*".to_string()],
        )],
        attached_to: Vec::new(),
    }
}

/// Read/write on the stage-independent tables and their indexes. Their
/// names carry the shared stack's id, not the organization prefix, so the
/// organization policy does not cover them. None when no shared table exists.
pub fn shared_tables_access(ctx: &ResolvedConfig) -> Option<PolicySpec> {
    let c = ctx.config;
    if c.shared_tables.is_empty() {
        return None;
    }
    let shared_stack = ctx.stack_name(StackKind::SharedTables);
    let mut resources = Vec::with_capacity(c.shared_tables.len() * 2);
    for logical in c.shared_tables.keys() {
        let arn = format!(
            "arn:aws:dynamodb:{}:{}:table/{}",
            c.region,
            c.account,
            table_name(&shared_stack, logical)
        );
        let index = format!("{}/index/*", arn);
        resources.push(arn);
        resources.push(index);
    }
    Some(PolicySpec {
        policy_name: policy_name(ctx, SHARED_TABLES_ACCESS),
        statements: vec![PolicyStatement::allow(
            &[
                "dynamodb:GetItem",
                "dynamodb:PutItem",
                "dynamodb:UpdateItem",
                "dynamodb:DeleteItem",
                "dynamodb:Query",
                "dynamodb:Scan",
                "dynamodb:BatchGetItem",
                "dynamodb:BatchWriteItem",
                "dynamodb:ConditionCheckItem",
            ],
            resources,
        )],
        attached_to: Vec::new(),
    })
}

/// One-time upload of the assets directory into the assets folder.
pub fn assets_upload(ctx: &ResolvedConfig, bucket: &str, files: &[AssetFile]) -> Option<AssetUploadSpec> {
    let folder = ctx.config.media.assets_folder.as_ref()?;
    Some(AssetUploadSpec {
        bucket: bucket.to_string(),
        destination_prefix: folder_prefix(ctx, folder),
        source_dir: ctx.config.media.assets_dir.clone(),
        files: files.to_vec(),
        prune: false,
    })
}

/// Attach `policy` (logical id `policy_id`) to every unit.
pub fn attach(policy_id: &str, policy: &mut PolicySpec, units: &mut ComputeUnits) {
    for unit in units.units.values_mut() {
        if !unit.function.policies.iter().any(|p| p == policy_id) {
            unit.function.policies.push(policy_id.to_string());
        }
        if !policy.attached_to.contains(&unit.logical_id) {
            policy.attached_to.push(unit.logical_id.clone());
        }
    }
}

/// Build the shared policies, attach them to every unit and publish
/// the media bindings.
pub fn compose(
    ctx: &ResolvedConfig,
    bucket: &str,
    assets: &[AssetFile],
    units: &mut ComputeUnits,
) -> ComposedPolicies {
    let (media, bindings) = media_folders_access(ctx, bucket);
    let mut policies = IndexMap::new();
    policies.insert(ORGANIZATION_ACCESS.to_string(), organization_access(ctx));
    policies.insert(MEDIA_FOLDERS_ACCESS.to_string(), media);
    policies.insert(SECRETS_READ.to_string(), secrets_read(ctx));
    if let Some(shared) = shared_tables_access(ctx) {
        policies.insert(SHARED_TABLES_ACCESS.to_string(), shared);
    }

    for (id, policy) in policies.iter_mut() {
        attach(id, policy, units);
    }
    units.bind_all_from(&bindings);

    ComposedPolicies {
        policies,
        asset_upload: assets_upload(ctx, bucket, assets).map(|u| (ASSETS_UPLOAD.to_string(), u)),
    }
}

fn policy_name(ctx: &ResolvedConfig, id: &str) -> String {
    format!("{}-{}", ctx.stack_name(StackKind::Api), id)
}

fn folder_prefix(ctx: &ResolvedConfig, folder: &str) -> String {
    format!("{}/{}", ctx.stage_name, folder)
}
