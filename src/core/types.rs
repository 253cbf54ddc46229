//! Project file schema, synthesized graph types, lock/plan types, and
//! provenance events.
//!
//! Configuration types derive Serialize/Deserialize for YAML roundtripping
//! and JsonSchema for `stackwright schema`. Graph types serialize to the JSON
//! consumed by the deployment tool.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ============================================================================
// Top-level stackwright.yaml
// ============================================================================

/// Root configuration: the static parameters of every deployment.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProjectConfig {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Project key, used as the prefix of every physical name
    pub project: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Global parameters (templatable)
    #[serde(default)]
    #[schemars(with = "HashMap<String, serde_json::Value>")]
    pub params: HashMap<String, serde_yaml_ng::Value>,

    /// Target account id
    pub account: String,

    /// Target region
    pub region: String,

    /// Prefix shared by every organization-owned table and function
    pub organization_prefix: String,

    /// Apex domain; API and media hosts hang off it
    pub base_domain: String,

    /// Deployment targets keyed by stage name (order-preserving)
    pub stages: IndexMap<String, Stage>,

    /// API definition and its resource controllers
    pub api: ApiConfig,

    /// Stage-dependent tables, provisioned inside the API stack
    #[serde(default)]
    pub tables: IndexMap<String, TableSchema>,

    /// Stage-independent tables, provisioned in the shared tables stack
    #[serde(default)]
    pub shared_tables: IndexMap<String, TableSchema>,

    /// Shared media bucket layout
    #[serde(default)]
    pub media: MediaConfig,

    /// Identity provider settings
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Front-end hosting settings
    #[serde(default)]
    pub frontend: FrontendConfig,
}

// ============================================================================
// Stages
// ============================================================================

/// A named deployment target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Stage {
    /// Front-end domain for this stage
    pub domain: String,

    /// Extra domains served by the same front-end distribution
    #[serde(default)]
    pub alternative_domains: Vec<String>,

    /// Keep tables and buckets when the stack is deleted
    #[serde(default)]
    pub retain_data: bool,
}

// ============================================================================
// API
// ============================================================================

/// API definition document and compute defaults.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ApiConfig {
    /// Path to the OpenAPI document (relative to the project file)
    pub definition: String,

    /// Function runtime identifier
    #[serde(default = "default_runtime")]
    pub runtime: String,

    /// Directory holding the bundled handlers
    #[serde(default = "default_handler_dir")]
    pub handler_dir: String,

    /// Default memory size for every compute unit
    #[serde(default = "default_memory_mb")]
    pub memory_mb: u32,

    /// Default timeout for every compute unit
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u32,

    /// Resource controllers keyed by resource name (order-preserving)
    #[serde(default)]
    pub controllers: IndexMap<String, ResourceController>,
}

fn default_runtime() -> String {
    "nodejs20.x".to_string()
}

fn default_handler_dir() -> String {
    "back-end/output/handlers".to_string()
}

fn default_memory_mb() -> u32 {
    768
}

fn default_timeout_seconds() -> u32 {
    30
}

/// Pairs one compute unit with the API paths it serves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ResourceController {
    /// Path patterns as written in the API document (e.g. `/books/{bookId}`)
    #[serde(default)]
    pub paths: Vec<String>,

    /// Install this unit as the request authorizer
    #[serde(default)]
    pub is_authorizer: bool,

    /// Memory override
    #[serde(default)]
    pub memory_mb: Option<u32>,

    /// Timeout override
    #[serde(default)]
    pub timeout_seconds: Option<u32>,
}

// ============================================================================
// Tables
// ============================================================================

/// Keys, indexes, stream and expiry of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TableSchema {
    pub partition_key: KeySpec,

    #[serde(default)]
    pub sort_key: Option<KeySpec>,

    #[serde(default)]
    pub indexes: Vec<IndexSpec>,

    #[serde(default)]
    pub stream: Option<StreamMode>,

    /// Expiry (TTL) attribute name
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// A key attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct KeySpec {
    pub name: String,

    #[serde(rename = "type", default)]
    pub key_type: KeyType,
}

/// Key attribute type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    #[default]
    String,
    Number,
    Binary,
}

/// A global secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IndexSpec {
    pub name: String,

    pub partition_key: KeySpec,

    #[serde(default)]
    pub sort_key: Option<KeySpec>,

    #[serde(default)]
    pub projection: Projection,
}

/// Attributes projected into an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Projection {
    #[default]
    All,
    KeysOnly,
}

/// Change-stream view type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    KeysOnly,
    NewImage,
    OldImage,
    NewAndOldImages,
}

// ============================================================================
// Media, identity, front-end
// ============================================================================

/// Layout of the shared media bucket.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MediaConfig {
    /// Bucket name (default: `{project}-media`, templatable)
    #[serde(default)]
    pub bucket: Option<String>,

    /// Folders under each stage's segment of the bucket
    #[serde(default = "default_media_folders")]
    pub folders: Vec<String>,

    /// Folder that receives the one-time asset upload
    #[serde(default)]
    pub assets_folder: Option<String>,

    /// Local directory uploaded into the assets folder
    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            folders: default_media_folders(),
            assets_folder: None,
            assets_dir: default_assets_dir(),
        }
    }
}

fn default_media_folders() -> Vec<String> {
    vec!["images".to_string(), "attachments".to_string()]
}

fn default_assets_dir() -> String {
    "assets".to_string()
}

/// Identity provider (user pool) settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct IdentityConfig {
    /// Pool name (default: `{project}`)
    #[serde(default)]
    pub user_pool_name: Option<String>,

    /// Let users register themselves
    #[serde(default)]
    pub self_sign_up: bool,
}

/// Static website hosting settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FrontendConfig {
    #[serde(default = "default_index_document")]
    pub index_document: String,

    #[serde(default = "default_index_document")]
    pub error_document: String,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            index_document: default_index_document(),
            error_document: default_index_document(),
        }
    }
}

fn default_index_document() -> String {
    "index.html".to_string()
}

// ============================================================================
// Stacks
// ============================================================================

/// The stacks every synthesis produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StackKind {
    SharedTables,
    Media,
    ApiDomain,
    Identity,
    Api,
    FrontEnd,
}

impl StackKind {
    /// All kinds, in declaration order.
    pub const ALL: [StackKind; 6] = [
        Self::SharedTables,
        Self::Media,
        Self::ApiDomain,
        Self::Identity,
        Self::Api,
        Self::FrontEnd,
    ];

    /// Whether a separate copy of this stack exists per stage.
    pub fn stage_dependent(self) -> bool {
        matches!(self, Self::Api | Self::FrontEnd)
    }

    /// Stack name: `{project}-{kind}` or `{project}-{stage}-{kind}`.
    pub fn stack_name(self, project: &str, stage: &str) -> String {
        if self.stage_dependent() {
            format!("{}-{}-{}", project, stage, self)
        } else {
            format!("{}-{}", project, self)
        }
    }
}

impl fmt::Display for StackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SharedTables => write!(f, "shared-tables"),
            Self::Media => write!(f, "media"),
            Self::ApiDomain => write!(f, "api-domain"),
            Self::Identity => write!(f, "identity"),
            Self::Api => write!(f, "api"),
            Self::FrontEnd => write!(f, "front-end"),
        }
    }
}

// ============================================================================
// Resource graph
// ============================================================================

/// Render a reference to an attribute of a resource in the same stack.
pub fn token(logical_id: &str, attribute: &str) -> String {
    format!("${{{}.{}}}", logical_id, attribute)
}

/// Render a reference to another stack's output.
pub fn import_token(stack: &str, output: &str) -> String {
    format!("${{import:{}.{}}}", stack, output)
}

/// What happens to stored data when the owning stack is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    Retain,
    Destroy,
}

impl RemovalPolicy {
    pub fn from_retain(retain: bool) -> Self {
        if retain {
            Self::Retain
        } else {
            Self::Destroy
        }
    }
}

/// One provisioned resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceSpec {
    Function(FunctionSpec),
    Table(TableSpec),
    Policy(PolicySpec),
    InvokePermission(PermissionSpec),
    HttpApi(HttpApiSpec),
    ApiMapping(ApiMappingSpec),
    DomainName(DomainNameSpec),
    Certificate(CertificateSpec),
    Bucket(BucketSpec),
    Distribution(DistributionSpec),
    AssetUpload(AssetUploadSpec),
    UserPool(UserPoolSpec),
    UserPoolClient(UserPoolClientSpec),
    DnsRecord(DnsRecordSpec),
}

impl ResourceSpec {
    /// Short type name, as serialized in the `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Function(_) => "function",
            Self::Table(_) => "table",
            Self::Policy(_) => "policy",
            Self::InvokePermission(_) => "invoke_permission",
            Self::HttpApi(_) => "http_api",
            Self::ApiMapping(_) => "api_mapping",
            Self::DomainName(_) => "domain_name",
            Self::Certificate(_) => "certificate",
            Self::Bucket(_) => "bucket",
            Self::Distribution(_) => "distribution",
            Self::AssetUpload(_) => "asset_upload",
            Self::UserPool(_) => "user_pool",
            Self::UserPoolClient(_) => "user_pool_client",
            Self::DnsRecord(_) => "dns_record",
        }
    }
}

/// A stateless compute unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub function_name: String,
    pub runtime: String,
    pub handler: String,
    pub code_path: String,
    pub memory_mb: u32,
    pub timeout_seconds: u32,
    /// Environment bindings (sorted for stable output)
    pub environment: BTreeMap<String, String>,
    /// Logical ids of the shared policies attached to the execution role
    pub policies: Vec<String>,
}

/// A provisioned table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub table_name: String,
    pub partition_key: KeySpec,
    pub sort_key: Option<KeySpec>,
    pub indexes: Vec<IndexSpec>,
    pub stream: Option<StreamMode>,
    pub time_to_live_attribute: Option<String>,
    pub billing_mode: String,
    pub point_in_time_recovery: bool,
    pub removal_policy: RemovalPolicy,
    /// Logical ids of the compute units granted read/write
    pub read_write: Vec<String>,
}

/// A managed policy shared by many execution roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySpec {
    pub policy_name: String,
    pub statements: Vec<PolicyStatement>,
    /// Logical ids of the compute units this policy is attached to
    pub attached_to: Vec<String>,
}

/// One allow statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStatement {
    pub effect: String,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

impl PolicyStatement {
    pub fn allow(actions: &[&str], resources: Vec<String>) -> Self {
        Self {
            effect: "Allow".to_string(),
            actions: actions.iter().map(|a| a.to_string()).collect(),
            resources,
        }
    }
}

/// Lets the gateway invoke one compute unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSpec {
    pub function: String,
    pub action: String,
    pub principal: String,
    pub source_arn: String,
}

/// The managed HTTP API, defined by the transformed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpApiSpec {
    pub name: String,
    pub body: serde_json::Value,
    pub disable_execute_api_endpoint: bool,
}

/// Maps a stage of the API onto a path of the custom domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMappingSpec {
    pub domain_name: String,
    pub api: String,
    pub api_stage: String,
    pub mapping_key: String,
}

/// A custom API domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainNameSpec {
    pub domain_name: String,
    pub certificate: String,
}

/// A DNS-validated certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateSpec {
    pub domain_name: String,
    pub subject_alternative_names: Vec<String>,
    pub validation: String,
}

/// An object-storage bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSpec {
    pub bucket_name: String,
    pub removal_policy: RemovalPolicy,
    pub block_public_access: bool,
    pub cors: Vec<CorsRule>,
    pub website: Option<WebsiteSpec>,
}

/// Browser upload rule on a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorsRule {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub max_age_seconds: u32,
}

/// Static website documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsiteSpec {
    pub index_document: String,
    pub error_document: String,
}

/// A CDN distribution in front of a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionSpec {
    pub origin: String,
    pub domain_names: Vec<String>,
    pub certificate: Option<String>,
    pub default_root_object: Option<String>,
    pub error_responses: Vec<ErrorResponse>,
    pub price_class: String,
}

/// CDN error rewrite (SPA routing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub http_status: u16,
    pub response_http_status: u16,
    pub response_page_path: String,
}

/// One-time upload of a local directory into a bucket prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetUploadSpec {
    pub bucket: String,
    pub destination_prefix: String,
    pub source_dir: String,
    pub files: Vec<AssetFile>,
    pub prune: bool,
}

/// A file in an asset upload, fingerprinted for change detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFile {
    pub path: String,
    pub sha256: String,
}

/// The identity provider's user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPoolSpec {
    pub user_pool_name: String,
    pub sign_in_aliases: Vec<String>,
    pub self_sign_up_enabled: bool,
    pub removal_policy: RemovalPolicy,
}

/// An app client of a user pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPoolClientSpec {
    pub user_pool: String,
    pub client_name: String,
    pub generate_secret: bool,
}

/// An alias record pointing a domain at a managed target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecordSpec {
    pub record_name: String,
    pub record_type: String,
    pub target: String,
}

/// One synthesized stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedStack {
    pub name: String,
    pub kind: StackKind,
    pub stage_dependent: bool,
    pub depends_on: Vec<String>,
    pub resources: IndexMap<String, ResourceSpec>,
    pub outputs: IndexMap<String, String>,
}

impl SynthesizedStack {
    pub fn new(name: String, kind: StackKind) -> Self {
        Self {
            name,
            kind,
            stage_dependent: kind.stage_dependent(),
            depends_on: Vec::new(),
            resources: IndexMap::new(),
            outputs: IndexMap::new(),
        }
    }
}

/// Why a declared binding did not attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    PathNotInDocument,
    SecuritySchemeMissing,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PathNotInDocument => write!(f, "path not in API definition"),
            Self::SecuritySchemeMissing => write!(f, "security scheme not in API definition"),
        }
    }
}

/// A binding that a controller declared but the document could not take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedBinding {
    pub controller: String,
    /// Path for a proxy binding, scheme key for an authorizer
    pub path: String,
    pub reason: SkipReason,
}

impl fmt::Display for SkippedBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.controller, self.path, self.reason)
    }
}

/// Result of one synthesis run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesizedApp {
    pub project: String,
    pub stage: String,
    /// Stack names in dependency order
    pub build_order: Vec<String>,
    pub stacks: IndexMap<String, SynthesizedStack>,
    /// Transformed API document
    pub api_definition: serde_json::Value,
    pub skipped: Vec<SkippedBinding>,
}

impl SynthesizedApp {
    /// Total resources across all stacks.
    pub fn resource_count(&self) -> usize {
        self.stacks.values().map(|s| s.resources.len()).sum()
    }

    /// Every resource keyed by `stack/logical-id`, in build order.
    pub fn qualified_resources(&self) -> Vec<(String, &SynthesizedStack, &ResourceSpec)> {
        let mut out = Vec::new();
        for stack in self.stacks.values() {
            for (id, spec) in &stack.resources {
                out.push((format!("{}/{}", stack.name, id), stack, spec));
            }
        }
        out
    }
}

// ============================================================================
// Lock file
// ============================================================================

/// Per-stage synthesis lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthLock {
    pub schema: String,
    pub project: String,
    pub stage: String,
    pub generated_at: String,
    pub generator: String,
    /// Hash over every resource hash, in build order
    pub graph_hash: String,
    pub inputs: InputHashes,
    /// Per-resource hashes keyed by `stack/logical-id`
    pub resources: IndexMap<String, ResourceLock>,
}

/// Hashes of the files a synthesis read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputHashes {
    pub config_path: String,
    pub config: String,
    pub api_definition_path: String,
    pub api_definition: String,
    #[serde(default)]
    pub assets_path: Option<String>,
    #[serde(default)]
    pub assets: Option<String>,
}

/// Per-resource lock entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLock {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub stack: String,
    pub hash: String,
}

// ============================================================================
// Plan
// ============================================================================

/// Action the deployment tool will take on a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanAction {
    Create,
    Update,
    Destroy,
    NoOp,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Update => write!(f, "UPDATE"),
            Self::Destroy => write!(f, "DESTROY"),
            Self::NoOp => write!(f, "NO-OP"),
        }
    }
}

/// A single planned change.
#[derive(Debug, Clone)]
pub struct PlannedChange {
    /// `stack/logical-id`
    pub resource_id: String,
    pub stack: String,
    pub resource_type: String,
    pub action: PlanAction,
    pub description: String,
}

/// Diff between a synthesis and the previous lock.
#[derive(Debug, Clone)]
pub struct SynthPlan {
    pub project: String,
    pub stage: String,
    pub changes: Vec<PlannedChange>,
    pub build_order: Vec<String>,
    pub to_create: u32,
    pub to_update: u32,
    pub to_destroy: u32,
    pub unchanged: u32,
}

// ============================================================================
// Provenance events
// ============================================================================

/// Provenance event for the JSONL event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SynthEvent {
    SynthStarted {
        project: String,
        stage: String,
        run_id: String,
        stackwright_version: String,
    },
    StackSynthesized {
        run_id: String,
        stack: String,
        resources: u32,
        hash: String,
    },
    BindingSkipped {
        run_id: String,
        controller: String,
        path: String,
        reason: SkipReason,
    },
    SynthCompleted {
        run_id: String,
        stacks: u32,
        resources: u32,
        graph_hash: String,
        total_seconds: f64,
    },
    SynthFailed {
        run_id: String,
        error: String,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: SynthEvent,
}

// ============================================================================
// Template helper
// ============================================================================

/// Convert a serde_yaml_ng::Value to a string for template resolution.
pub fn yaml_value_to_string(val: &serde_yaml_ng::Value) -> String {
    match val {
        serde_yaml_ng::Value::String(s) => s.clone(),
        serde_yaml_ng::Value::Number(n) => n.to_string(),
        serde_yaml_ng::Value::Bool(b) => b.to_string(),
        serde_yaml_ng::Value::Null => String::new(),
        other => format!("{:?}", other),
    }
}

// ============================================================================
// Tests
// ============================================================================
