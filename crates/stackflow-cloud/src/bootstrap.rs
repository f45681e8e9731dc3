//! Compute-instance bootstrap sequences
//!
//! The generator turns a resolved graph, its grants and a [`ProvisionProfile`]
//! into an ordered list of shell steps grouped into five barrier phases:
//!
//! 1. web server
//! 2. application runtime
//! 3. source retrieval
//! 4. environment materialization
//! 5. application initialization
//!
//! Every step can be re-run on an instance that already completed it and
//! leaves the same end state. Secrets are fetched on the instance at boot time
//! through its own identity and only ever land in the runtime environment file.

use crate::error::{CloudError, Result};
use crate::grant::GrantRule;
use crate::graph::{AccessAction, EdgeKind, ResourceGraph};
use crate::resource::{AttrValue, Resource, ResourceId, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, instrument};

/// Barrier phase of a bootstrap sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    WebServer,
    Runtime,
    Source,
    Environment,
    Application,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::WebServer,
        Phase::Runtime,
        Phase::Source,
        Phase::Environment,
        Phase::Application,
    ];

    /// 1-based position of the phase
    pub fn index(self) -> u8 {
        match self {
            Phase::WebServer => 1,
            Phase::Runtime => 2,
            Phase::Source => 3,
            Phase::Environment => 4,
            Phase::Application => 5,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Phase::WebServer => "web server",
            Phase::Runtime => "application runtime",
            Phase::Source => "source retrieval",
            Phase::Environment => "environment",
            Phase::Application => "application initialization",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}. {}", self.index(), self.title())
    }
}

/// What a step does
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// Package index refresh
    Refresh,
    /// Package install; `service` names the unit the packages provide
    Install {
        packages: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        service: Option<String>,
    },
    /// Asset download from the asset bucket
    Download { asset: String },
    /// Configuration change for an installed service
    Configure { service: String },
    Enable { service: String },
    Start { service: String },
    /// Checkout of the pinned application source
    Clone { repository: String, reference: String },
    /// Upsert of one key in the runtime environment file
    WriteEnv { key: String },
    Run,
}

/// A single bootstrap step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapStep {
    /// 1-based, contiguous
    pub order: usize,
    pub phase: Phase,
    pub kind: StepKind,
    pub description: String,
    /// Shell lines; one command per line
    pub command: String,
    pub may_read_secret: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writes: Option<String>,
}

/// Ordered bootstrap steps for one compute instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapSequence {
    pub instance: ResourceId,
    pub region: String,
    /// Absolute path of the runtime environment file
    pub env_file: String,
    /// Variables exported before the first step
    pub environment: BTreeMap<String, String>,
    pub steps: Vec<BootstrapStep>,
}

impl BootstrapSequence {
    pub fn steps_in(&self, phase: Phase) -> impl Iterator<Item = &BootstrapStep> {
        self.steps.iter().filter(move |s| s.phase == phase)
    }

    /// Check the structural guarantees of the sequence
    pub fn validate(&self) -> Result<()> {
        let mut installed: BTreeSet<&str> = BTreeSet::new();
        let mut runtime_installed = false;
        let mut previous = Phase::WebServer;

        for (i, step) in self.steps.iter().enumerate() {
            if step.order != i + 1 {
                return Err(CloudError::InvalidBootstrap(format!(
                    "step at position {} has order index {}",
                    i + 1,
                    step.order
                )));
            }
            if step.phase < previous {
                return Err(CloudError::InvalidBootstrap(format!(
                    "step {} ({}) runs after phase {}",
                    step.order, step.phase, previous
                )));
            }
            previous = step.phase;

            match &step.kind {
                StepKind::Install { service, .. } => {
                    if let Some(service) = service {
                        installed.insert(service.as_str());
                    }
                    if step.phase == Phase::Runtime {
                        runtime_installed = true;
                    }
                }
                StepKind::Configure { service }
                | StepKind::Enable { service }
                | StepKind::Start { service } => {
                    if !installed.contains(service.as_str()) {
                        return Err(CloudError::InvalidBootstrap(format!(
                            "step {} touches service '{}' before it is installed",
                            step.order, service
                        )));
                    }
                }
                StepKind::Clone { .. } => {
                    if !runtime_installed {
                        return Err(CloudError::InvalidBootstrap(format!(
                            "step {} retrieves source before the runtime is installed",
                            step.order
                        )));
                    }
                }
                _ => {}
            }

            if step.may_read_secret {
                let writes_env = step.writes.as_deref() == Some(self.env_file.as_str());
                if !writes_env || !matches!(step.kind, StepKind::WriteEnv { .. }) {
                    return Err(CloudError::InvalidBootstrap(format!(
                        "step {} reads a secret but does not write only to {}",
                        step.order, self.env_file
                    )));
                }
            }
        }

        Ok(())
    }
}

/// A service and the packages that provide it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePackages {
    pub packages: Vec<String>,
    pub service: String,
}

/// Object in the asset bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    pub name: String,
    pub bucket: AttrValue,
    pub key: String,
}

impl AssetRef {
    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket.token(), self.key)
    }
}

/// Config file edit switching the runtime's worker user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerIdentity {
    pub config_file: String,
    pub from_user: String,
    pub to_user: String,
}

/// Pinned application repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRepository {
    pub url: String,
    /// Branch or tag passed to `git clone --branch`
    pub reference: String,
    /// Absolute checkout path
    pub path: String,
}

impl SourceRepository {
    fn parent(&self) -> &str {
        match self.path.rsplit_once('/') {
            Some(("", _)) | None => "/",
            Some((parent, _)) => parent,
        }
    }
}

/// Everything about the instance that is not derived from the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionProfile {
    pub refresh_command: String,
    /// Install command prefix; packages are appended
    pub install_command: String,
    pub web_server: ServicePackages,
    pub web_server_config: AssetRef,
    pub web_server_config_path: String,
    pub runtime: ServicePackages,
    pub worker_identity: WorkerIdentity,
    /// Commands installing the dependency manager
    pub dependency_manager: Vec<String>,
    pub source: SourceRepository,
    pub env_template: AssetRef,
    /// Environment file name inside the checkout
    pub env_file: String,
    /// Commands run from the checkout in phase 5
    pub init_commands: Vec<String>,
    /// `user:group` owning the checkout
    pub owner: String,
    pub asset_dir: String,
    pub environment: BTreeMap<String, String>,
}

impl ProvisionProfile {
    pub fn env_path(&self) -> String {
        format!("{}/{}", self.source.path.trim_end_matches('/'), self.env_file)
    }

    fn asset_path(&self, asset: &AssetRef) -> String {
        format!("{}/{}", self.asset_dir.trim_end_matches('/'), asset.name)
    }

    fn validate(&self) -> Result<()> {
        let words = [
            ("web_server_config_path", self.web_server_config_path.as_str()),
            ("worker_identity.config_file", self.worker_identity.config_file.as_str()),
            ("worker_identity.from_user", self.worker_identity.from_user.as_str()),
            ("worker_identity.to_user", self.worker_identity.to_user.as_str()),
            ("source.url", self.source.url.as_str()),
            ("source.reference", self.source.reference.as_str()),
            ("source.path", self.source.path.as_str()),
            ("env_file", self.env_file.as_str()),
            ("owner", self.owner.as_str()),
            ("asset_dir", self.asset_dir.as_str()),
            ("web_server.service", self.web_server.service.as_str()),
            ("runtime.service", self.runtime.service.as_str()),
        ];
        for (field, value) in words {
            validate_shell_word(field, value)?;
        }
        for asset in [&self.web_server_config, &self.env_template] {
            validate_shell_word("asset.name", &asset.name)?;
            validate_shell_word("asset.key", &asset.key)?;
        }
        for package in self.web_server.packages.iter().chain(&self.runtime.packages) {
            validate_shell_word("package", package)?;
        }
        for (name, value) in &self.environment {
            if !is_env_key(name) {
                return Err(CloudError::InvalidConfig(format!(
                    "invalid environment variable name '{}'",
                    name
                )));
            }
            validate_shell_input(name, value)?;
        }
        if !self.source.path.starts_with('/') {
            return Err(CloudError::InvalidConfig(format!(
                "source path must be absolute: {}",
                self.source.path
            )));
        }
        if self.web_server.packages.is_empty() || self.runtime.packages.is_empty() {
            return Err(CloudError::InvalidConfig(
                "web server and runtime need at least one package".to_string(),
            ));
        }
        Ok(())
    }
}

/// Value of a runtime environment variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeValue {
    /// Literal, deferred or imported value interpolated at boot time
    Value { value: AttrValue },
    /// Field of a secret, fetched by the instance at boot time
    Secret { store: ResourceId, field: String },
}

/// Ordered runtime environment inputs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeInputs {
    entries: Vec<(String, RuntimeValue)>,
}

impl RuntimeInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, keeping its first position if it already exists
    pub fn set(&mut self, key: impl Into<String>, value: RuntimeValue) -> &mut Self {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    pub fn literal(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.set(
            key,
            RuntimeValue::Value {
                value: AttrValue::literal(value),
            },
        )
    }

    pub fn attribute(&mut self, key: impl Into<String>, value: AttrValue) -> &mut Self {
        self.set(key, RuntimeValue::Value { value })
    }

    pub fn secret(
        &mut self,
        key: impl Into<String>,
        store: impl Into<ResourceId>,
        field: impl Into<String>,
    ) -> &mut Self {
        self.set(
            key,
            RuntimeValue::Secret {
                store: store.into(),
                field: field.into(),
            },
        )
    }

    pub fn get(&self, key: &str) -> Option<&RuntimeValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RuntimeValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn has_secrets(&self) -> bool {
        self.entries
            .iter()
            .any(|(_, v)| matches!(v, RuntimeValue::Secret { .. }))
    }
}

const FORBIDDEN: &[char] = &['"', '\\', '`', '$', '\n', '\r'];
const FORBIDDEN_IN_WORD: &[char] = &[
    ' ', '\t', '\'', ';', '|', '&', '<', '>', '(', ')', '*', '?', '!', '#',
];

/// Reject characters that break out of a double-quoted shell string
pub fn validate_shell_input(field: &str, value: &str) -> Result<()> {
    if let Some(found) = value.chars().find(|c| FORBIDDEN.contains(c)) {
        return Err(CloudError::UnsafeShellInput {
            field: field.to_string(),
            found,
        });
    }
    Ok(())
}

/// Stricter check for values placed unquoted on a command line
pub fn validate_shell_word(field: &str, value: &str) -> Result<()> {
    validate_shell_input(field, value)?;
    if let Some(found) = value.chars().find(|c| FORBIDDEN_IN_WORD.contains(c)) {
        return Err(CloudError::UnsafeShellInput {
            field: field.to_string(),
            found,
        });
    }
    if value.is_empty() {
        return Err(CloudError::InvalidConfig(format!("{} cannot be empty", field)));
    }
    Ok(())
}

fn is_env_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase() || c == '_')
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn is_secret_field(field: &str) -> bool {
    !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Accumulates steps and numbers them
struct StepBuilder {
    steps: Vec<BootstrapStep>,
    phase: Phase,
}

impl StepBuilder {
    fn new() -> Self {
        Self {
            steps: Vec::new(),
            phase: Phase::WebServer,
        }
    }

    fn phase(&mut self, phase: Phase) -> &mut Self {
        self.phase = phase;
        self
    }

    fn push(&mut self, kind: StepKind, description: impl Into<String>, command: impl Into<String>) {
        self.push_step(kind, description.into(), command.into(), false, None);
    }

    fn push_step(
        &mut self,
        kind: StepKind,
        description: String,
        command: String,
        may_read_secret: bool,
        writes: Option<String>,
    ) {
        let step = BootstrapStep {
            order: self.steps.len() + 1,
            phase: self.phase,
            kind,
            description,
            command,
            may_read_secret,
            writes,
        };
        debug!(order = step.order, phase = %step.phase, "Bootstrap step: {}", step.description);
        self.steps.push(step);
    }
}

/// Builds the bootstrap sequence of a stack's compute instance
#[derive(Debug, Clone)]
pub struct BootstrapScriptGenerator {
    profile: ProvisionProfile,
}

impl BootstrapScriptGenerator {
    pub fn new(profile: ProvisionProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &ProvisionProfile {
        &self.profile
    }

    #[instrument(skip_all, fields(stack = %graph.stack()))]
    pub fn generate(
        &self,
        graph: &ResourceGraph,
        grants: &[GrantRule],
        inputs: &RuntimeInputs,
    ) -> Result<BootstrapSequence> {
        if !graph.is_sealed() {
            return Err(CloudError::OrderingViolation(format!(
                "bootstrap requested for unresolved stack '{}'",
                graph.stack()
            )));
        }
        let instance = single_instance(graph)?;
        self.profile.validate()?;
        check_grants(graph, grants, &instance.id)?;
        check_inputs(graph, grants, &instance.id, inputs)?;

        let p = &self.profile;
        let env_path = p.env_path();
        let mut b = StepBuilder::new();

        // 1. web server
        b.phase(Phase::WebServer);
        b.push(StepKind::Refresh, "refresh package index", p.refresh_command.as_str());
        b.push(
            StepKind::Install {
                packages: p.web_server.packages.clone(),
                service: Some(p.web_server.service.clone()),
            },
            format!("install {}", p.web_server.service),
            self.install_line(&p.web_server.packages),
        );
        self.push_download(&mut b, &p.web_server_config, graph.region());
        b.push(
            StepKind::Configure {
                service: p.web_server.service.clone(),
            },
            format!("place {} configuration", p.web_server.service),
            format!(
                "install -m 0644 {} {}",
                p.asset_path(&p.web_server_config),
                p.web_server_config_path
            ),
        );
        self.push_service(&mut b, &p.web_server.service);

        // 2. runtime
        b.phase(Phase::Runtime);
        b.push(
            StepKind::Install {
                packages: p.runtime.packages.clone(),
                service: Some(p.runtime.service.clone()),
            },
            format!("install {}", p.runtime.packages.join(" ")),
            self.install_line(&p.runtime.packages),
        );
        let identity = &p.worker_identity;
        b.push(
            StepKind::Configure {
                service: p.runtime.service.clone(),
            },
            format!("run {} workers as {}", p.runtime.service, identity.to_user),
            format!(
                "sed -i 's/^user = {from}$/user = {to}/' {file}\nsed -i 's/^group = {from}$/group = {to}/' {file}",
                from = identity.from_user,
                to = identity.to_user,
                file = identity.config_file
            ),
        );
        if !p.dependency_manager.is_empty() {
            b.push(
                StepKind::Run,
                "install dependency manager",
                p.dependency_manager.join("\n"),
            );
        }
        self.push_service(&mut b, &p.runtime.service);

        // 3. source
        b.phase(Phase::Source);
        let git = vec!["git".to_string()];
        b.push(
            StepKind::Install {
                packages: git.clone(),
                service: None,
            },
            "install git",
            self.install_line(&git),
        );
        b.push(
            StepKind::Clone {
                repository: p.source.url.clone(),
                reference: p.source.reference.clone(),
            },
            format!("check out {}@{}", p.source.url, p.source.reference),
            format!(
                "mkdir -p {parent}\nif [ ! -d {path}/.git ]; then\n  git clone --depth 1 --branch {reference} {url} {path}\nfi",
                parent = p.source.parent(),
                path = p.source.path,
                reference = p.source.reference,
                url = p.source.url
            ),
        );

        // 4. environment
        b.phase(Phase::Environment);
        if inputs.has_secrets() {
            let jq = vec!["jq".to_string()];
            b.push(
                StepKind::Install {
                    packages: jq.clone(),
                    service: None,
                },
                "install jq",
                self.install_line(&jq),
            );
        }
        self.push_download(&mut b, &p.env_template, graph.region());
        b.push_step(
            StepKind::Run,
            "place environment template".to_string(),
            format!(
                "if [ ! -f {env} ]; then\n  install -m 0640 {asset} {env}\nfi",
                env = env_path,
                asset = p.asset_path(&p.env_template)
            ),
            false,
            Some(env_path.clone()),
        );
        for (key, value) in inputs.iter() {
            let (command, secret) = match value {
                RuntimeValue::Value { value } => (upsert_value(&env_path, key, value), false),
                RuntimeValue::Secret { store, field } => {
                    let token = secret_token(graph, store)?;
                    (
                        upsert_secret(&env_path, key, graph.region(), &token, field),
                        true,
                    )
                }
            };
            let description = if secret {
                format!("write {} from secret store", key)
            } else {
                format!("write {}", key)
            };
            b.push_step(
                StepKind::WriteEnv {
                    key: key.to_string(),
                },
                description,
                command,
                secret,
                Some(env_path.clone()),
            );
        }

        // 5. application
        b.phase(Phase::Application);
        for command in &p.init_commands {
            b.push(
                StepKind::Run,
                command.as_str(),
                format!("cd {}\n{}", p.source.path, command),
            );
        }
        b.push(
            StepKind::Run,
            format!("hand {} to {}", p.source.path, p.owner),
            format!("chown -R {} {}", p.owner, p.source.path),
        );

        let sequence = BootstrapSequence {
            instance: instance.id.clone(),
            region: graph.region().to_string(),
            env_file: env_path,
            environment: p.environment.clone(),
            steps: b.steps,
        };
        sequence.validate()?;

        info!(
            instance = %sequence.instance,
            steps = sequence.steps.len(),
            "Generated bootstrap sequence"
        );
        Ok(sequence)
    }

    fn install_line(&self, packages: &[String]) -> String {
        format!("{} {}", self.profile.install_command, packages.join(" "))
    }

    fn push_download(&self, b: &mut StepBuilder, asset: &AssetRef, region: &str) {
        let p = &self.profile;
        b.push(
            StepKind::Download {
                asset: asset.name.clone(),
            },
            format!("download {}", asset.name),
            format!(
                "mkdir -p {dir}\naws s3 cp --region {region} \"{uri}\" {dest}",
                dir = p.asset_dir,
                uri = asset.uri(),
                dest = p.asset_path(asset)
            ),
        );
    }

    fn push_service(&self, b: &mut StepBuilder, service: &str) {
        b.push(
            StepKind::Enable {
                service: service.to_string(),
            },
            format!("enable {}", service),
            format!("systemctl enable {}", service),
        );
        b.push(
            StepKind::Start {
                service: service.to_string(),
            },
            format!("start {}", service),
            format!("systemctl restart {}", service),
        );
    }
}

fn single_instance(graph: &ResourceGraph) -> Result<&Resource> {
    let mut instances = graph
        .resources_of(ResourceKind::ComputeInstance)
        .filter(|r| !r.is_external());
    let instance = instances.next().ok_or_else(|| {
        CloudError::InvalidConfig(format!(
            "stack '{}' has no compute instance to bootstrap",
            graph.stack()
        ))
    })?;
    if let Some(other) = instances.next() {
        return Err(CloudError::InvalidConfig(format!(
            "stack '{}' has more than one compute instance ({}, {})",
            graph.stack(),
            instance.id,
            other.id
        )));
    }
    Ok(instance)
}

/// Every data-plane edge ending at the instance needs a covering grant
fn check_grants(graph: &ResourceGraph, grants: &[GrantRule], instance: &ResourceId) -> Result<()> {
    for edge in graph.edges() {
        if edge.consumer != *instance || !edge.is_data_plane() {
            continue;
        }
        if !grants.iter().any(|g| g.covers(edge)) {
            return Err(CloudError::MissingGrant {
                producer: edge.producer.to_string(),
                consumer: edge.consumer.to_string(),
                kind: edge.kind.to_string(),
            });
        }
    }
    Ok(())
}

fn check_inputs(
    graph: &ResourceGraph,
    grants: &[GrantRule],
    instance: &ResourceId,
    inputs: &RuntimeInputs,
) -> Result<()> {
    for (key, value) in inputs.iter() {
        if !is_env_key(key) {
            return Err(CloudError::InvalidConfig(format!(
                "invalid environment variable name '{}'",
                key
            )));
        }
        match value {
            RuntimeValue::Value {
                value: AttrValue::Literal(literal),
            } => validate_shell_input(key, literal)?,
            RuntimeValue::Value {
                value: AttrValue::Deferred(attr),
            } => {
                if attr.stack == graph.stack() && graph.resource(&attr.resource).is_none() {
                    return Err(CloudError::DanglingReference {
                        stack: graph.stack().to_string(),
                        producer: attr.resource.to_string(),
                        consumer: instance.to_string(),
                        missing: attr.resource.to_string(),
                    });
                }
            }
            RuntimeValue::Value {
                value: AttrValue::Parameter { .. },
            } => {}
            RuntimeValue::Secret { store, field } => {
                if !is_secret_field(field) {
                    return Err(CloudError::InvalidConfig(format!(
                        "invalid secret field '{}' for {}",
                        field, key
                    )));
                }
                let readable = graph.edges().iter().any(|edge| {
                    edge.producer == *store
                        && edge.consumer == *instance
                        && edge.kind == EdgeKind::CredentialAccess
                        && edge.actions.contains(&AccessAction::SecretRead)
                        && grants.iter().any(|g| g.covers(edge))
                });
                if !readable {
                    return Err(CloudError::MissingGrant {
                        producer: store.to_string(),
                        consumer: instance.to_string(),
                        kind: EdgeKind::CredentialAccess.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

fn secret_token(graph: &ResourceGraph, store: &ResourceId) -> Result<String> {
    graph
        .resource(store)
        .and_then(|r| r.attribute("secretArn"))
        .map(|v| v.token())
        .ok_or_else(|| {
            CloudError::InvalidConfig(format!("'{}' does not expose a secretArn attribute", store))
        })
}

fn upsert_value(env_path: &str, key: &str, value: &AttrValue) -> String {
    format!(
        "sed -i '/^{key}=/d' {env}\nprintf '%s\\n' \"{key}={value}\" >> {env}",
        key = key,
        env = env_path,
        value = value.token()
    )
}

fn upsert_secret(env_path: &str, key: &str, region: &str, token: &str, field: &str) -> String {
    format!(
        "value=\"$(aws secretsmanager get-secret-value --region {region} --secret-id \"{token}\" --query SecretString --output text | jq -er '.{field}')\"\nsed -i '/^{key}=/d' {env}\nprintf '{key}=%s\\n' \"$value\" >> {env}",
        region = region,
        token = token,
        field = field,
        key = key,
        env = env_path
    )
}
