//! Multi-region synthesis
//!
//! Certificate stack first, then the frontend and backend stacks that import
//! from it. Any error aborts the whole run; no partial plan is returned.

use crate::backend::{self, SECRETS, build_backend_graph};
use crate::certificate::{HOSTED_ZONE_NAME, build_certificate_graph};
use crate::error::Result;
use crate::frontend::{self, build_frontend_graph, import};
use crate::profile::{provision_profile, runtime_inputs};
use stackflow_cloud::{
    BootstrapScriptGenerator, CrossRegionReferenceResolver, DeploymentPlan,
    PermissionGrantEngine, ResourceId, StackPlan, render_script,
};
use stackflow_config::{find_deploy_file_from, project_root};
use stackflow_core::{Deployment, DeploymentEnv, SecretValue, StackTarget, load_deployment};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Secret values for the apply engine
///
/// Not serializable; the plan only names the fields.
#[derive(Debug, Clone)]
pub struct SecretBundle {
    pub stack: String,
    pub region: String,
    pub store: ResourceId,
    values: BTreeMap<&'static str, SecretValue>,
}

impl SecretBundle {
    fn new(target: &StackTarget, env: &DeploymentEnv) -> Self {
        Self {
            stack: target.stack.clone(),
            region: target.region.clone(),
            store: ResourceId::new(SECRETS),
            values: env.secrets().map(|(k, v)| (k, v.clone())).collect(),
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.keys().copied()
    }

    pub fn get(&self, field: &str) -> Option<&SecretValue> {
        self.values.get(field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Output of a synthesis run
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub plan: DeploymentPlan,
    pub secrets: SecretBundle,
}

impl Synthesis {
    /// Rendered user-data script of the backend instance
    pub fn user_data(&self) -> Option<&str> {
        self.plan
            .stacks
            .iter()
            .find_map(|stack| stack.bootstrap())
            .map(|artifact| artifact.user_data.as_str())
    }
}

pub struct Synthesizer {
    deployment: Deployment,
    env: DeploymentEnv,
    source: Option<PathBuf>,
}

impl Synthesizer {
    pub fn new(deployment: Deployment, env: DeploymentEnv) -> Self {
        Self {
            deployment,
            env,
            source: None,
        }
    }

    /// Discover `deploy.kdl` from `dir`, read `.env.local` next to it and load both
    #[instrument(fields(dir = %dir.display()))]
    pub fn from_project(dir: &Path) -> Result<Self> {
        let path = find_deploy_file_from(dir)?;
        let root = project_root(&path);
        let env = DeploymentEnv::load(&root)?;
        let deployment = load_deployment(&path, &env)?;
        Ok(Self {
            deployment,
            env,
            source: Some(path),
        })
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    pub fn env(&self) -> &DeploymentEnv {
        &self.env
    }

    /// The description file, when loaded from disk
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Directory plans are stored under
    pub fn project_root(&self) -> PathBuf {
        self.source
            .as_deref()
            .map(project_root)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    #[instrument(skip(self), fields(project = %self.deployment.project))]
    pub fn synthesize(&self) -> Result<Synthesis> {
        let d = &self.deployment;
        let resolver = CrossRegionReferenceResolver::new();
        let engine = PermissionGrantEngine::new();
        let mut plan = DeploymentPlan::new();

        let certificate = build_certificate_graph(&d.certificate, &self.env)?;
        let grants = engine.compute_grants(&certificate)?;
        plan.push_stack(StackPlan::build(&certificate, grants)?)?;

        let references = resolver.resolve(&certificate, &frontend::IMPORTS)?;
        let web = build_frontend_graph(&d.frontend, &self.env, &references)?;
        let grants = engine.compute_grants(&web)?;
        plan.push_stack(StackPlan::build(&web, grants)?)?;

        let references = resolver.resolve(&certificate, &backend::IMPORTS)?;
        let api = build_backend_graph(&d.backend, &self.env, &references)?;
        let grants = engine.compute_grants(&api)?;

        let zone_name = import(&references, api.stack(), HOSTED_ZONE_NAME)?;
        let inputs = runtime_inputs(&d.backend, &self.env, zone_name);
        let sequence = BootstrapScriptGenerator::new(provision_profile(&d.backend))
            .generate(&api, &grants, &inputs)?;
        let user_data = render_script(&sequence)?;

        let mut backend_plan = StackPlan::build(&api, grants)?;
        backend_plan.attach_bootstrap(&sequence, user_data)?;
        plan.push_stack(backend_plan)?;

        info!(summary = %plan.summary(), "Synthesis complete");
        Ok(Synthesis {
            plan,
            secrets: SecretBundle::new(&d.backend.target, &self.env),
        })
    }
}
