//! Loader
//!
//! Ties template expansion and parsing together.

use crate::env::DeploymentEnv;
use crate::error::{CoreError, Result};
use crate::model::Deployment;
use crate::parser::parse_deployment_str;
use crate::template::{TemplateProcessor, extract_variables};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Load `deploy.kdl`
///
/// 1. collect the file's own `variables` block
/// 2. add `STACKFLOW_*` environment variables
/// 3. add the validated deployment environment (highest precedence)
/// 4. render and parse
#[instrument(skip(env), fields(path = %path.display()))]
pub fn load_deployment(path: &Path, env: &DeploymentEnv) -> Result<Deployment> {
    let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut processor = prepare_template_processor(&content, env)?;
    if let Some(root) = path.parent() {
        processor.add_variable(
            "PROJECT_ROOT",
            serde_json::Value::String(root.to_string_lossy().to_string()),
        );
    }

    debug!("Expanding template");
    let rendered = processor.render(&content, Some(path))?;

    let deployment = parse_deployment_str(&rendered)?;
    info!(
        project = %deployment.project,
        certificate = %deployment.certificate.target.stack,
        frontend = %deployment.frontend.target.stack,
        backend = %deployment.backend.target.stack,
        "Deployment loaded"
    );
    Ok(deployment)
}

/// Load from an in-memory description
pub fn load_deployment_str(content: &str, env: &DeploymentEnv) -> Result<Deployment> {
    let processor = prepare_template_processor(content, env)?;
    let rendered = processor.render(content, None)?;
    parse_deployment_str(&rendered)
}

fn prepare_template_processor(content: &str, env: &DeploymentEnv) -> Result<TemplateProcessor> {
    let mut processor = TemplateProcessor::new();
    let variables = extract_variables(content)?;
    debug!(count = variables.len(), "Collected variables block");
    processor.add_variables(variables);
    processor.add_env_variables();
    processor.add_variables(env.template_variables());
    Ok(processor)
}
