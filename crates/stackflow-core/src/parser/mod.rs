//! KDL parser
//!
//! Parses a rendered `deploy.kdl` into a [`Deployment`]. Every node is
//! optional; anything left out keeps the production default. Unknown nodes
//! are skipped.

mod backend;
mod stack;

use backend::parse_backend;
use stack::{parse_certificate, parse_frontend};

use crate::error::{CoreError, Result};
use crate::model::Deployment;
use kdl::{KdlDocument, KdlNode, KdlValue};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Parse a KDL file without template expansion
pub fn parse_deployment_file<P: AsRef<Path>>(path: P) -> Result<Deployment> {
    let content = fs::read_to_string(path.as_ref())?;
    parse_deployment_str(&content)
}

/// Parse a KDL string
pub fn parse_deployment_str(content: &str) -> Result<Deployment> {
    let doc: KdlDocument = content.parse()?;
    let mut deployment = Deployment::default();

    for node in doc.nodes() {
        match node.name().value() {
            "project" => {
                deployment.project = required_string(node, "project")?;
            }
            "variables" => {
                if let Some(vars) = node.children() {
                    for var in vars.nodes() {
                        let value = var
                            .entries()
                            .first()
                            .map(|e| value_to_string(e.value()))
                            .unwrap_or_default();
                        deployment
                            .variables
                            .insert(var.name().value().to_string(), value);
                    }
                }
            }
            "certificate" => parse_certificate(node, &mut deployment.certificate)?,
            "frontend" => parse_frontend(node, &mut deployment.frontend)?,
            "backend" => parse_backend(node, &mut deployment.backend)?,
            other => {
                debug!(node = other, "Skipping unknown node");
            }
        }
    }

    validate_targets(&deployment)?;
    Ok(deployment)
}

fn validate_targets(deployment: &Deployment) -> Result<()> {
    let mut seen = BTreeSet::new();
    for target in deployment.targets() {
        if !seen.insert(target.stack.as_str()) {
            return Err(CoreError::InvalidConfig(format!(
                "stack name '{}' is used more than once",
                target.stack
            )));
        }
    }
    Ok(())
}

// Node helpers shared by the submodules

/// Positional arguments only; properties are skipped
fn arguments(node: &KdlNode) -> impl Iterator<Item = &KdlValue> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| e.value())
}

fn first_string(node: &KdlNode) -> Option<String> {
    arguments(node)
        .next()
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn required_string(node: &KdlNode, context: &str) -> Result<String> {
    first_string(node)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            CoreError::InvalidConfig(format!(
                "{} requires a non-empty string argument",
                context
            ))
        })
}

/// All positional string arguments
fn string_list(node: &KdlNode, context: &str) -> Result<Vec<String>> {
    let values: Vec<String> = arguments(node)
        .filter_map(|v| v.as_string())
        .map(|s| s.to_string())
        .collect();
    if values.is_empty() {
        return Err(CoreError::InvalidConfig(format!(
            "{} requires at least one string argument",
            context
        )));
    }
    Ok(values)
}

fn string_prop(node: &KdlNode, key: &str) -> Option<String> {
    node.get(key)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

/// Integer argument checked against the range of `T`
fn integer_arg<T: TryFrom<i128>>(node: &KdlNode, context: &str) -> Result<T> {
    let value = arguments(node)
        .next()
        .and_then(|v| v.as_integer())
        .ok_or_else(|| CoreError::InvalidValue {
            name: context.to_string(),
            message: "expected an integer".to_string(),
        })?;
    T::try_from(value).map_err(|_| CoreError::InvalidValue {
        name: context.to_string(),
        message: format!("{} is out of range", value),
    })
}

fn bool_arg(node: &KdlNode, context: &str) -> Result<bool> {
    arguments(node)
        .next()
        .and_then(|v| v.as_bool())
        .ok_or_else(|| CoreError::InvalidValue {
            name: context.to_string(),
            message: "expected #true or #false".to_string(),
        })
}

fn value_to_string(value: &KdlValue) -> String {
    if let Some(s) = value.as_string() {
        s.to_string()
    } else if let Some(i) = value.as_integer() {
        i.to_string()
    } else if let Some(b) = value.as_bool() {
        b.to_string()
    } else if let Some(f) = value.as_float() {
        f.to_string()
    } else {
        String::new()
    }
}
