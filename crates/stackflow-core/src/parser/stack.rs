//! Stack target, certificate and frontend nodes

use super::{required_string, string_list};
use crate::error::{CoreError, Result};
use crate::model::{CertificateConfig, FrontendConfig, StackTarget};
use kdl::KdlNode;

/// `stack` / `region` children shared by every stack node
///
/// Returns true when the child was consumed.
pub(super) fn parse_target_child(child: &KdlNode, target: &mut StackTarget) -> Result<bool> {
    match child.name().value() {
        "stack" => {
            let stack = required_string(child, "stack")?;
            if !stack.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                return Err(CoreError::InvalidValue {
                    name: "stack".to_string(),
                    message: format!("'{}' may only contain letters, digits and '-'", stack),
                });
            }
            target.stack = stack;
            Ok(true)
        }
        "region" => {
            let region = required_string(child, "region")?;
            if !is_region(&region) {
                return Err(CoreError::InvalidValue {
                    name: "region".to_string(),
                    message: format!("'{}' is not a region name", region),
                });
            }
            target.region = region;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// `us-east-1`, `ap-northeast-1`, `us-gov-west-1` ...
fn is_region(value: &str) -> bool {
    let parts: Vec<&str> = value.split('-').collect();
    parts.len() >= 3
        && parts[..parts.len() - 1]
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_lowercase()))
        && parts[parts.len() - 1]
            .parse::<u8>()
            .is_ok()
}

pub(super) fn parse_certificate(node: &KdlNode, config: &mut CertificateConfig) -> Result<()> {
    if let Some(children) = node.children() {
        for child in children.nodes() {
            parse_target_child(child, &mut config.target)?;
        }
    }
    Ok(())
}

pub(super) fn parse_frontend(node: &KdlNode, config: &mut FrontendConfig) -> Result<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };

    for child in children.nodes() {
        if parse_target_child(child, &mut config.target)? {
            continue;
        }
        match child.name().value() {
            "dist" => config.dist_path = required_string(child, "frontend.dist")?,
            "index" => config.index_document = required_string(child, "frontend.index")?,
            "invalidate" => {
                config.invalidation_paths = string_list(child, "frontend.invalidate")?;
            }
            _ => {}
        }
    }
    Ok(())
}
