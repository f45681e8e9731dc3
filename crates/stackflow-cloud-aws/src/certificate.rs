//! Certificate stack
//!
//! The distribution only accepts certificates from `us-east-1`, so the
//! hosted zone lookup and the edge certificate live in their own stack and
//! are handed to the regional stacks as exports.

use stackflow_cloud::{AttrValue, EdgeKind, Resource, ResourceGraph, ResourceKind, Result};
use stackflow_core::{CertificateConfig, DeploymentEnv};
use serde_json::json;
use tracing::info;

pub const CERTIFICATE_ARN: &str = "certificateArn";
pub const HOSTED_ZONE_ID: &str = "hostedZoneId";
pub const HOSTED_ZONE_NAME: &str = "hostedZoneName";

pub const HOSTED_ZONE: &str = "HostedZone";
pub const CERTIFICATE: &str = "Certificate";

/// Build and seal the certificate stack
pub fn build_certificate_graph(
    config: &CertificateConfig,
    env: &DeploymentEnv,
) -> Result<ResourceGraph> {
    let stack = config.target.stack.as_str();
    let mut graph = ResourceGraph::new(stack, &config.target.region);

    graph.add(
        Resource::new(ResourceKind::HostedZone, HOSTED_ZONE)
            .with_attribute("zoneId", AttrValue::deferred(stack, HOSTED_ZONE, "zoneId"))
            .with_attribute("zoneName", AttrValue::literal(&env.domain_name))
            .with_property("lookup", json!({ "domainName": env.domain_name })),
    )?;

    graph.add(
        Resource::new(ResourceKind::Certificate, CERTIFICATE)
            .with_attribute("arn", AttrValue::deferred(stack, CERTIFICATE, "arn"))
            .with_property("domainName", json!(env.domain_name))
            .with_property("subjectAlternativeNames", json!([env.frontend_fqdn]))
            .with_property("validation", json!("dns")),
    )?;
    graph
        .add_edge(HOSTED_ZONE, CERTIFICATE, EdgeKind::DataReference)?
        .describe("DNS validation records");

    graph.export(CERTIFICATE_ARN, CERTIFICATE, "arn")?;
    graph.export(HOSTED_ZONE_ID, HOSTED_ZONE, "zoneId")?;
    graph.export(HOSTED_ZONE_NAME, HOSTED_ZONE, "zoneName")?;

    graph.seal()?;
    info!(stack, region = %graph.region(), "Built certificate stack");
    Ok(graph)
}
