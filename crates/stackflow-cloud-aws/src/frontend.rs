//! Frontend stack: static site bucket behind the distribution

use crate::certificate::{CERTIFICATE_ARN, HOSTED_ZONE_ID};
use stackflow_cloud::{
    AccessAction, AttrValue, CloudError, CrossRegionReferenceResolver, EdgeKind,
    ExportedReference, Resource, ResourceGraph, ResourceKind, Result,
};
use stackflow_core::{DeploymentEnv, FrontendConfig};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::info;

/// Exports the frontend reads from the certificate stack
pub const IMPORTS: [&str; 2] = [CERTIFICATE_ARN, HOSTED_ZONE_ID];

pub const BUCKET: &str = "FrontendBucket";
pub const DISTRIBUTION: &str = "FrontendDistribution";
pub const RECORD: &str = "ARecord";

/// Build and seal the frontend stack
pub fn build_frontend_graph(
    config: &FrontendConfig,
    env: &DeploymentEnv,
    references: &BTreeMap<String, ExportedReference>,
) -> Result<ResourceGraph> {
    let stack = config.target.stack.as_str();
    let certificate = import(references, stack, CERTIFICATE_ARN)?;
    let zone = import(references, stack, HOSTED_ZONE_ID)?;

    // External inputs go in before anything that consumes them
    let mut graph = CrossRegionReferenceResolver::new()
        .inject(ResourceGraph::new(stack, &config.target.region), references)?;

    let error_page = format!("/{}", config.index_document);
    graph.add(
        Resource::new(ResourceKind::ObjectStore, BUCKET)
            .with_attribute("arn", AttrValue::deferred(stack, BUCKET, "arn"))
            .with_attribute("bucketName", AttrValue::deferred(stack, BUCKET, "bucketName"))
            .with_attribute(
                "regionalDomainName",
                AttrValue::deferred(stack, BUCKET, "regionalDomainName"),
            )
            .with_property("websiteIndexDocument", json!(config.index_document))
            .with_property("websiteErrorDocument", json!(config.index_document))
            .with_property("removalPolicy", json!("destroy"))
            .with_property("autoDeleteObjects", json!(true))
            .with_property(
                "content",
                json!({
                    "source": config.dist_path,
                    "invalidate": config.invalidation_paths,
                }),
            ),
    )?;

    graph.add(
        Resource::new(ResourceKind::Distribution, DISTRIBUTION)
            .with_attribute("domainName", AttrValue::deferred(stack, DISTRIBUTION, "domainName"))
            .with_attribute(
                "distributionId",
                AttrValue::deferred(stack, DISTRIBUTION, "distributionId"),
            )
            .with_property("aliases", json!([env.frontend_fqdn]))
            .with_property("certificate", json!(certificate.imported_value().token()))
            .with_property(
                "origin",
                json!({
                    "bucket": AttrValue::deferred(stack, BUCKET, "regionalDomainName").token(),
                    "originAccessIdentity": true,
                }),
            )
            .with_property(
                "errorResponses",
                json!([
                    { "errorCode": 403, "responseCode": 200, "responsePagePath": error_page },
                    { "errorCode": 404, "responseCode": 200, "responsePagePath": error_page },
                ]),
            ),
    )?;
    graph
        .add_edge(certificate.node_id(), DISTRIBUTION, EdgeKind::DataReference)?
        .describe("viewer certificate");
    graph
        .add_edge(BUCKET, DISTRIBUTION, EdgeKind::CredentialAccess)?
        .allow(AccessAction::ObjectRead)
        .describe("origin access identity");

    graph.add(
        Resource::new(ResourceKind::DnsRecord, RECORD)
            .with_property("recordName", json!(env.frontend_fqdn))
            .with_property("recordType", json!("A"))
            .with_property("zoneId", json!(zone.imported_value().token()))
            .with_property(
                "aliasTarget",
                json!(AttrValue::deferred(stack, DISTRIBUTION, "domainName").token()),
            ),
    )?;
    graph.add_edge(zone.node_id(), RECORD, EdgeKind::DataReference)?;
    graph.add_edge(DISTRIBUTION, RECORD, EdgeKind::DataReference)?;

    graph.seal()?;
    info!(stack, region = %graph.region(), resources = graph.len(), "Built frontend stack");
    Ok(graph)
}

/// An export `consumer` cannot be built without
pub(crate) fn import<'a>(
    references: &'a BTreeMap<String, ExportedReference>,
    consumer: &str,
    name: &str,
) -> Result<&'a ExportedReference> {
    references.get(name).ok_or_else(|| {
        CloudError::InvalidConfig(format!(
            "stack '{}' needs export '{}', which was not resolved",
            consumer, name
        ))
    })
}
