//! Backend stack
//!
//! Network, database, storage, the application secret container, the web
//! server instance and the load balancer in front of it. Every interaction
//! that needs access is an edge, so grants and security group rules come out
//! of the grant engine rather than being written by hand.

use crate::certificate::{HOSTED_ZONE_ID, HOSTED_ZONE_NAME};
use crate::frontend::import;
use stackflow_cloud::{
    AccessAction, AttrValue, CrossRegionReferenceResolver, EdgeKind, ExportedReference, Resource,
    ResourceGraph, ResourceKind, Result,
};
use stackflow_core::{BackendConfig, DeploymentEnv, SECRET_KEYS};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::info;

/// Exports the backend reads from the certificate stack
pub const IMPORTS: [&str; 2] = [HOSTED_ZONE_ID, HOSTED_ZONE_NAME];

pub const VPC: &str = "Vpc";
pub const DATABASE: &str = "Database";
pub const STORAGE: &str = "StorageBucket";
pub const ASSETS: &str = "Assets";
pub const SECRETS: &str = "AppSecrets";
pub const SERVER: &str = "BackendServer";
pub const LOAD_BALANCER: &str = "ApplicationLoadBalancer";
pub const CERTIFICATE: &str = "Certificate";
pub const RECORD: &str = "AliasRecord";

const HTTP: u16 = 80;
const HTTPS: u16 = 443;
const SSH: u16 = 22;

/// Build and seal the backend stack
pub fn build_backend_graph(
    config: &BackendConfig,
    env: &DeploymentEnv,
    references: &BTreeMap<String, ExportedReference>,
) -> Result<ResourceGraph> {
    let stack = config.target.stack.as_str();
    let zone = import(references, stack, HOSTED_ZONE_ID)?;
    let zone_token = zone.imported_value().token();

    let mut graph = CrossRegionReferenceResolver::new()
        .inject(ResourceGraph::new(stack, &config.target.region), references)?;
    let deferred = |resource: &str, attribute: &str| AttrValue::deferred(stack, resource, attribute);

    // Network
    let network = &config.network;
    graph.add(
        Resource::new(ResourceKind::Network, VPC)
            .with_attribute("vpcId", deferred(VPC, "vpcId"))
            .with_property("cidr", json!(network.cidr))
            .with_property("maxAzs", json!(network.max_azs))
            .with_property("natGateways", json!(network.nat_gateways))
            .with_property(
                "subnets",
                json!([
                    { "name": "Public", "type": "public", "cidrMask": network.subnet_mask },
                    { "name": "Private", "type": "private_with_egress", "cidrMask": network.subnet_mask },
                ]),
            ),
    )?;

    // Database with a generated credential secret
    let db = &config.database;
    graph.add(
        Resource::new(ResourceKind::Database, DATABASE)
            .with_attribute("arn", deferred(DATABASE, "arn"))
            .with_attribute("endpointAddress", deferred(DATABASE, "endpointAddress"))
            .with_attribute("secretArn", deferred(DATABASE, "secretArn"))
            .with_property("engine", json!(db.engine))
            .with_property("engineVersion", json!(db.version))
            .with_property("instanceClass", json!(db.instance_class))
            .with_property("databaseName", json!(db.name))
            .with_property("port", json!(db.port))
            .with_property(
                "credentials",
                json!({ "username": db.username, "generatedSecret": true }),
            )
            .with_property("subnetType", json!("private_with_egress"))
            .with_property("removalPolicy", json!("destroy")),
    )?;
    graph.add_edge(VPC, DATABASE, EdgeKind::DataReference)?;

    graph.add(
        Resource::new(ResourceKind::ObjectStore, STORAGE)
            .with_attribute("arn", deferred(STORAGE, "arn"))
            .with_attribute("bucketName", deferred(STORAGE, "bucketName"))
            .with_property("publicReadAccess", json!(config.storage.public_read))
            .with_property(
                "blockPublicAccess",
                json!(!config.storage.public_read),
            )
            .with_property("objectOwnership", json!("bucket_owner_preferred"))
            .with_property("removalPolicy", json!("destroy"))
            .with_property("autoDeleteObjects", json!(true)),
    )?;

    // Files the instance downloads while booting
    graph.add(
        Resource::new(ResourceKind::ObjectStore, ASSETS)
            .with_attribute("arn", deferred(ASSETS, "arn"))
            .with_attribute("bucketName", deferred(ASSETS, "bucketName"))
            .with_property(
                "files",
                json!([
                    { "source": config.assets.web_server_config, "key": crate::profile::asset_key(&config.assets.web_server_config) },
                    { "source": config.assets.env_template, "key": crate::profile::asset_key(&config.assets.env_template) },
                ]),
            ),
    )?;

    // Only field names; values travel in the SecretBundle
    graph.add(
        Resource::new(ResourceKind::SecretStore, SECRETS)
            .with_attribute("secretArn", deferred(SECRETS, "secretArn"))
            .with_property("fields", json!(SECRET_KEYS)),
    )?;

    let instance = &config.instance;
    let mut server = Resource::new(ResourceKind::ComputeInstance, SERVER)
        .with_attribute("instanceId", deferred(SERVER, "instanceId"))
        .with_attribute("roleArn", deferred(SERVER, "roleArn"))
        .with_property("instanceType", json!(instance.instance_type))
        .with_property(
            "image",
            json!({ "family": instance.image, "architecture": instance.architecture }),
        )
        .with_property("subnetType", json!("public"))
        .with_property("associatePublicIp", json!(true))
        .with_property("role", json!({ "assumedBy": "ec2.amazonaws.com" }));
    if instance.ssh {
        server = server.with_property("keyPair", json!({ "type": "ed25519", "format": "pem" }));
    }
    graph.add(server)?;
    graph.add_edge(VPC, SERVER, EdgeKind::DataReference)?;

    graph.add(
        Resource::new(ResourceKind::Certificate, CERTIFICATE)
            .with_attribute("arn", deferred(CERTIFICATE, "arn"))
            .with_property("domainName", json!(env.backend_fqdn))
            .with_property("validation", json!("dns"))
            .with_property("zoneId", json!(zone_token)),
    )?;
    graph
        .add_edge(zone.node_id(), CERTIFICATE, EdgeKind::DataReference)?
        .describe("DNS validation records");

    graph.add(
        Resource::new(ResourceKind::LoadBalancer, LOAD_BALANCER)
            .with_attribute("dnsName", deferred(LOAD_BALANCER, "dnsName"))
            .with_attribute(
                "canonicalHostedZoneId",
                deferred(LOAD_BALANCER, "canonicalHostedZoneId"),
            )
            .with_property("internetFacing", json!(true))
            .with_property(
                "listeners",
                json!([
                    {
                        "port": HTTPS,
                        "protocol": "HTTPS",
                        "certificate": deferred(CERTIFICATE, "arn").token(),
                        "target": { "resource": SERVER, "port": HTTP, "protocol": "HTTP" },
                    },
                    {
                        "port": HTTP,
                        "protocol": "HTTP",
                        "redirect": { "port": HTTPS, "protocol": "HTTPS" },
                    },
                ]),
            ),
    )?;
    graph.add_edge(VPC, LOAD_BALANCER, EdgeKind::DataReference)?;
    graph.add_edge(CERTIFICATE, LOAD_BALANCER, EdgeKind::DataReference)?;

    graph.add(
        Resource::new(ResourceKind::DnsRecord, RECORD)
            .with_property("recordName", json!(env.backend_fqdn))
            .with_property("recordType", json!("A"))
            .with_property("zoneId", json!(zone_token))
            .with_property("aliasTarget", json!(deferred(LOAD_BALANCER, "dnsName").token())),
    )?;
    graph.add_edge(zone.node_id(), RECORD, EdgeKind::DataReference)?;
    graph.add_edge(LOAD_BALANCER, RECORD, EdgeKind::DataReference)?;

    // Traffic
    graph
        .add_edge(SERVER, LOAD_BALANCER, EdgeKind::NetworkReachability)?
        .port(HTTP)
        .describe("load balancer to web server");
    graph
        .add_edge(DATABASE, SERVER, EdgeKind::NetworkReachability)?
        .port(db.port)
        .describe("application to database");

    // Access
    graph
        .add_edge(DATABASE, SERVER, EdgeKind::CredentialAccess)?
        .allow(AccessAction::DatabaseConnect)
        .allow(AccessAction::SecretRead)
        .describe("database credentials");
    let storage = graph
        .add_edge(STORAGE, SERVER, EdgeKind::CredentialAccess)?
        .allow(AccessAction::ObjectList)
        .allow(AccessAction::ObjectRead)
        .allow(AccessAction::ObjectWrite)
        .allow(AccessAction::ObjectPut)
        .describe("uploaded files");
    if config.storage.public_read {
        storage.public_read();
    }
    graph
        .add_edge(ASSETS, SERVER, EdgeKind::CredentialAccess)?
        .allow(AccessAction::ObjectRead)
        .describe("bootstrap assets");
    graph
        .add_edge(SECRETS, SERVER, EdgeKind::CredentialAccess)?
        .allow(AccessAction::SecretRead)
        .describe("application secrets");

    // Internet
    graph.allow_public_ingress(LOAD_BALANCER, HTTP, "Allow HTTP traffic")?;
    graph.allow_public_ingress(LOAD_BALANCER, HTTPS, "Allow HTTPS traffic")?;
    if instance.ssh {
        graph.allow_public_ingress(SERVER, SSH, "Allow SSH traffic")?;
    }

    graph.seal()?;
    info!(stack, region = %graph.region(), resources = graph.len(), "Built backend stack");
    Ok(graph)
}
