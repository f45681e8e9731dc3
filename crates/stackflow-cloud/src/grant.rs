//! Least-privilege grant derivation
//!
//! Grants are a pure function of a graph's edges: each credential-access edge
//! becomes the narrowest action set for the producer's kind, each
//! network-reachability edge becomes a single consumer-initiated port rule.
//! Edges that do not say what they need are rejected instead of being granted
//! broadly.

use crate::error::{CloudError, Result};
use crate::graph::{AccessAction, DependencyEdge, EdgeKind, ResourceGraph};
use crate::resource::{Resource, ResourceId, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, instrument};

/// Who a grant is given to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Principal {
    Resource { id: ResourceId },
    /// Any caller; only produced for public-read edges and public ingress
    Anyone,
}

impl Principal {
    pub fn resource(id: &ResourceId) -> Self {
        Principal::Resource { id: id.clone() }
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Principal::Resource { id } => write!(f, "{}", id),
            Principal::Anyone => write!(f, "*"),
        }
    }
}

/// Which side may open a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Subject opens connections to the object; replies ride the same flow
    SubjectInitiated,
}

/// What a grant applies to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GrantScope {
    /// Provider resource patterns (ARN-like tokens)
    Resource { patterns: Vec<String> },
    /// A single TCP port on the object
    Port {
        protocol: String,
        port: u16,
        direction: Direction,
    },
}

/// A derived permission linking two resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRule {
    pub subject: Principal,
    pub object: ResourceId,
    pub actions: BTreeSet<String>,
    pub scope: GrantScope,
}

impl GrantRule {
    /// Whether this rule satisfies the access `edge` needs
    pub fn covers(&self, edge: &DependencyEdge) -> bool {
        if self.object != edge.producer {
            return false;
        }
        let subject_matches = match &self.subject {
            Principal::Resource { id } => *id == edge.consumer,
            Principal::Anyone => edge.public_read,
        };
        if !subject_matches {
            return false;
        }
        match (&self.scope, edge.kind) {
            (GrantScope::Port { port, .. }, EdgeKind::NetworkReachability) => {
                edge.port == Some(*port)
            }
            (GrantScope::Resource { .. }, EdgeKind::CredentialAccess) => true,
            _ => false,
        }
    }

    pub fn port(&self) -> Option<u16> {
        match &self.scope {
            GrantScope::Port { port, .. } => Some(*port),
            GrantScope::Resource { .. } => None,
        }
    }
}

const NETWORK_CONNECT: &str = "network:connect";

const SECRET_READ: &[&str] = &["secretsmanager:DescribeSecret", "secretsmanager:GetSecretValue"];
const DATABASE_CONNECT: &[&str] = &["rds-db:connect"];
const OBJECT_LIST: &[&str] = &["s3:ListBucket"];
const OBJECT_READ: &[&str] = &["s3:GetObject"];
const OBJECT_WRITE: &[&str] = &["s3:AbortMultipartUpload", "s3:DeleteObject", "s3:PutObject"];
const OBJECT_PUT: &[&str] = &["s3:AbortMultipartUpload", "s3:PutObject"];
const PUBLIC_READ: &[&str] = &["s3:GetObject"];

/// Derives grants from a graph
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissionGrantEngine;

impl PermissionGrantEngine {
    pub fn new() -> Self {
        Self
    }

    /// Emit grants in the graph's topological order
    #[instrument(skip(self, graph), fields(stack = %graph.stack()))]
    pub fn compute_grants(&self, graph: &ResourceGraph) -> Result<Vec<GrantRule>> {
        graph.validate()?;

        // Fail closed before emitting anything
        for edge in graph.edges() {
            if !edge.is_scoped() {
                return Err(CloudError::UnscopedEdge {
                    producer: edge.producer.to_string(),
                    consumer: edge.consumer.to_string(),
                    kind: edge.kind.to_string(),
                });
            }
        }

        let positions = graph.topological_positions()?;
        let mut keyed: Vec<((usize, usize, usize), GrantRule)> = Vec::new();

        for (seq, edge) in graph.edges().iter().enumerate() {
            let key = (positions[&edge.producer], positions[&edge.consumer], seq);
            let producer = graph
                .resource(&edge.producer)
                .ok_or_else(|| CloudError::InvalidConfig(edge.producer.to_string()))?;
            for rule in rules_for_edge(edge, producer)? {
                keyed.push((key, rule));
            }
        }

        for (seq, ingress) in graph.ingress().iter().enumerate() {
            let key = (positions[&ingress.resource], usize::MAX, seq);
            keyed.push((
                key,
                GrantRule {
                    subject: Principal::Anyone,
                    object: ingress.resource.clone(),
                    actions: BTreeSet::from([NETWORK_CONNECT.to_string()]),
                    scope: port_scope(ingress.port),
                },
            ));
        }

        keyed.sort_by_key(|(key, _)| *key);

        // Rules for the same (subject, object, scope) merge into the first one emitted
        let mut grants: Vec<GrantRule> = Vec::with_capacity(keyed.len());
        let mut slots: BTreeMap<(Principal, ResourceId, GrantScope), usize> = BTreeMap::new();
        for (_, rule) in keyed {
            let slot = (rule.subject.clone(), rule.object.clone(), rule.scope.clone());
            match slots.entry(slot) {
                Entry::Occupied(existing) => {
                    grants[*existing.get()].actions.extend(rule.actions);
                }
                Entry::Vacant(vacant) => {
                    debug!(subject = %rule.subject, object = %rule.object, "Emitting grant");
                    vacant.insert(grants.len());
                    grants.push(rule);
                }
            }
        }

        info!(grants = grants.len(), "Computed grants");
        Ok(grants)
    }
}

fn port_scope(port: u16) -> GrantScope {
    GrantScope::Port {
        protocol: "tcp".to_string(),
        port,
        direction: Direction::SubjectInitiated,
    }
}

fn actions(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|a| a.to_string()).collect()
}

fn rules_for_edge(edge: &DependencyEdge, producer: &Resource) -> Result<Vec<GrantRule>> {
    let subject = Principal::resource(&edge.consumer);

    match edge.kind {
        EdgeKind::DataReference => Ok(Vec::new()),
        EdgeKind::NetworkReachability => {
            let port = edge.port.ok_or_else(|| CloudError::UnscopedEdge {
                producer: edge.producer.to_string(),
                consumer: edge.consumer.to_string(),
                kind: edge.kind.to_string(),
            })?;
            Ok(vec![GrantRule {
                subject,
                object: edge.producer.clone(),
                actions: actions(&[NETWORK_CONNECT]),
                scope: port_scope(port),
            }])
        }
        EdgeKind::CredentialAccess => {
            let mut rules = Vec::new();

            if !edge.actions.is_empty() {
                let mut granted = BTreeSet::new();
                let mut patterns = BTreeSet::new();
                for action in &edge.actions {
                    let (list, scope) = access_for(*action, producer)?;
                    granted.extend(actions(list));
                    patterns.extend(scope);
                }
                rules.push(GrantRule {
                    subject,
                    object: edge.producer.clone(),
                    actions: granted,
                    scope: GrantScope::Resource {
                        patterns: patterns.into_iter().collect(),
                    },
                });
            }

            if edge.public_read {
                if producer.kind != ResourceKind::ObjectStore {
                    return Err(CloudError::InvalidConfig(format!(
                        "public-read is only valid on object stores, not {} ({})",
                        producer.id, producer.kind
                    )));
                }
                let arn = required_attribute(producer, "arn")?;
                rules.push(GrantRule {
                    subject: Principal::Anyone,
                    object: edge.producer.clone(),
                    actions: actions(PUBLIC_READ),
                    scope: GrantScope::Resource {
                        patterns: vec![format!("{}/*", arn)],
                    },
                });
            }

            Ok(rules)
        }
    }
}

/// Narrowest provider actions for `action` on `producer`, with resource patterns
fn access_for(
    action: AccessAction,
    producer: &Resource,
) -> Result<(&'static [&'static str], Vec<String>)> {
    match (action, producer.kind) {
        (AccessAction::SecretRead, ResourceKind::SecretStore | ResourceKind::Database) => {
            let arn = required_attribute(producer, "secretArn")?;
            Ok((SECRET_READ, vec![arn]))
        }
        (AccessAction::DatabaseConnect, ResourceKind::Database) => {
            let arn = required_attribute(producer, "arn")?;
            Ok((DATABASE_CONNECT, vec![arn]))
        }
        (AccessAction::ObjectList, ResourceKind::ObjectStore) => {
            let arn = required_attribute(producer, "arn")?;
            Ok((OBJECT_LIST, vec![arn]))
        }
        (
            AccessAction::ObjectRead | AccessAction::ObjectWrite | AccessAction::ObjectPut,
            ResourceKind::ObjectStore,
        ) => {
            let arn = required_attribute(producer, "arn")?;
            let list = match action {
                AccessAction::ObjectRead => OBJECT_READ,
                AccessAction::ObjectWrite => OBJECT_WRITE,
                _ => OBJECT_PUT,
            };
            Ok((list, vec![format!("{}/*", arn)]))
        }
        (action, kind) => Err(CloudError::InvalidConfig(format!(
            "{} is not a valid access on {} ({})",
            action, producer.id, kind
        ))),
    }
}

fn required_attribute(resource: &Resource, key: &str) -> Result<String> {
    resource
        .attribute(key)
        .map(|v| v.token())
        .ok_or_else(|| {
            CloudError::InvalidConfig(format!(
                "{} ({}) has no '{}' attribute to scope a grant to",
                resource.id, resource.kind, key
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::AttrValue;

    fn backend_graph() -> ResourceGraph {
        let mut g = ResourceGraph::new("BackendStack", "ap-northeast-1");
        g.add_resource(
            ResourceKind::Database,
            "Database",
            [
                ("arn", AttrValue::deferred("BackendStack", "Database", "arn")),
                (
                    "secretArn",
                    AttrValue::deferred("BackendStack", "Database", "secretArn"),
                ),
            ],
        )
        .unwrap();
        g.add_resource(
            ResourceKind::ObjectStore,
            "StorageBucket",
            [("arn", AttrValue::deferred("BackendStack", "StorageBucket", "arn"))],
        )
        .unwrap();
        g.add_resource(
            ResourceKind::ComputeInstance,
            "BackendServer",
            Vec::<(String, AttrValue)>::new(),
        )
        .unwrap();
        g.add_resource(
            ResourceKind::LoadBalancer,
            "LoadBalancer",
            Vec::<(String, AttrValue)>::new(),
        )
        .unwrap();
        g
    }

    #[test]
    fn test_network_edge_single_consumer_initiated_rule() {
        let mut g = backend_graph();
        g.add_edge("Database", "BackendServer", EdgeKind::NetworkReachability)
            .unwrap()
            .port(3306);

        let grants = PermissionGrantEngine::new().compute_grants(&g).unwrap();
        assert_eq!(grants.len(), 1);
        let rule = &grants[0];
        assert_eq!(rule.subject, Principal::resource(&ResourceId::new("BackendServer")));
        assert_eq!(rule.object, ResourceId::new("Database"));
        assert_eq!(rule.port(), Some(3306));

        // nothing in the reverse direction
        assert!(!grants.iter().any(|r| r.object == ResourceId::new("BackendServer")));
    }

    #[test]
    fn test_reverse_rule_only_with_reverse_edge() {
        let mut g = backend_graph();
        g.add_edge("BackendServer", "LoadBalancer", EdgeKind::NetworkReachability)
            .unwrap()
            .port(80);

        let grants = PermissionGrantEngine::new().compute_grants(&g).unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].object, ResourceId::new("BackendServer"));
        assert_eq!(
            grants[0].subject,
            Principal::resource(&ResourceId::new("LoadBalancer"))
        );
    }

    #[test]
    fn test_unscoped_credential_edge_fails_closed() {
        let mut g = backend_graph();
        g.add_edge("Database", "BackendServer", EdgeKind::CredentialAccess)
            .unwrap()
            .describe("secretRead");

        let err = PermissionGrantEngine::new().compute_grants(&g).unwrap_err();
        match err {
            CloudError::UnscopedEdge { producer, consumer, kind } => {
                assert_eq!(producer, "Database");
                assert_eq!(consumer, "BackendServer");
                assert_eq!(kind, "credential-access");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unscoped_network_edge_fails_closed() {
        let mut g = backend_graph();
        g.add_edge("Database", "BackendServer", EdgeKind::NetworkReachability)
            .unwrap();
        assert!(matches!(
            PermissionGrantEngine::new().compute_grants(&g).unwrap_err(),
            CloudError::UnscopedEdge { .. }
        ));
    }

    #[test]
    fn test_secret_read_is_narrow() {
        let mut g = backend_graph();
        g.add_edge("Database", "BackendServer", EdgeKind::CredentialAccess)
            .unwrap()
            .allow(AccessAction::SecretRead);

        let grants = PermissionGrantEngine::new().compute_grants(&g).unwrap();
        assert_eq!(grants.len(), 1);
        let actions: Vec<&str> = grants[0].actions.iter().map(String::as_str).collect();
        assert_eq!(
            actions,
            vec!["secretsmanager:DescribeSecret", "secretsmanager:GetSecretValue"]
        );
        assert!(actions.iter().all(|a| !a.ends_with(":*")));
        assert_eq!(
            grants[0].scope,
            GrantScope::Resource {
                patterns: vec!["${BackendStack.Database.secretArn}".to_string()]
            }
        );
    }

    #[test]
    fn test_object_actions_merge_into_one_rule() {
        let mut g = backend_graph();
        g.add_edge("StorageBucket", "BackendServer", EdgeKind::CredentialAccess)
            .unwrap()
            .allow(AccessAction::ObjectRead)
            .allow(AccessAction::ObjectWrite);
        g.add_edge("StorageBucket", "BackendServer", EdgeKind::CredentialAccess)
            .unwrap()
            .allow(AccessAction::ObjectPut);

        let grants = PermissionGrantEngine::new().compute_grants(&g).unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(
            grants[0].actions,
            actions(&[
                "s3:AbortMultipartUpload",
                "s3:DeleteObject",
                "s3:GetObject",
                "s3:PutObject",
            ])
        );
        assert_eq!(
            grants[0].scope,
            GrantScope::Resource {
                patterns: vec!["${BackendStack.StorageBucket.arn}/*".to_string()]
            }
        );
    }

    #[test]
    fn test_listing_is_scoped_to_the_bucket() {
        let mut g = backend_graph();
        g.add_edge("StorageBucket", "BackendServer", EdgeKind::CredentialAccess)
            .unwrap()
            .allow(AccessAction::ObjectList)
            .allow(AccessAction::ObjectRead);

        let grants = PermissionGrantEngine::new().compute_grants(&g).unwrap();
        assert_eq!(grants[0].actions, actions(&["s3:GetObject", "s3:ListBucket"]));
        assert_eq!(
            grants[0].scope,
            GrantScope::Resource {
                patterns: vec![
                    "${BackendStack.StorageBucket.arn}".to_string(),
                    "${BackendStack.StorageBucket.arn}/*".to_string(),
                ]
            }
        );
    }

    #[test]
    fn test_no_wildcard_action_for_named_principals() {
        let mut g = backend_graph();
        g.add_edge("StorageBucket", "BackendServer", EdgeKind::CredentialAccess)
            .unwrap()
            .allow(AccessAction::ObjectList)
            .allow(AccessAction::ObjectRead)
            .allow(AccessAction::ObjectWrite)
            .allow(AccessAction::ObjectPut)
            .public_read();
        g.add_edge("Database", "BackendServer", EdgeKind::CredentialAccess)
            .unwrap()
            .allow(AccessAction::DatabaseConnect)
            .allow(AccessAction::SecretRead);

        let grants = PermissionGrantEngine::new().compute_grants(&g).unwrap();
        for grant in grants.iter().filter(|g| g.subject != Principal::Anyone) {
            assert!(
                !grant.actions.iter().any(|a| a.contains('*')),
                "{} on {} has a wildcard action: {:?}",
                grant.subject,
                grant.object,
                grant.actions
            );
        }
    }

    #[test]
    fn test_non_adjacent_edges_merge() {
        let mut g = backend_graph();
        g.add_edge("StorageBucket", "BackendServer", EdgeKind::CredentialAccess)
            .unwrap()
            .allow(AccessAction::ObjectRead);
        g.add_edge("Database", "BackendServer", EdgeKind::CredentialAccess)
            .unwrap()
            .allow(AccessAction::SecretRead);
        g.add_edge("StorageBucket", "BackendServer", EdgeKind::CredentialAccess)
            .unwrap()
            .allow(AccessAction::ObjectPut);

        let grants = PermissionGrantEngine::new().compute_grants(&g).unwrap();
        assert_eq!(grants.len(), 2);
        let storage = grants
            .iter()
            .find(|g| g.object.as_str() == "StorageBucket")
            .unwrap();
        assert!(storage.actions.contains("s3:GetObject"));
        assert!(storage.actions.contains("s3:PutObject"));
    }

    #[test]
    fn test_public_read_is_the_only_wildcard_principal() {
        let mut g = backend_graph();
        g.add_edge("StorageBucket", "BackendServer", EdgeKind::CredentialAccess)
            .unwrap()
            .allow(AccessAction::ObjectRead)
            .public_read();

        let grants = PermissionGrantEngine::new().compute_grants(&g).unwrap();
        assert_eq!(grants.len(), 2);
        let public: Vec<_> = grants
            .iter()
            .filter(|r| r.subject == Principal::Anyone)
            .collect();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].actions, actions(&["s3:GetObject"]));
    }

    #[test]
    fn test_public_read_rejected_on_database() {
        let mut g = backend_graph();
        g.add_edge("Database", "BackendServer", EdgeKind::CredentialAccess)
            .unwrap()
            .public_read();
        assert!(matches!(
            PermissionGrantEngine::new().compute_grants(&g).unwrap_err(),
            CloudError::InvalidConfig(_)
        ));
    }

    #[test]
    fn test_emission_follows_topological_order() {
        let mut g = backend_graph();
        // inserted consumer-first on purpose
        g.add_edge("BackendServer", "LoadBalancer", EdgeKind::NetworkReachability)
            .unwrap()
            .port(80);
        g.add_edge("Database", "BackendServer", EdgeKind::NetworkReachability)
            .unwrap()
            .port(3306);
        g.allow_public_ingress("LoadBalancer", 443, "HTTPS").unwrap();

        let grants = PermissionGrantEngine::new().compute_grants(&g).unwrap();
        let objects: Vec<&str> = grants.iter().map(|r| r.object.as_str()).collect();
        assert_eq!(objects, vec!["Database", "BackendServer", "LoadBalancer"]);

        let again = PermissionGrantEngine::new().compute_grants(&g).unwrap();
        assert_eq!(grants, again);
    }

    #[test]
    fn test_covers_matches_edge() {
        let mut g = backend_graph();
        g.add_edge("Database", "BackendServer", EdgeKind::NetworkReachability)
            .unwrap()
            .port(3306);
        let grants = PermissionGrantEngine::new().compute_grants(&g).unwrap();
        assert!(grants[0].covers(&g.edges()[0]));

        let mut other = g.edges()[0].clone();
        other.port = Some(5432);
        assert!(!grants[0].covers(&other));
    }
}
