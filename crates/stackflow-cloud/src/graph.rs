//! Per-stack resource graph
//!
//! A `ResourceGraph` holds the resources of one stack (one account/region pair)
//! and the directed dependency edges between them. Every downstream component
//! walks the graph through [`ResourceGraph::topological_order`], whose
//! tie-break is insertion order, so generated artifacts are reproducible
//! byte-for-byte for identical input.

use crate::error::{CloudError, Result};
use crate::resource::{AttrValue, Resource, ResourceId, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// Kind of interaction an edge models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    /// Consumer opens connections to the producer on a port
    NetworkReachability,
    /// Consumer uses the producer through the provider's access control
    CredentialAccess,
    /// Consumer's declaration references an attribute of the producer
    DataReference,
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeKind::NetworkReachability => write!(f, "network-reachability"),
            EdgeKind::CredentialAccess => write!(f, "credential-access"),
            EdgeKind::DataReference => write!(f, "data-reference"),
        }
    }
}

/// Access a credential-access edge asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessAction {
    SecretRead,
    DatabaseConnect,
    ObjectList,
    ObjectRead,
    ObjectWrite,
    ObjectPut,
}

impl std::fmt::Display for AccessAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessAction::SecretRead => write!(f, "secretRead"),
            AccessAction::DatabaseConnect => write!(f, "databaseConnect"),
            AccessAction::ObjectList => write!(f, "objectList"),
            AccessAction::ObjectRead => write!(f, "objectRead"),
            AccessAction::ObjectWrite => write!(f, "objectWrite"),
            AccessAction::ObjectPut => write!(f, "objectPut"),
        }
    }
}

/// Directed relation producer -> consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub producer: ResourceId,
    pub consumer: ResourceId,
    pub kind: EdgeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub actions: BTreeSet<AccessAction>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub public_read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DependencyEdge {
    fn new(producer: ResourceId, consumer: ResourceId, kind: EdgeKind) -> Self {
        Self {
            producer,
            consumer,
            kind,
            port: None,
            actions: BTreeSet::new(),
            public_read: false,
            description: None,
        }
    }

    /// Port the consumer connects to
    pub fn port(&mut self, port: u16) -> &mut Self {
        self.port = Some(port);
        self
    }

    /// Access action the consumer needs on the producer
    pub fn allow(&mut self, action: AccessAction) -> &mut Self {
        self.actions.insert(action);
        self
    }

    /// Mark the producer's objects as world-readable (public static content only)
    pub fn public_read(&mut self) -> &mut Self {
        self.public_read = true;
        self
    }

    pub fn describe(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = Some(description.into());
        self
    }

    /// Network and credential edges carry traffic or access at runtime
    pub fn is_data_plane(&self) -> bool {
        matches!(
            self.kind,
            EdgeKind::NetworkReachability | EdgeKind::CredentialAccess
        )
    }

    /// Whether the edge declares what it needs
    pub fn is_scoped(&self) -> bool {
        match self.kind {
            EdgeKind::NetworkReachability => self.port.is_some(),
            EdgeKind::CredentialAccess => !self.actions.is_empty() || self.public_read,
            EdgeKind::DataReference => true,
        }
    }
}

/// Internet-facing ingress on a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicIngress {
    pub resource: ResourceId,
    pub port: u16,
    pub description: String,
}

/// A value this stack publishes for other stacks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportDecl {
    pub name: String,
    pub resource: ResourceId,
    pub attribute: String,
}

/// Record of an export injected from another stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportBinding {
    pub export: String,
    pub producer_stack: String,
    pub producer_region: String,
    pub parameter: String,
    pub node: ResourceId,
    pub attribute: String,
}

/// Resources and dependency edges of a single stack
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    stack: String,
    region: String,
    resources: Vec<Resource>,
    index: HashMap<ResourceId, usize>,
    edges: Vec<DependencyEdge>,
    ingress: Vec<PublicIngress>,
    exports: Vec<ExportDecl>,
    imports: Vec<ImportBinding>,
    sealed: bool,
}

impl ResourceGraph {
    pub fn new(stack: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            region: region.into(),
            resources: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
            ingress: Vec::new(),
            exports: Vec::new(),
            imports: Vec::new(),
            sealed: false,
        }
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    fn ensure_open(&self, what: &str) -> Result<()> {
        if self.sealed {
            return Err(CloudError::OrderingViolation(format!(
                "cannot {} after stack '{}' has been resolved",
                what, self.stack
            )));
        }
        Ok(())
    }

    /// Add a declared resource
    pub fn add(&mut self, mut resource: Resource) -> Result<ResourceId> {
        self.ensure_open("declare resources")?;
        resource.region = self.region.clone();
        self.insert(resource)
    }

    /// Add a resource from its kind, identity and exported attributes
    pub fn add_resource<I, K>(
        &mut self,
        kind: ResourceKind,
        id: impl Into<ResourceId>,
        attrs: I,
    ) -> Result<ResourceId>
    where
        I: IntoIterator<Item = (K, AttrValue)>,
        K: Into<String>,
    {
        let mut resource = Resource::new(kind, id);
        for (key, value) in attrs {
            resource.attributes.insert(key.into(), value);
        }
        self.add(resource)
    }

    /// Add a read-only external input; only the reference resolver does this
    pub(crate) fn add_external(
        &mut self,
        resource: Resource,
        bindings: Vec<ImportBinding>,
    ) -> Result<ResourceId> {
        self.ensure_open("inject external inputs")?;
        let id = self.insert(resource)?;
        self.imports.extend(bindings);
        Ok(id)
    }

    fn insert(&mut self, resource: Resource) -> Result<ResourceId> {
        if self.index.contains_key(&resource.id) {
            return Err(CloudError::DuplicateResource {
                stack: self.stack.clone(),
                id: resource.id.to_string(),
            });
        }
        debug!(stack = %self.stack, id = %resource.id, kind = %resource.kind, "Adding resource");
        let id = resource.id.clone();
        self.index.insert(id.clone(), self.resources.len());
        self.resources.push(resource);
        Ok(id)
    }

    /// Add an edge; endpoints are checked by [`ResourceGraph::validate`]
    pub fn add_edge(
        &mut self,
        producer: impl Into<ResourceId>,
        consumer: impl Into<ResourceId>,
        kind: EdgeKind,
    ) -> Result<&mut DependencyEdge> {
        self.ensure_open("add edges")?;
        let edge = DependencyEdge::new(producer.into(), consumer.into(), kind);
        debug!(stack = %self.stack, producer = %edge.producer, consumer = %edge.consumer, kind = %kind, "Adding edge");
        self.edges.push(edge);
        let last = self.edges.len() - 1;
        Ok(&mut self.edges[last])
    }

    /// Open a port on a resource to the internet
    pub fn allow_public_ingress(
        &mut self,
        resource: impl Into<ResourceId>,
        port: u16,
        description: impl Into<String>,
    ) -> Result<()> {
        self.ensure_open("add ingress")?;
        self.ingress.push(PublicIngress {
            resource: resource.into(),
            port,
            description: description.into(),
        });
        Ok(())
    }

    /// Publish an attribute of a declared resource under `name`
    pub fn export(
        &mut self,
        name: impl Into<String>,
        resource: impl Into<ResourceId>,
        attribute: impl Into<String>,
    ) -> Result<()> {
        self.ensure_open("declare exports")?;
        let name = name.into();
        let resource = resource.into();
        let attribute = attribute.into();

        let target = self
            .resource(&resource)
            .ok_or_else(|| CloudError::UnresolvedExport {
                stack: self.stack.clone(),
                name: name.clone(),
            })?;
        if target.is_external() {
            return Err(CloudError::TransitiveExport {
                name,
                resource: resource.to_string(),
            });
        }
        if target.attribute(&attribute).is_none() {
            return Err(CloudError::InvalidConfig(format!(
                "export '{}' names missing attribute '{}' on {}",
                name, attribute, resource
            )));
        }
        if self.exports.iter().any(|e| e.name == name) {
            return Err(CloudError::InvalidConfig(format!(
                "export '{}' declared twice in stack '{}'",
                name, self.stack
            )));
        }

        self.exports.push(ExportDecl {
            name,
            resource,
            attribute,
        });
        Ok(())
    }

    pub fn resource(&self, id: &ResourceId) -> Option<&Resource> {
        self.index.get(id).map(|&i| &self.resources[i])
    }

    /// Resources in insertion order
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    pub fn resources_of(&self, kind: ResourceKind) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(move |r| r.kind == kind)
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn ingress(&self) -> &[PublicIngress] {
        &self.ingress
    }

    pub fn exports(&self) -> &[ExportDecl] {
        &self.exports
    }

    pub fn imports(&self) -> &[ImportBinding] {
        &self.imports
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    fn position(&self, id: &ResourceId) -> Option<usize> {
        self.index.get(id).copied()
    }

    fn check_references(&self) -> Result<()> {
        for edge in &self.edges {
            for endpoint in [&edge.producer, &edge.consumer] {
                if !self.index.contains_key(endpoint) {
                    return Err(CloudError::DanglingReference {
                        stack: self.stack.clone(),
                        producer: edge.producer.to_string(),
                        consumer: edge.consumer.to_string(),
                        missing: endpoint.to_string(),
                    });
                }
            }
        }
        for ingress in &self.ingress {
            if !self.index.contains_key(&ingress.resource) {
                return Err(CloudError::DanglingReference {
                    stack: self.stack.clone(),
                    producer: "internet".to_string(),
                    consumer: ingress.resource.to_string(),
                    missing: ingress.resource.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Check references, acyclicity and the external-input rules
    pub fn validate(&self) -> Result<()> {
        self.check_references()?;

        for edge in &self.edges {
            let producer = self.position(&edge.producer).unwrap_or_default();
            let consumer = self.position(&edge.consumer).unwrap_or_default();

            if self.resources[consumer].is_external() {
                return Err(CloudError::ReadOnlyInput(edge.consumer.to_string()));
            }
            // A resource that reads an import must be declared after the import exists
            if self.resources[producer].is_external() && consumer < producer {
                return Err(CloudError::OrderingViolation(format!(
                    "{} in stack '{}' was declared before external input {} was injected",
                    edge.consumer, self.stack, edge.producer
                )));
            }
        }
        for ingress in &self.ingress {
            if self.resource(&ingress.resource).is_some_and(Resource::is_external) {
                return Err(CloudError::ReadOnlyInput(ingress.resource.to_string()));
            }
        }

        self.topological_order()?;
        Ok(())
    }

    /// Kahn ordering; among ready resources the earliest inserted comes first
    pub fn topological_order(&self) -> Result<Vec<&Resource>> {
        self.check_references()?;

        let n = self.resources.len();
        let mut in_degree = vec![0usize; n];
        let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); n];
        for edge in &self.edges {
            let p = self.index[&edge.producer];
            let c = self.index[&edge.consumer];
            outgoing[p].push(c);
            in_degree[c] += 1;
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(next) = ready.pop_first() {
            order.push(&self.resources[next]);
            for &c in &outgoing[next] {
                in_degree[c] -= 1;
                if in_degree[c] == 0 {
                    ready.insert(c);
                }
            }
        }

        if order.len() < n {
            let stuck: Vec<&str> = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.resources[i].id.as_str())
                .collect();
            return Err(CloudError::CycleDetected {
                stack: self.stack.clone(),
                resources: stuck.join(", "),
            });
        }

        Ok(order)
    }

    /// Resource id -> position in the topological order
    pub fn topological_positions(&self) -> Result<HashMap<ResourceId, usize>> {
        Ok(self
            .topological_order()?
            .into_iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect())
    }

    /// Distinct producer -> consumer pairs, ordered by the topological order
    pub fn ordering_constraints(&self) -> Result<Vec<(ResourceId, ResourceId)>> {
        let positions = self.topological_positions()?;
        let mut pairs: BTreeSet<(usize, usize)> = BTreeSet::new();
        for edge in &self.edges {
            pairs.insert((positions[&edge.producer], positions[&edge.consumer]));
        }
        let order = self.topological_order()?;
        Ok(pairs
            .into_iter()
            .map(|(p, c)| (order[p].id.clone(), order[c].id.clone()))
            .collect())
    }

    /// Validate and freeze the graph. Exports become readable afterwards.
    pub fn seal(&mut self) -> Result<()> {
        if self.sealed {
            return Ok(());
        }
        self.validate()?;
        self.sealed = true;
        info!(
            stack = %self.stack,
            region = %self.region,
            resources = self.resources.len(),
            edges = self.edges.len(),
            "Stack resolved"
        );
        Ok(())
    }
}
