//! Cross-region reference passing
//!
//! Regions never share a resource graph. A producer stack publishes named
//! exports; each export is written to a parameter in the producer's region
//! (`/stackflow/<stack>/<export>`) and the consumer reads that parameter at
//! deploy time. The consumer graph sees the export as a read-only external
//! input node.

use crate::error::{CloudError, Result};
use crate::graph::{ImportBinding, ResourceGraph};
use crate::resource::{AttrValue, Resource, ResourceId, ResourceKind, ResourceOrigin};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Prefix of the parameters carrying exported values
pub const PARAMETER_PREFIX: &str = "/stackflow";

/// Parameter an export of `stack` is published under
pub fn parameter_name(stack: &str, export: &str) -> String {
    format!("{}/{}/{}", PARAMETER_PREFIX, stack, export)
}

/// A named value published by a producer stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedReference {
    pub name: String,
    pub producer_stack: String,
    pub producer_region: String,
    pub resource: ResourceId,
    pub kind: ResourceKind,
    pub attribute: String,
    /// Value inside the producer stack
    pub value: AttrValue,
}

impl ExportedReference {
    /// Name of the parameter the producer writes the value to
    pub fn parameter_name(&self) -> String {
        parameter_name(&self.producer_stack, &self.name)
    }

    /// Value as seen from a consuming stack
    pub fn imported_value(&self) -> AttrValue {
        AttrValue::Parameter {
            region: self.producer_region.clone(),
            name: self.parameter_name(),
        }
    }

    /// Identity of the external-input node created in the consumer graph
    pub fn node_id(&self) -> ResourceId {
        ResourceId::new(format!("{}.{}", self.producer_stack, self.resource))
    }
}

/// Moves exports from a producer graph into consumer graphs
#[derive(Debug, Default, Clone, Copy)]
pub struct CrossRegionReferenceResolver;

impl CrossRegionReferenceResolver {
    pub fn new() -> Self {
        Self
    }

    /// Look up `names` on a resolved producer graph
    #[instrument(skip(self, producer, names), fields(producer = %producer.stack()))]
    pub fn resolve<S: AsRef<str>>(
        &self,
        producer: &ResourceGraph,
        names: &[S],
    ) -> Result<BTreeMap<String, ExportedReference>> {
        if !producer.is_sealed() {
            return Err(CloudError::OrderingViolation(format!(
                "exports of stack '{}' were read before the stack was resolved",
                producer.stack()
            )));
        }

        let mut references = BTreeMap::new();
        for name in names {
            let name = name.as_ref();
            let decl = producer
                .exports()
                .iter()
                .find(|e| e.name == name)
                .ok_or_else(|| CloudError::UnresolvedExport {
                    stack: producer.stack().to_string(),
                    name: name.to_string(),
                })?;
            // export() only accepts existing attributes, and the graph is sealed
            let resource = producer
                .resource(&decl.resource)
                .ok_or_else(|| CloudError::UnresolvedExport {
                    stack: producer.stack().to_string(),
                    name: name.to_string(),
                })?;
            let value = resource
                .attribute(&decl.attribute)
                .cloned()
                .ok_or_else(|| CloudError::UnresolvedExport {
                    stack: producer.stack().to_string(),
                    name: name.to_string(),
                })?;

            debug!(export = %name, resource = %resource.id, "Resolved export");
            references.insert(
                name.to_string(),
                ExportedReference {
                    name: name.to_string(),
                    producer_stack: producer.stack().to_string(),
                    producer_region: producer.region().to_string(),
                    resource: resource.id.clone(),
                    kind: resource.kind,
                    attribute: decl.attribute.clone(),
                    value,
                },
            );
        }

        info!(count = references.len(), "Resolved cross-region exports");
        Ok(references)
    }

    /// Add one external-input node per producer resource to `consumer`
    #[instrument(skip(self, consumer, references), fields(consumer = %consumer.stack()))]
    pub fn inject(
        &self,
        mut consumer: ResourceGraph,
        references: &BTreeMap<String, ExportedReference>,
    ) -> Result<ResourceGraph> {
        // Group by producer resource; the BTreeMap keeps this deterministic
        let mut nodes: BTreeMap<ResourceId, Vec<&ExportedReference>> = BTreeMap::new();
        for reference in references.values() {
            if reference.producer_stack == consumer.stack() {
                return Err(CloudError::OrderingViolation(format!(
                    "stack '{}' cannot import its own export '{}'",
                    consumer.stack(),
                    reference.name
                )));
            }
            nodes.entry(reference.node_id()).or_default().push(reference);
        }

        for (node_id, refs) in nodes {
            let first = refs[0];
            let mut resource = Resource::new(first.kind, node_id.clone());
            resource.region = first.producer_region.clone();
            resource.origin = ResourceOrigin::External {
                producer_stack: first.producer_stack.clone(),
                producer_region: first.producer_region.clone(),
            };

            let mut bindings = Vec::with_capacity(refs.len());
            for reference in refs {
                resource
                    .attributes
                    .insert(reference.attribute.clone(), reference.imported_value());
                bindings.push(ImportBinding {
                    export: reference.name.clone(),
                    producer_stack: reference.producer_stack.clone(),
                    producer_region: reference.producer_region.clone(),
                    parameter: reference.parameter_name(),
                    node: node_id.clone(),
                    attribute: reference.attribute.clone(),
                });
            }

            debug!(node = %node_id, imports = bindings.len(), "Injecting external input");
            consumer.add_external(resource, bindings)?;
        }

        Ok(consumer)
    }
}
