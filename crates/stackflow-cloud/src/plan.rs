//! Deployment plan artifact
//!
//! A [`DeploymentPlan`] is the only output of synthesis. Stacks appear in
//! resolution order and every stack lists its resources in topological
//! order, so an apply engine can walk it front to back or parallelise along
//! the recorded constraints.

use crate::bootstrap::{BootstrapSequence, BootstrapStep};
use crate::error::{CloudError, Result};
use crate::grant::GrantRule;
use crate::graph::{ImportBinding, PublicIngress, ResourceGraph};
use crate::reference::parameter_name;
use crate::resource::{AttrValue, ResourceId, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// A resource as the apply engine sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedResource {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub region: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub external: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<ResourceId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttrValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap: Option<BootstrapArtifact>,
}

/// Bootstrap attached to a compute resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapArtifact {
    pub env_file: String,
    pub steps: Vec<BootstrapStep>,
    pub user_data: String,
}

/// `before` must exist before `after` is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderingConstraint {
    pub before: ResourceId,
    pub after: ResourceId,
}

/// An export and the parameter it is written to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedExport {
    pub name: String,
    pub resource: ResourceId,
    pub attribute: String,
    pub parameter: String,
    pub value: AttrValue,
}

/// Plan for one stack (one account/region pair)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackPlan {
    pub stack: String,
    pub region: String,
    pub resources: Vec<PlannedResource>,
    pub constraints: Vec<OrderingConstraint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<ImportBinding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exports: Vec<PlannedExport>,
    pub grants: Vec<GrantRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingress: Vec<PublicIngress>,
}

impl StackPlan {
    /// Snapshot a resolved graph and its grants
    pub fn build(graph: &ResourceGraph, grants: Vec<GrantRule>) -> Result<Self> {
        if !graph.is_sealed() {
            return Err(CloudError::OrderingViolation(format!(
                "stack '{}' was planned before it was resolved",
                graph.stack()
            )));
        }

        let order = graph.topological_order()?;
        let positions = graph.topological_positions()?;

        let mut resources = Vec::with_capacity(order.len());
        for resource in &order {
            // BTreeSet of positions keeps dependencies in topological order
            let producers: BTreeSet<usize> = graph
                .edges()
                .iter()
                .filter(|e| e.consumer == resource.id)
                .map(|e| positions[&e.producer])
                .collect();
            let depends_on = producers
                .into_iter()
                .map(|pos| order[pos].id.clone())
                .collect();

            resources.push(PlannedResource {
                id: resource.id.clone(),
                kind: resource.kind,
                region: resource.region.clone(),
                external: resource.is_external(),
                depends_on,
                attributes: resource.attributes.clone(),
                properties: resource.properties.clone(),
                bootstrap: None,
            });
        }

        let constraints = graph
            .ordering_constraints()?
            .into_iter()
            .map(|(before, after)| OrderingConstraint { before, after })
            .collect();

        let mut exports = Vec::with_capacity(graph.exports().len());
        for decl in graph.exports() {
            let value = graph
                .resource(&decl.resource)
                .and_then(|r| r.attribute(&decl.attribute))
                .cloned()
                .ok_or_else(|| CloudError::UnresolvedExport {
                    stack: graph.stack().to_string(),
                    name: decl.name.clone(),
                })?;
            exports.push(PlannedExport {
                name: decl.name.clone(),
                resource: decl.resource.clone(),
                attribute: decl.attribute.clone(),
                parameter: parameter_name(graph.stack(), &decl.name),
                value,
            });
        }

        debug!(
            stack = %graph.stack(),
            resources = resources.len(),
            grants = grants.len(),
            "Built stack plan"
        );

        Ok(Self {
            stack: graph.stack().to_string(),
            region: graph.region().to_string(),
            resources,
            constraints,
            imports: graph.imports().to_vec(),
            exports,
            grants,
            ingress: graph.ingress().to_vec(),
        })
    }

    pub fn resource(&self, id: &ResourceId) -> Option<&PlannedResource> {
        self.resources.iter().find(|r| r.id == *id)
    }

    /// Attach a bootstrap sequence and its rendered script to the instance
    pub fn attach_bootstrap(&mut self, sequence: &BootstrapSequence, user_data: String) -> Result<()> {
        let resource = self
            .resources
            .iter_mut()
            .find(|r| r.id == sequence.instance)
            .ok_or_else(|| {
                CloudError::InvalidConfig(format!(
                    "bootstrap target '{}' is not part of stack '{}'",
                    sequence.instance, self.stack
                ))
            })?;
        if resource.kind != ResourceKind::ComputeInstance || resource.external {
            return Err(CloudError::InvalidConfig(format!(
                "bootstrap target '{}' is not a declared compute instance",
                sequence.instance
            )));
        }
        resource.bootstrap = Some(BootstrapArtifact {
            env_file: sequence.env_file.clone(),
            steps: sequence.steps.clone(),
            user_data,
        });
        Ok(())
    }

    pub fn bootstrap(&self) -> Option<&BootstrapArtifact> {
        self.resources.iter().find_map(|r| r.bootstrap.as_ref())
    }
}

/// Exports that must be published before a consumer stack deploys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossRegionBarrier {
    pub producer: String,
    pub consumer: String,
    pub exports: Vec<String>,
}

/// Plans of all stacks in resolution order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub stacks: Vec<StackPlan>,
    pub barriers: Vec<CrossRegionBarrier>,
}

impl DeploymentPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stack; every stack it imports from must already be present
    pub fn push_stack(&mut self, plan: StackPlan) -> Result<()> {
        if self.position(&plan.stack).is_some() {
            return Err(CloudError::InvalidConfig(format!(
                "stack '{}' is planned twice",
                plan.stack
            )));
        }

        let mut by_producer: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for import in &plan.imports {
            if self.position(&import.producer_stack).is_none() {
                return Err(CloudError::OrderingViolation(format!(
                    "stack '{}' imports '{}' from '{}', which has not been planned yet",
                    plan.stack, import.export, import.producer_stack
                )));
            }
            by_producer
                .entry(import.producer_stack.as_str())
                .or_default()
                .push(import.export.clone());
        }

        let barriers: Vec<CrossRegionBarrier> = by_producer
            .into_iter()
            .map(|(producer, exports)| CrossRegionBarrier {
                producer: producer.to_string(),
                consumer: plan.stack.clone(),
                exports,
            })
            .collect();

        info!(
            stack = %plan.stack,
            region = %plan.region,
            position = self.stacks.len(),
            barriers = barriers.len(),
            "Added stack to deployment plan"
        );
        self.barriers.extend(barriers);
        self.stacks.push(plan);
        Ok(())
    }

    pub fn position(&self, stack: &str) -> Option<usize> {
        self.stacks.iter().position(|s| s.stack == stack)
    }

    pub fn stack(&self, stack: &str) -> Option<&StackPlan> {
        self.stacks.iter().find(|s| s.stack == stack)
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            stacks: self.stacks.len(),
            resources: self
                .stacks
                .iter()
                .map(|s| s.resources.iter().filter(|r| !r.external).count())
                .sum(),
            grants: self.stacks.iter().map(|s| s.grants.len()).sum(),
            imports: self.stacks.iter().map(|s| s.imports.len()).sum(),
            bootstrap_steps: self
                .stacks
                .iter()
                .filter_map(|s| s.bootstrap())
                .map(|b| b.steps.len())
                .sum(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Counts shown after synthesis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub stacks: usize,
    pub resources: usize,
    pub grants: usize,
    pub imports: usize,
    pub bootstrap_steps: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} stacks, {} resources, {} grants, {} cross-region imports, {} bootstrap steps",
            self.stacks, self.resources, self.grants, self.imports, self.bootstrap_steps
        )
    }
}
