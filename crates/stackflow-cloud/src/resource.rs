//! Typed resource nodes

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of a resource declared in a stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Network,
    Database,
    ObjectStore,
    ComputeInstance,
    LoadBalancer,
    Certificate,
    HostedZone,
    Distribution,
    SecretStore,
    DnsRecord,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Network => write!(f, "network"),
            ResourceKind::Database => write!(f, "database"),
            ResourceKind::ObjectStore => write!(f, "object-store"),
            ResourceKind::ComputeInstance => write!(f, "compute-instance"),
            ResourceKind::LoadBalancer => write!(f, "load-balancer"),
            ResourceKind::Certificate => write!(f, "certificate"),
            ResourceKind::HostedZone => write!(f, "hosted-zone"),
            ResourceKind::Distribution => write!(f, "distribution"),
            ResourceKind::SecretStore => write!(f, "secret-store"),
            ResourceKind::DnsRecord => write!(f, "dns-record"),
        }
    }
}

/// Identity of a resource, unique within its stack
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ResourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&ResourceId> for ResourceId {
    fn from(value: &ResourceId) -> Self {
        value.clone()
    }
}

/// Reference to an attribute the apply engine fills in once the owning
/// resource exists
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttrRef {
    pub stack: String,
    pub resource: ResourceId,
    pub attribute: String,
}

impl AttrRef {
    pub fn new(
        stack: impl Into<String>,
        resource: impl Into<ResourceId>,
        attribute: impl Into<String>,
    ) -> Self {
        Self {
            stack: stack.into(),
            resource: resource.into(),
            attribute: attribute.into(),
        }
    }
}

impl std::fmt::Display for AttrRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${{{}.{}.{}}}", self.stack, self.resource, self.attribute)
    }
}

/// Value of an exported attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    /// Known at synthesis time
    Literal(String),
    /// Resolved by the apply engine after the resource is created
    Deferred(AttrRef),
    /// Read at deploy time from a parameter published by another region
    Parameter { region: String, name: String },
}

impl AttrValue {
    pub fn literal(value: impl Into<String>) -> Self {
        AttrValue::Literal(value.into())
    }

    pub fn deferred(
        stack: impl Into<String>,
        resource: impl Into<ResourceId>,
        attribute: impl Into<String>,
    ) -> Self {
        AttrValue::Deferred(AttrRef::new(stack, resource, attribute))
    }

    /// Token form used inside generated scripts and plan fields
    pub fn token(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for AttrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrValue::Literal(value) => f.write_str(value),
            AttrValue::Deferred(attr) => write!(f, "{}", attr),
            AttrValue::Parameter { region, name } => write!(f, "${{param:{}:{}}}", region, name),
        }
    }
}

/// Where a resource in a graph comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum ResourceOrigin {
    /// Declared by this stack
    Declared,
    /// Injected from another stack; read-only
    External {
        producer_stack: String,
        producer_region: String,
    },
}

/// A typed resource node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub region: String,
    /// Exported attributes (endpointAddress, arn, bucketName, ...)
    pub attributes: BTreeMap<String, AttrValue>,
    /// Declaration settings passed through to the apply engine
    pub properties: BTreeMap<String, serde_json::Value>,
    pub origin: ResourceOrigin,
}

impl Resource {
    /// Create a declared resource; the region is assigned when it is added to a graph
    pub fn new(kind: ResourceKind, id: impl Into<ResourceId>) -> Self {
        Self {
            id: id.into(),
            kind,
            region: String::new(),
            attributes: BTreeMap::new(),
            properties: BTreeMap::new(),
            origin: ResourceOrigin::Declared,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    pub fn get_property<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.properties
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn is_external(&self) -> bool {
        matches!(self.origin, ResourceOrigin::External { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_ref_token() {
        let value = AttrValue::deferred("BackendStack", "Database", "endpointAddress");
        assert_eq!(value.token(), "${BackendStack.Database.endpointAddress}");
    }

    #[test]
    fn test_parameter_token() {
        let value = AttrValue::Parameter {
            region: "us-east-1".to_string(),
            name: "/stackflow/UsStack/certificateArn".to_string(),
        };
        assert_eq!(
            value.to_string(),
            "${param:us-east-1:/stackflow/UsStack/certificateArn}"
        );
    }

    #[test]
    fn test_resource_builder() {
        let resource = Resource::new(ResourceKind::Database, "Database")
            .with_attribute("endpointAddress", AttrValue::literal("db.internal"))
            .with_property("port", serde_json::json!(3306));

        assert_eq!(resource.id.as_str(), "Database");
        assert_eq!(resource.get_property::<u16>("port"), Some(3306));
        assert_eq!(
            resource.attribute("endpointAddress"),
            Some(&AttrValue::literal("db.internal"))
        );
        assert!(!resource.is_external());
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&ResourceKind::ComputeInstance).unwrap();
        assert_eq!(json, "\"compute_instance\"");
        assert_eq!(ResourceKind::ObjectStore.to_string(), "object-store");
    }
}
