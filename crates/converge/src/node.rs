//! Resource nodes - declared units of desired infrastructure state

use crate::output::{Output, OutputError};
use crate::property::{Properties, Property, PropertyMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Stable logical identity of a resource: its type plus its declared name.
///
/// Rendered as `kind::name`, which is also its serialized form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ResourceKey {
    pub kind: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.kind, self.name)
    }
}

impl FromStr for ResourceKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once("::") {
            Some((kind, name)) if !kind.is_empty() && !name.is_empty() => {
                Ok(Self::new(kind, name))
            }
            _ => Err(format!("expected 'type::name', got '{s}'")),
        }
    }
}

impl From<ResourceKey> for String {
    fn from(key: ResourceKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for ResourceKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Where a node is in a provisioning run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifecycle {
    /// Declared, waiting on producers
    Pending,
    /// All producers realized, queued for a worker
    Scheduled,
    /// Provider call in progress
    InFlight,
    /// Remote state matches the declaration
    Realized,
    /// Provider call or input resolution failed
    Failed,
    /// Never dispatched because a producer failed
    Skipped,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::InFlight => "in-flight",
            Self::Realized => "realized",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Typed configuration for one resource type.
///
/// Implementors are plain structs with named fields and documented defaults;
/// [`Stack::declare`](crate::Stack::declare) validates them before a node exists.
pub trait ResourceSpec {
    /// Resource type, e.g. `azure-native:network:Subnet`
    fn kind(&self) -> &'static str;

    /// Check field values. The message ends up in a `DeclarationError`.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// Whether stack default tags should be merged into this resource
    fn taggable(&self) -> bool {
        false
    }

    /// Convert into the desired-property bag
    fn into_properties(self) -> Properties;
}

/// A declared resource and the Output its realized properties will land in.
///
/// Cloning a node shares the realized Output.
#[derive(Debug, Clone)]
pub struct ResourceNode {
    key: ResourceKey,
    desired: Properties,
    depends_on: BTreeSet<ResourceKey>,
    taggable: bool,
    realized: Output<PropertyMap>,
}

impl ResourceNode {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, desired: Properties) -> Self {
        let key = ResourceKey::new(kind, name);
        let realized = Output::pending_from([key.clone()].into());
        Self {
            key,
            desired,
            depends_on: BTreeSet::new(),
            taggable: false,
            realized,
        }
    }

    /// Build a node from a typed spec, validating it first
    pub fn from_spec<S: ResourceSpec>(name: impl Into<String>, spec: S) -> Result<Self, String> {
        spec.validate()?;
        let taggable = spec.taggable();
        let kind = spec.kind();
        Ok(Self::new(kind, name, spec.into_properties()).with_taggable(taggable))
    }

    pub fn with_taggable(mut self, taggable: bool) -> Self {
        self.taggable = taggable;
        self
    }

    /// Add an ordering edge that is not visible through properties
    pub fn depends_on(mut self, producer: &ResourceHandle) -> Self {
        self.depends_on.insert(producer.key.clone());
        self
    }

    /// Set or replace a desired property after construction
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Property>) {
        self.desired.set(name, value);
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn kind(&self) -> &str {
        &self.key.kind
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn desired(&self) -> &Properties {
        &self.desired
    }

    pub(crate) fn desired_mut(&mut self) -> &mut Properties {
        &mut self.desired
    }

    pub fn is_taggable(&self) -> bool {
        self.taggable
    }

    /// Producers inferred from embedded Outputs plus explicit `depends_on`
    pub fn dependencies(&self) -> BTreeSet<ResourceKey> {
        let mut deps = self.desired.dependencies();
        deps.extend(self.depends_on.iter().cloned());
        deps
    }

    pub fn realized(&self) -> &Output<PropertyMap> {
        &self.realized
    }

    pub fn output(&self, property: &str) -> Output<Value> {
        self.handle().output(property)
    }

    pub fn handle(&self) -> ResourceHandle {
        ResourceHandle {
            key: self.key.clone(),
            realized: self.realized.clone(),
        }
    }
}

/// Cheap reference to a declared node, used to wire its outputs into others.
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    key: ResourceKey,
    realized: Output<PropertyMap>,
}

impl ResourceHandle {
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// All realized properties
    pub fn realized(&self) -> &Output<PropertyMap> {
        &self.realized
    }

    /// One realized property. Fails if the provider did not return it.
    pub fn output(&self, property: &str) -> Output<Value> {
        let key = self.key.clone();
        let property = property.to_string();
        self.realized.and_then(move |props| {
            props.get(&property).cloned().ok_or_else(|| {
                OutputError::from_resource(
                    key.clone(),
                    format!("{key} has no realized property '{property}'"),
                )
            })
        })
    }

    /// Remote identifier
    pub fn id(&self) -> Output<Value> {
        self.output("id")
    }

    /// Remote name
    pub fn name(&self) -> Output<Value> {
        self.output("name")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_round_trips_through_string() {
        let key = ResourceKey::new("azure-native:network:Subnet", "snet");
        assert_eq!(key.to_string(), "azure-native:network:Subnet::snet");
        assert_eq!(key.to_string().parse::<ResourceKey>().unwrap(), key);
        assert!("no-separator".parse::<ResourceKey>().is_err());
    }

    #[test]
    fn test_outputs_carry_producer_key() {
        let vnet = ResourceNode::new("network:VirtualNetwork", "vnet", Properties::new());
        let subnet = ResourceNode::new(
            "network:Subnet",
            "snet",
            Properties::new().with("virtual_network_name", vnet.output("name")),
        );
        assert_eq!(subnet.dependencies(), [vnet.key().clone()].into());
    }

    #[test]
    fn test_depends_on_adds_edge() {
        let rg = ResourceNode::new("resources:ResourceGroup", "rg", Properties::new());
        let node = ResourceNode::new("t", "x", Properties::new()).depends_on(&rg.handle());
        assert!(node.dependencies().contains(rg.key()));
    }

    #[test]
    fn test_output_reads_realized_property() {
        let node = ResourceNode::new("t", "x", Properties::new());
        let id = node.handle().id();
        let missing = node.output("nope");

        let mut realized = PropertyMap::new();
        realized.insert("id".into(), json!("/x/1"));
        node.realized().resolve(realized).unwrap();

        assert_eq!(id.peek(), Some(Ok(json!("/x/1"))));
        let err = missing.peek().unwrap().unwrap_err();
        assert_eq!(err.origin, Some(node.key().clone()));
    }
}
