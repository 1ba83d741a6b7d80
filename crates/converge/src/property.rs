//! Desired-property bags and fingerprints
//!
//! A desired property is either a concrete JSON value or an [`Output`] from
//! another resource, possibly nested inside lists and maps. Before a node is
//! sent to the provider its bag is resolved into a plain [`PropertyMap`].

use crate::node::ResourceKey;
use crate::output::{Output, OutputError};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Fully resolved properties, as sent to and returned by a provider.
pub type PropertyMap = serde_json::Map<String, Value>;

/// A single desired property
#[derive(Debug, Clone)]
pub enum Property {
    /// A concrete value
    Value(Value),
    /// A value produced by another resource
    Output(Output<Value>),
    /// A list that may contain Outputs
    List(Vec<Property>),
    /// A nested object that may contain Outputs
    Map(BTreeMap<String, Property>),
}

impl Property {
    /// Collect the resources every embedded Output comes from
    pub fn collect_dependencies(&self, into: &mut BTreeSet<ResourceKey>) {
        match self {
            Self::Value(_) => {}
            Self::Output(output) => into.extend(output.dependencies().iter().cloned()),
            Self::List(items) => {
                for item in items {
                    item.collect_dependencies(into);
                }
            }
            Self::Map(fields) => {
                for field in fields.values() {
                    field.collect_dependencies(into);
                }
            }
        }
    }

    /// Read the concrete value, failing if an embedded Output is pending or failed
    pub fn resolve(&self) -> Result<Value, OutputError> {
        match self {
            Self::Value(value) => Ok(value.clone()),
            Self::Output(output) => match output.peek() {
                Some(result) => result,
                None if output.dependencies().is_empty() => Err(OutputError::new(
                    "output has no producing resource and is not resolved yet",
                )),
                None => Err(OutputError::new(format!(
                    "output from {} is not resolved yet",
                    describe(output.dependencies())
                ))),
            },
            Self::List(items) => items
                .iter()
                .map(Property::resolve)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Self::Map(fields) => fields
                .iter()
                .map(|(k, v)| v.resolve().map(|v| (k.clone(), v)))
                .collect::<Result<PropertyMap, _>>()
                .map(Value::Object),
        }
    }

    /// Describe the first embedded Output that has no producing resource and
    /// is not already resolved to a value. Nothing in a run could settle it.
    pub fn find_unbound(&self) -> Option<String> {
        match self {
            Self::Value(_) => None,
            Self::Output(output) if output.dependencies().is_empty() => match output.peek() {
                Some(Ok(_)) => None,
                Some(Err(e)) => Some(format!("embedded output failed: {e}")),
                None => Some("embedded output has no producing resource".to_string()),
            },
            Self::Output(_) => None,
            Self::List(items) => items.iter().find_map(Property::find_unbound),
            Self::Map(fields) => fields.values().find_map(Property::find_unbound),
        }
    }
}

fn describe(keys: &BTreeSet<ResourceKey>) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<Value> for Property {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Output<Value>> for Property {
    fn from(output: Output<Value>) -> Self {
        Self::Output(output)
    }
}

impl From<&Output<Value>> for Property {
    fn from(output: &Output<Value>) -> Self {
        Self::Output(output.clone())
    }
}

impl From<&str> for Property {
    fn from(value: &str) -> Self {
        Self::Value(Value::String(value.to_string()))
    }
}

impl From<String> for Property {
    fn from(value: String) -> Self {
        Self::Value(Value::String(value))
    }
}

impl From<bool> for Property {
    fn from(value: bool) -> Self {
        Self::Value(Value::Bool(value))
    }
}

impl From<i64> for Property {
    fn from(value: i64) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<u32> for Property {
    fn from(value: u32) -> Self {
        Self::Value(Value::from(value))
    }
}

impl<T: Into<Property>> From<Vec<T>> for Property {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Property>> From<Option<T>> for Property {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Value(Value::Null), Into::into)
    }
}

impl From<Properties> for Property {
    fn from(bag: Properties) -> Self {
        Self::Map(bag.0)
    }
}

/// An ordered bag of desired properties
#[derive(Debug, Clone, Default)]
pub struct Properties(BTreeMap<String, Property>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Property>) -> Self {
        self.set(name, value);
        self
    }

    /// Builder-style insert that skips `None`
    pub fn with_opt<T: Into<Property>>(mut self, name: impl Into<String>, value: Option<T>) -> Self {
        if let Some(value) = value {
            self.set(name, value);
        }
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Property>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Property)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Deep-scan for embedded Outputs and return the resources they come from
    pub fn dependencies(&self) -> BTreeSet<ResourceKey> {
        let mut keys = BTreeSet::new();
        for property in self.0.values() {
            property.collect_dependencies(&mut keys);
        }
        keys
    }

    /// Resolve every property into a concrete map
    pub fn resolve(&self) -> Result<PropertyMap, OutputError> {
        self.0
            .iter()
            .map(|(k, v)| v.resolve().map(|v| (k.clone(), v)))
            .collect()
    }
}

impl<K: Into<String>, V: Into<Property>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// BLAKE3 digest over the resource type and its resolved desired properties.
///
/// Object keys are hashed in sorted order so the digest does not depend on
/// how the map was built.
pub fn fingerprint(kind: &str, properties: &PropertyMap) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(kind.as_bytes());
    hasher.update(&[0]);
    hash_object(&mut hasher, properties);
    hasher.finalize().to_hex().to_string()
}

fn hash_object(hasher: &mut blake3::Hasher, map: &PropertyMap) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    hasher.update(b"{");
    for key in keys {
        hash_value(hasher, &Value::String(key.clone()));
        hasher.update(b":");
        hash_value(hasher, &map[key.as_str()]);
        hasher.update(b",");
    }
    hasher.update(b"}");
}

fn hash_value(hasher: &mut blake3::Hasher, value: &Value) {
    match value {
        Value::Object(map) => hash_object(hasher, map),
        Value::Array(items) => {
            hasher.update(b"[");
            for item in items {
                hash_value(hasher, item);
                hasher.update(b",");
            }
            hasher.update(b"]");
        }
        // Scalars have a single JSON encoding
        scalar => {
            hasher.update(scalar.to_string().as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deep_scan_finds_nested_outputs() {
        let subnet = ResourceKey::new("network:Subnet", "snet");
        let pip = ResourceKey::new("network:PublicIPAddress", "pip");
        let subnet_id: Output<Value> = Output::pending_from([subnet.clone()].into());
        let pip_id: Output<Value> = Output::pending_from([pip.clone()].into());

        let ip_config = Properties::new()
            .with("subnet", Properties::new().with("id", subnet_id))
            .with("public_ip_address", Properties::new().with("id", pip_id));
        let bag = Properties::new()
            .with("name", "nic")
            .with("ip_configurations", vec![Property::from(ip_config)]);

        let deps = bag.dependencies();
        assert_eq!(deps, [subnet, pip].into());
    }

    #[test]
    fn test_resolve_reads_resolved_outputs() {
        let out = Output::new();
        let bag = Properties::new()
            .with("location", "westeurope")
            .with("vnet", vec![Property::from(&out)]);
        assert!(bag.resolve().is_err());

        out.resolve(json!("vnet-1")).unwrap();
        let resolved = bag.resolve().unwrap();
        assert_eq!(resolved["vnet"], json!(["vnet-1"]));
        assert_eq!(resolved["location"], json!("westeurope"));
    }

    #[test]
    fn test_resolve_surfaces_failed_outputs() {
        let out = Output::new();
        out.fail(OutputError::new("upstream failed")).unwrap();
        let bag = Properties::new().with("id", out);
        assert_eq!(bag.resolve().unwrap_err().message, "upstream failed");
    }

    #[test]
    fn test_option_none_becomes_null() {
        let bag = Properties::new().with("label", None::<String>);
        assert_eq!(bag.resolve().unwrap()["label"], Value::Null);
        let skipped = Properties::new().with_opt("label", None::<String>);
        assert!(skipped.is_empty());
    }

    #[test]
    fn test_fingerprint_is_order_independent() {
        let mut a = PropertyMap::new();
        a.insert("x".into(), json!(1));
        a.insert("y".into(), json!({"b": 2, "a": [1, 2]}));
        let mut b = PropertyMap::new();
        b.insert("y".into(), json!({"a": [1, 2], "b": 2}));
        b.insert("x".into(), json!(1));
        assert_eq!(fingerprint("t", &a), fingerprint("t", &b));
    }

    #[test]
    fn test_fingerprint_changes_with_values_and_kind() {
        let mut a = PropertyMap::new();
        a.insert("x".into(), json!(1));
        let mut b = a.clone();
        b.insert("x".into(), json!(2));
        assert_ne!(fingerprint("t", &a), fingerprint("t", &b));
        assert_ne!(fingerprint("t", &a), fingerprint("u", &a));
    }
}
