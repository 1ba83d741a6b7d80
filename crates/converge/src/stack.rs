//! Stack - the declaration container
//!
//! A stack collects resource declarations and exports. Default tags are an
//! explicit stack setting, merged into taggable nodes once when the graph is
//! built; tags set on a node win over the defaults.

use crate::error::DeclarationError;
use crate::graph::DependencyGraph;
use crate::node::{ResourceHandle, ResourceKey, ResourceNode, ResourceSpec};
use crate::output::Output;
use crate::property::{Properties, Property};
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_.\-]*$").expect("valid name pattern"));

/// Property that default tags are merged into
pub const TAGS_PROPERTY: &str = "tags";

/// A named set of resource declarations
#[derive(Debug, Default)]
pub struct Stack {
    name: String,
    nodes: Vec<ResourceNode>,
    keys: HashSet<ResourceKey>,
    exports: Vec<(String, Output<Value>)>,
    default_tags: BTreeMap<String, String>,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Tags applied to every taggable resource that does not set them itself
    pub fn with_default_tags<K, V>(mut self, tags: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.default_tags = tags
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare a resource from its typed spec
    pub fn declare<S: ResourceSpec>(
        &mut self,
        name: &str,
        spec: S,
    ) -> Result<ResourceHandle, DeclarationError> {
        let key = ResourceKey::new(spec.kind(), name);
        let node = ResourceNode::from_spec(name, spec)
            .map_err(|message| DeclarationError::InvalidProperty { key, message })?;
        self.add(node)
    }

    /// Declare a pre-built node
    pub fn add(&mut self, node: ResourceNode) -> Result<ResourceHandle, DeclarationError> {
        if !NAME_PATTERN.is_match(node.name()) {
            return Err(DeclarationError::InvalidName(node.name().to_string()));
        }
        if !self.keys.insert(node.key().clone()) {
            return Err(DeclarationError::DuplicateResource(node.key().clone()));
        }
        log::debug!("Declared {}", node.key());
        let handle = node.handle();
        self.nodes.push(node);
        Ok(handle)
    }

    /// Publish a value under a name once the run resolves it
    pub fn export(&mut self, name: impl Into<String>, output: Output<Value>) {
        self.exports.push((name.into(), output));
    }

    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn exports(&self) -> &[(String, Output<Value>)] {
        &self.exports
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes with default tags applied, plus their validated graph
    pub fn prepare(&self) -> Result<(Vec<ResourceNode>, DependencyGraph), DeclarationError> {
        let mut nodes = self.nodes.clone();
        if !self.default_tags.is_empty() {
            for node in nodes.iter_mut().filter(|n| n.is_taggable()) {
                merge_tags(node, &self.default_tags)?;
            }
        }
        let graph = DependencyGraph::build(&nodes)?;
        Ok((nodes, graph))
    }
}

fn merge_tags(
    node: &mut ResourceNode,
    defaults: &BTreeMap<String, String>,
) -> Result<(), DeclarationError> {
    let mut merged: BTreeMap<String, Property> = defaults
        .iter()
        .map(|(k, v)| (k.clone(), Property::from(v.as_str())))
        .collect();

    match node.desired().get(TAGS_PROPERTY) {
        None | Some(Property::Value(Value::Null)) => {}
        Some(Property::Map(explicit)) => {
            merged.extend(explicit.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Some(Property::Value(Value::Object(explicit))) => {
            merged.extend(
                explicit
                    .iter()
                    .map(|(k, v)| (k.clone(), Property::Value(v.clone()))),
            );
        }
        Some(_) => {
            return Err(DeclarationError::InvalidProperty {
                key: node.key().clone(),
                message: "tags must be a map of strings".to_string(),
            });
        }
    }

    let tags: Properties = merged.into_iter().collect();
    node.desired_mut().set(TAGS_PROPERTY, tags);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Bucket {
        size: u32,
        tags: Option<Properties>,
    }

    impl ResourceSpec for Bucket {
        fn kind(&self) -> &'static str {
            "test:Bucket"
        }

        fn validate(&self) -> Result<(), String> {
            if self.size == 0 {
                return Err("size must be positive".to_string());
            }
            Ok(())
        }

        fn taggable(&self) -> bool {
            true
        }

        fn into_properties(self) -> Properties {
            Properties::new()
                .with("size", self.size)
                .with_opt(TAGS_PROPERTY, self.tags)
        }
    }

    #[test]
    fn test_declare_validates_spec() {
        let mut stack = Stack::new("dev");
        let err = stack
            .declare("b", Bucket { size: 0, tags: None })
            .unwrap_err();
        assert!(matches!(err, DeclarationError::InvalidProperty { .. }));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_rejects_bad_names_and_duplicates() {
        let mut stack = Stack::new("dev");
        assert!(matches!(
            stack.declare("9lives", Bucket { size: 1, tags: None }),
            Err(DeclarationError::InvalidName(_))
        ));
        stack.declare("b", Bucket { size: 1, tags: None }).unwrap();
        assert!(matches!(
            stack.declare("b", Bucket { size: 2, tags: None }),
            Err(DeclarationError::DuplicateResource(_))
        ));
    }

    #[test]
    fn test_default_tags_merge_with_explicit_winning() {
        let mut stack = Stack::new("dev").with_default_tags([("created_by", "nimbus"), ("env", "dev")]);
        stack.declare("plain", Bucket { size: 1, tags: None }).unwrap();
        stack
            .declare(
                "custom",
                Bucket {
                    size: 1,
                    tags: Some(Properties::new().with("env", "prod")),
                },
            )
            .unwrap();

        let (nodes, _) = stack.prepare().unwrap();
        let plain = nodes[0].desired().resolve().unwrap();
        assert_eq!(plain["tags"], json!({"created_by": "nimbus", "env": "dev"}));
        let custom = nodes[1].desired().resolve().unwrap();
        assert_eq!(custom["tags"], json!({"created_by": "nimbus", "env": "prod"}));

        // Declarations themselves are untouched
        assert!(stack.nodes()[0].desired().get("tags").is_none());
    }

    #[test]
    fn test_untaggable_nodes_keep_their_properties() {
        let mut stack = Stack::new("dev").with_default_tags([("created_by", "nimbus")]);
        stack
            .add(ResourceNode::new("test:Rule", "r", Properties::new().with("priority", 100u32)))
            .unwrap();
        let (nodes, _) = stack.prepare().unwrap();
        assert!(nodes[0].desired().get("tags").is_none());
    }
}
