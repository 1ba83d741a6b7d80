//! Dependency graph builder
//!
//! Edges run producer -> consumer and are inferred from the Outputs embedded
//! in each node's desired properties. Construction fails on duplicates,
//! references to undeclared nodes, Outputs no declared node will settle and
//! cycles, so a built graph is always a
//! DAG with a deterministic topological order.

use crate::error::DeclarationError;
use crate::node::{ResourceKey, ResourceNode};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

/// Adjacency over node indices (declaration order) plus a validated order.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    keys: Vec<ResourceKey>,
    index: HashMap<ResourceKey, usize>,
    producers: Vec<Vec<usize>>,
    consumers: Vec<Vec<usize>>,
    order: Vec<usize>,
    position: Vec<usize>,
}

impl DependencyGraph {
    /// Build the graph for a set of declared nodes
    pub fn build(nodes: &[ResourceNode]) -> Result<Self, DeclarationError> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.key().clone(), i).is_some() {
                return Err(DeclarationError::DuplicateResource(node.key().clone()));
            }
        }

        let mut producers = Vec::with_capacity(nodes.len());
        for node in nodes {
            for (name, property) in node.desired().iter() {
                if let Some(problem) = property.find_unbound() {
                    return Err(DeclarationError::InvalidProperty {
                        key: node.key().clone(),
                        message: format!("{name}: {problem}"),
                    });
                }
            }
            let mut deps = BTreeSet::new();
            for producer in node.dependencies() {
                let Some(&i) = index.get(&producer) else {
                    return Err(DeclarationError::UnknownDependency {
                        consumer: node.key().clone(),
                        producer,
                    });
                };
                deps.insert(i);
            }
            producers.push(deps.into_iter().collect());
        }

        let keys = nodes.iter().map(|n| n.key().clone()).collect();
        Self::from_edges(keys, index, producers)
    }

    /// Build from explicit producer lists, e.g. for recorded resources that
    /// are no longer declared. Producers outside `keys` are ignored.
    pub fn from_dependencies(
        entries: Vec<(ResourceKey, Vec<ResourceKey>)>,
    ) -> Result<Self, DeclarationError> {
        let mut index = HashMap::with_capacity(entries.len());
        for (i, (key, _)) in entries.iter().enumerate() {
            if index.insert(key.clone(), i).is_some() {
                return Err(DeclarationError::DuplicateResource(key.clone()));
            }
        }
        let producers = entries
            .iter()
            .map(|(_, deps)| {
                deps.iter()
                    .filter_map(|d| index.get(d).copied())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect()
            })
            .collect();
        let keys = entries.into_iter().map(|(k, _)| k).collect();
        Self::from_edges(keys, index, producers)
    }

    fn from_edges(
        keys: Vec<ResourceKey>,
        index: HashMap<ResourceKey, usize>,
        producers: Vec<Vec<usize>>,
    ) -> Result<Self, DeclarationError> {
        let mut consumers = vec![Vec::new(); keys.len()];
        for (consumer, deps) in producers.iter().enumerate() {
            for &producer in deps {
                consumers[producer].push(consumer);
            }
        }

        if let Some(cycle) = find_cycle(&producers) {
            let mut chain: Vec<ResourceKey> = cycle.iter().map(|&i| keys[i].clone()).collect();
            chain.push(keys[cycle[0]].clone());
            return Err(DeclarationError::CyclicDependency { chain });
        }

        let order = topological_order(&producers, &consumers);
        let mut position = vec![0; keys.len()];
        for (pos, &node) in order.iter().enumerate() {
            position[node] = pos;
        }

        Ok(Self {
            keys,
            index,
            producers,
            consumers,
            order,
            position,
        })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key(&self, node: usize) -> &ResourceKey {
        &self.keys[node]
    }

    pub fn index_of(&self, key: &ResourceKey) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Nodes this node consumes Outputs from
    pub fn producers(&self, node: usize) -> &[usize] {
        &self.producers[node]
    }

    /// Nodes that consume this node's Outputs
    pub fn consumers(&self, node: usize) -> &[usize] {
        &self.consumers[node]
    }

    /// Topological order, ties broken by declaration order
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Index of a node within [`order`](Self::order)
    pub fn position(&self, node: usize) -> usize {
        self.position[node]
    }

    /// Ordered keys, producers first
    pub fn ordered_keys(&self) -> Vec<&ResourceKey> {
        self.order.iter().map(|&i| &self.keys[i]).collect()
    }

    /// Every node reachable through consumer edges, in topological order
    pub fn transitive_consumers(&self, node: usize) -> Vec<usize> {
        let mut seen = vec![false; self.len()];
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            for &next in &self.consumers[current] {
                if !seen[next] {
                    seen[next] = true;
                    stack.push(next);
                }
            }
        }
        let mut found: Vec<usize> = (0..self.len()).filter(|&i| seen[i]).collect();
        found.sort_by_key(|&i| self.position[i]);
        found
    }

    /// Graphviz rendering, producers pointing at consumers
    pub fn to_dot(&self) -> String {
        let mut dot = String::from("digraph resources {\n  rankdir=LR;\n");
        for &i in &self.order {
            dot.push_str(&format!("  \"{}\";\n", self.keys[i]));
        }
        for &i in &self.order {
            for &c in &self.consumers[i] {
                dot.push_str(&format!("  \"{}\" -> \"{}\";\n", self.keys[i], self.keys[c]));
            }
        }
        dot.push_str("}\n");
        dot
    }
}

/// Three-colour DFS over producer edges. Returns the nodes on the first cycle found.
fn find_cycle(producers: &[Vec<usize>]) -> Option<Vec<usize>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        White,
        Grey,
        Black,
    }

    let mut marks = vec![Mark::White; producers.len()];
    for root in 0..producers.len() {
        if marks[root] != Mark::White {
            continue;
        }
        // (node, next edge to explore)
        let mut path: Vec<(usize, usize)> = vec![(root, 0)];
        marks[root] = Mark::Grey;

        while let Some(&(node, edge)) = path.last() {
            let Some(&next) = producers[node].get(edge) else {
                marks[node] = Mark::Black;
                path.pop();
                continue;
            };
            let top = path.len() - 1;
            path[top].1 += 1;

            match marks[next] {
                Mark::White => {
                    marks[next] = Mark::Grey;
                    path.push((next, 0));
                }
                Mark::Grey => {
                    let start = path.iter().position(|&(n, _)| n == next).unwrap_or(0);
                    // Walked consumer -> producer; flip to producer -> consumer
                    let mut cycle: Vec<usize> = path[start..].iter().map(|&(n, _)| n).collect();
                    cycle.reverse();
                    return Some(cycle);
                }
                Mark::Black => {}
            }
        }
    }
    None
}

/// Kahn's algorithm with a min-heap on declaration index
fn topological_order(producers: &[Vec<usize>], consumers: &[Vec<usize>]) -> Vec<usize> {
    let mut remaining: Vec<usize> = producers.iter().map(Vec::len).collect();
    let mut ready: BinaryHeap<Reverse<usize>> = remaining
        .iter()
        .enumerate()
        .filter(|&(_, &n)| n == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(producers.len());
    while let Some(Reverse(node)) = ready.pop() {
        order.push(node);
        for &consumer in &consumers[node] {
            remaining[consumer] -= 1;
            if remaining[consumer] == 0 {
                ready.push(Reverse(consumer));
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{Output, OutputError};
    use crate::property::{Properties, Property};

    fn node(name: &str) -> ResourceNode {
        ResourceNode::new("t", name, Properties::new())
    }

    fn names(graph: &DependencyGraph) -> Vec<String> {
        graph.ordered_keys().iter().map(|k| k.name.clone()).collect()
    }

    #[test]
    fn test_edges_follow_outputs() {
        let rg = node("rg");
        let mut vnet = node("vnet");
        vnet.set("resource_group_name", rg.output("name"));
        let mut snet = node("snet");
        snet.set("virtual_network_name", vnet.output("name"));
        snet.set("resource_group_name", rg.output("name"));

        let graph = DependencyGraph::build(&[rg, vnet, snet]).unwrap();
        assert_eq!(graph.producers(2), &[0, 1]);
        assert_eq!(graph.consumers(0), &[1, 2]);
        assert_eq!(names(&graph), vec!["rg", "vnet", "snet"]);
    }

    #[test]
    fn test_output_without_producer_must_already_be_resolved() {
        let mut pending = node("pending");
        pending.set(
            "nested",
            vec![Property::from("ok"), Property::from(Output::<serde_json::Value>::new())],
        );
        let err = DependencyGraph::build(&[pending]).unwrap_err();
        assert!(matches!(
            err,
            DeclarationError::InvalidProperty { ref key, .. } if key.name == "pending"
        ));

        let failed = Output::<serde_json::Value>::new();
        failed.fail(OutputError::new("no fqdn")).unwrap();
        let mut broken = node("broken");
        broken.set("fqdn", failed);
        let err = DependencyGraph::build(&[broken]).unwrap_err();
        assert!(err.to_string().contains("no fqdn"));

        let mut constant = node("constant");
        constant.set("v", Output::resolved(serde_json::json!(1)));
        assert!(DependencyGraph::build(&[constant]).is_ok());
    }

    #[test]
    fn test_ties_break_by_declaration_order() {
        let mut c = node("c");
        let a = node("a");
        let b = node("b");
        c.set("x", a.output("id"));
        // Declared c, b, a: b and a are both roots, a must follow b
        let graph = DependencyGraph::build(&[c, b, a]).unwrap();
        assert_eq!(names(&graph), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_cycle_names_every_participant() {
        let mut a = node("a");
        let mut b = node("b");
        let mut c = node("c");
        b.set("x", a.output("id"));
        c.set("x", b.output("id"));
        a.set("x", c.output("id"));

        let err = DependencyGraph::build(&[a, b, c]).unwrap_err();
        match err {
            DeclarationError::CyclicDependency { chain } => {
                let names: Vec<&str> = chain.iter().map(|k| k.name.as_str()).collect();
                assert_eq!(names.len(), 4);
                assert_eq!(names.first(), names.last());
                for n in ["a", "b", "c"] {
                    assert!(names.contains(&n));
                }
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_cycle_chain_follows_edge_direction() {
        let mut a = node("a");
        let mut b = node("b");
        b.set("x", a.output("id"));
        a.set("x", b.output("id"));
        let err = DependencyGraph::build(&[a, b]).unwrap_err();
        assert_eq!(err.to_string(), "cyclic dependency: t::b -> t::a -> t::b");
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let mut a = node("a");
        let own = a.output("id");
        a.set("x", own);
        assert!(matches!(
            DependencyGraph::build(&[a]),
            Err(DeclarationError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_duplicate_and_unknown_are_rejected() {
        assert!(matches!(
            DependencyGraph::build(&[node("a"), node("a")]),
            Err(DeclarationError::DuplicateResource(_))
        ));

        let ghost = node("ghost");
        let mut a = node("a");
        a.set("x", ghost.output("id"));
        assert!(matches!(
            DependencyGraph::build(&[a]),
            Err(DeclarationError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn test_transitive_consumers() {
        let a = node("a");
        let mut b = node("b");
        b.set("x", a.output("id"));
        let mut c = node("c");
        c.set("x", b.output("id"));
        let d = node("d");

        let graph = DependencyGraph::build(&[a, b, c, d]).unwrap();
        assert_eq!(graph.transitive_consumers(0), vec![1, 2]);
        assert!(graph.transitive_consumers(3).is_empty());
    }

    #[test]
    fn test_from_dependencies_ignores_outside_keys() {
        let k = |n: &str| ResourceKey::new("t", n);
        let graph = DependencyGraph::from_dependencies(vec![
            (k("vm"), vec![k("nic"), k("gone")]),
            (k("nic"), vec![]),
        ])
        .unwrap();
        assert_eq!(graph.producers(0), &[1]);
        assert_eq!(names(&graph), vec!["nic", "vm"]);
    }
}
