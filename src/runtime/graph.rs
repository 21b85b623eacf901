/// Dependency graph of declared resources
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;

use super::Urn;
use crate::error::{Error, Result};

/// A declared resource and the resources it depends on
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceNode {
    pub urn: Urn,
    #[serde(rename = "type")]
    pub type_token: String,
    pub name: String,
    pub dependencies: BTreeSet<Urn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Urn>,
}

/// Resources in declaration order
///
/// A node can only depend on nodes inserted before it, so the graph never
/// contains a cycle.
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    nodes: Vec<ResourceNode>,
    index: HashMap<Urn, usize>,
}

impl ResourceGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, rejecting duplicate URNs and unknown dependencies
    pub fn insert(&mut self, node: ResourceNode) -> Result<()> {
        if self.index.contains_key(&node.urn) {
            return Err(Error::DuplicateResource(node.urn.to_string()));
        }

        if let Some(missing) = node.dependencies.iter().find(|d| !self.contains(d)) {
            return Err(Error::UnknownDependency {
                resource: node.urn.to_string(),
                dependency: missing.to_string(),
            });
        }

        self.index.insert(node.urn.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    pub fn contains(&self, urn: &Urn) -> bool {
        self.index.contains_key(urn)
    }

    /// Node for a URN, if declared
    pub fn get(&self, urn: &Urn) -> Option<&ResourceNode> {
        self.index.get(urn).map(|&i| &self.nodes[i])
    }

    /// Look up a node by type token and logical name
    pub fn find(&self, type_token: &str, name: &str) -> Option<&ResourceNode> {
        self.nodes
            .iter()
            .find(|n| n.type_token == type_token && n.name == name)
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All (dependent, dependency) pairs
    pub fn edges(&self) -> Vec<(&Urn, &Urn)> {
        self.nodes
            .iter()
            .flat_map(|n| n.dependencies.iter().map(move |d| (&n.urn, d)))
            .collect()
    }

    /// Kahn's algorithm, ties broken by declaration order; `None` on a cycle
    pub fn topological_order(&self) -> Option<Vec<&Urn>> {
        // Count unresolved dependencies per node
        let mut remaining: Vec<usize> = self
            .nodes
            .iter()
            .map(|n| n.dependencies.len())
            .collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            for dep in &node.dependencies {
                let &j = self.index.get(dep)?;
                dependents[j].push(i);
            }
        }

        // Start from nodes with no dependencies, lowest index first
        let mut ready: BTreeSet<usize> = remaining
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(i) = ready.pop_first() {
            order.push(&self.nodes[i].urn);
            for &d in &dependents[i] {
                remaining[d] -= 1;
                if remaining[d] == 0 {
                    ready.insert(d);
                }
            }
        }

        (order.len() == self.nodes.len()).then_some(order)
    }

    pub fn is_acyclic(&self) -> bool {
        self.topological_order().is_some()
    }

    /// Render as a Graphviz digraph, edges pointing from dependency to dependent
    pub fn to_dot(&self) -> String {
        let mut dot = String::from("digraph resources {\n    rankdir=LR;\n");
        for (i, node) in self.nodes.iter().enumerate() {
            let _ = writeln!(
                dot,
                "    n{} [label=\"{}\\n{}\"];",
                i, node.name, node.type_token
            );
        }
        for (i, node) in self.nodes.iter().enumerate() {
            for dep in &node.dependencies {
                if let Some(j) = self.index.get(dep) {
                    let _ = writeln!(dot, "    n{} -> n{};", j, i);
                }
            }
        }
        dot.push_str("}\n");
        dot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, deps: &[&str]) -> ResourceNode {
        ResourceNode {
            urn: urn(name),
            type_token: "test:index:Thing".to_string(),
            name: name.to_string(),
            dependencies: deps.iter().map(|d| urn(d)).collect(),
            provider: None,
        }
    }

    fn urn(name: &str) -> Urn {
        Urn::new("dev", "test", "test:index:Thing", name)
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut graph = ResourceGraph::new();
        graph.insert(node("a", &[])).unwrap();
        assert!(matches!(
            graph.insert(node("a", &[])),
            Err(Error::DuplicateResource(_))
        ));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_insert_rejects_forward_references() {
        let mut graph = ResourceGraph::new();
        let err = graph.insert(node("b", &["a"])).unwrap_err();
        assert!(matches!(err, Error::UnknownDependency { .. }));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_topological_order() {
        let mut graph = ResourceGraph::new();
        graph.insert(node("rg", &[])).unwrap();
        graph.insert(node("vnet", &["rg"])).unwrap();
        graph.insert(node("other", &[])).unwrap();
        graph.insert(node("subnet", &["vnet", "rg"])).unwrap();

        let order: Vec<&str> = graph
            .topological_order()
            .unwrap()
            .into_iter()
            .map(|u| u.name())
            .collect();
        assert_eq!(order, vec!["rg", "vnet", "other", "subnet"]);
        assert!(graph.is_acyclic());
        assert_eq!(graph.edges().len(), 3);
    }

    #[test]
    fn test_dot_output() {
        let mut graph = ResourceGraph::new();
        graph.insert(node("rg", &[])).unwrap();
        graph.insert(node("vnet", &["rg"])).unwrap();

        let dot = graph.to_dot();
        assert!(dot.starts_with("digraph resources {"));
        assert!(dot.contains("n0 -> n1;"));
    }
}
