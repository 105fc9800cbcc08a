//! Prerequisite graph built by walking `depends` edges.

use crate::{DependencyNode, Error, Result};
use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use tracing::debug;

/// Directed graph of "must run before" relations between tools.
///
/// An edge `a -> b` means `a` is a prerequisite of `b`. Node indices follow
/// discovery order, which is also the tie-break used by
/// [`execution_order`](Self::execution_order).
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    name_to_node: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool node, returning the existing index if already present.
    pub fn add_tool(&mut self, name: &str) -> NodeIndex {
        if let Some(&node) = self.name_to_node.get(name) {
            return node;
        }
        let node = self.graph.add_node(name.to_string());
        self.name_to_node.insert(name.to_string(), node);
        node
    }

    /// Record that `prerequisite` must run before `dependent`.
    pub fn add_prerequisite(&mut self, prerequisite: &str, dependent: &str) {
        let from = self.add_tool(prerequisite);
        let to = self.add_tool(dependent);
        self.graph.update_edge(from, to, ());
    }

    /// Build the graph reachable from `target` by walking `depends` edges
    /// breadth-first.
    ///
    /// `lookup` resolves a name to its node. The graph may contain cycles;
    /// call [`execution_order`](Self::execution_order) to validate it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTool`] if `target` cannot be looked up and
    /// [`Error::MissingDependency`] if any reachable dependency cannot.
    pub fn build_for_target<'a, N, F>(target: &str, lookup: F) -> Result<Self>
    where
        N: DependencyNode + 'a,
        F: Fn(&str) -> Option<&'a N>,
    {
        let mut graph = Self::new();
        let mut queue = VecDeque::from([target.to_string()]);

        if lookup(target).is_none() {
            return Err(Error::UnknownTool {
                name: target.to_string(),
            });
        }
        graph.add_tool(target);
        debug!(target, "Building dependency graph");

        while let Some(current) = queue.pop_front() {
            let Some(node) = lookup(&current) else {
                continue;
            };
            for dependency in node.dependency_names() {
                if lookup(dependency).is_none() {
                    return Err(Error::MissingDependency {
                        tool: current.clone(),
                        dependency: dependency.to_string(),
                    });
                }
                if !graph.contains(dependency) {
                    queue.push_back(dependency.to_string());
                }
                graph.add_prerequisite(dependency, &current);
            }
        }

        debug!(target, tools = graph.tool_count(), "Dependency graph built");
        Ok(graph)
    }

    /// All cycles in the graph.
    ///
    /// Each cycle is a strongly connected component with more than one node,
    /// or a single node depending on itself. Names inside a cycle and the
    /// cycles themselves are sorted so reports are stable.
    #[must_use]
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || self.graph.contains_edge(component[0], component[0])
            })
            .map(|component| {
                let mut names: Vec<String> = component
                    .into_iter()
                    .map(|idx| self.graph[idx].clone())
                    .collect();
                names.sort();
                names
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Check if the graph has cycles.
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        !self.find_cycles().is_empty()
    }

    /// Tool names in an order where every prerequisite precedes its
    /// dependents.
    ///
    /// Among tools that are ready at the same time, the one discovered first
    /// runs first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CycleDetected`] listing every cycle.
    pub fn execution_order(&self) -> Result<Vec<String>> {
        let cycles = self.find_cycles();
        if !cycles.is_empty() {
            return Err(Error::CycleDetected { cycles });
        }

        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .count()
            })
            .collect();
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(idx, _)| Reverse(idx))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse(idx)) = ready.pop() {
            let node = NodeIndex::new(idx);
            order.push(self.graph[node].clone());
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                let degree = &mut in_degree[next.index()];
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(next.index()));
                }
            }
        }

        Ok(order)
    }

    /// Get the number of tools in the graph.
    #[must_use]
    pub fn tool_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Check if a tool exists in the graph.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.name_to_node.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Node(Vec<String>);

    impl DependencyNode for Node {
        fn dependency_names(&self) -> impl Iterator<Item = &str> {
            self.0.iter().map(String::as_str)
        }
    }

    fn table(entries: &[(&str, &[&str])]) -> HashMap<String, Node> {
        entries
            .iter()
            .map(|(name, deps)| {
                (
                    (*name).to_string(),
                    Node(deps.iter().map(|d| (*d).to_string()).collect()),
                )
            })
            .collect()
    }

    fn order_for(tools: &HashMap<String, Node>, target: &str) -> Result<Vec<String>> {
        DependencyGraph::build_for_target(target, |name| tools.get(name))?.execution_order()
    }

    #[test]
    fn test_no_dependencies() {
        let tools = table(&[("A", &[])]);
        assert_eq!(order_for(&tools, "A").unwrap(), vec!["A"]);
    }

    #[test]
    fn test_single_dependency() {
        let tools = table(&[("C", &["D"]), ("D", &[])]);
        assert_eq!(order_for(&tools, "C").unwrap(), vec!["D", "C"]);
    }

    #[test]
    fn test_complex_dependencies() {
        let tools = table(&[
            ("A", &["B", "C"]),
            ("B", &["D"]),
            ("C", &[]),
            ("D", &["C"]),
            ("E", &["B", "C"]),
        ]);
        assert_eq!(order_for(&tools, "A").unwrap(), vec!["C", "D", "B", "A"]);
    }

    #[test]
    fn test_siblings_keep_declaration_order() {
        let tools = table(&[("A", &["B", "C"]), ("B", &[]), ("C", &[])]);
        assert_eq!(order_for(&tools, "A").unwrap(), vec!["B", "C", "A"]);
    }

    #[test]
    fn test_shared_dependency_appears_once() {
        let tools = table(&[
            ("A", &["B", "C"]),
            ("B", &["D"]),
            ("C", &["D"]),
            ("D", &[]),
        ]);
        let order = order_for(&tools, "A").unwrap();
        assert_eq!(order.iter().filter(|n| *n == "D").count(), 1);
        assert_eq!(order.first().map(String::as_str), Some("D"));
    }

    #[test]
    fn test_cycle_detection() {
        let tools = table(&[
            ("A", &["B"]),
            ("B", &["D"]),
            ("C", &[]),
            ("D", &["E"]),
            ("E", &["B", "C"]),
        ]);
        let err = order_for(&tools, "A").unwrap_err();
        match err {
            Error::CycleDetected { cycles } => {
                assert_eq!(cycles, vec![vec!["B", "D", "E"]]);
            }
            other => panic!("Expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_cycle() {
        let tools = table(&[("A", &["A"])]);
        let graph = DependencyGraph::build_for_target("A", |name| tools.get(name)).unwrap();
        assert!(graph.has_cycles());
        assert_eq!(graph.find_cycles(), vec![vec!["A"]]);
    }

    #[test]
    fn test_missing_dependency() {
        let tools = table(&[("A", &["ghost"])]);
        let err = DependencyGraph::build_for_target("A", |name| tools.get(name)).unwrap_err();
        assert_eq!(
            err,
            Error::MissingDependency {
                tool: "A".into(),
                dependency: "ghost".into(),
            }
        );
    }

    #[test]
    fn test_unknown_target() {
        let tools = table(&[]);
        let err = DependencyGraph::build_for_target("A", |name| tools.get(name)).unwrap_err();
        assert!(matches!(err, Error::UnknownTool { name } if name == "A"));
    }

    #[test]
    fn test_unreachable_tools_are_not_included() {
        let tools = table(&[("A", &["B"]), ("B", &[]), ("X", &["A"])]);
        let graph = DependencyGraph::build_for_target("A", |name| tools.get(name)).unwrap();
        assert_eq!(graph.tool_count(), 2);
        assert!(!graph.contains("X"));
    }
}
