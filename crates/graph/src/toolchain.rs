//! Type-compatibility graph used to find glue tools.

use crate::{Error, Result, TypedNode};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::{debug, trace};

/// Directed graph with an edge `x -> y` whenever `x` produces a type `y`
/// consumes.
///
/// Nodes are inserted in lexicographic name order, and path search explores
/// neighbours in name order, so the chosen path is stable for a fixed set of
/// tools.
#[derive(Debug, Default, Clone)]
pub struct ToolchainGraph {
    graph: DiGraph<String, ()>,
    name_to_node: HashMap<String, NodeIndex>,
}

impl ToolchainGraph {
    /// Build the graph over the given tools.
    ///
    /// Later duplicates of a name replace earlier ones.
    pub fn build<'a, N, I>(tools: I) -> Self
    where
        N: TypedNode + 'a,
        I: IntoIterator<Item = &'a N>,
    {
        let by_name: BTreeMap<&str, &N> = tools
            .into_iter()
            .map(|tool| (tool.node_name(), tool))
            .collect();

        let mut graph = DiGraph::new();
        let mut name_to_node = HashMap::new();
        for name in by_name.keys() {
            let idx = graph.add_node((*name).to_string());
            name_to_node.insert((*name).to_string(), idx);
        }

        for (from_name, from) in &by_name {
            for (to_name, to) in &by_name {
                if from_name != to_name && from.feeds(*to) {
                    trace!(from = from_name, to = to_name, "Type edge");
                    graph.add_edge(name_to_node[*from_name], name_to_node[*to_name], ());
                }
            }
        }

        debug!(
            tools = graph.node_count(),
            edges = graph.edge_count(),
            "Toolchain graph built"
        );
        Self {
            graph,
            name_to_node,
        }
    }

    /// Shortest path from `from` to `to`, both endpoints included.
    ///
    /// The path always has at least one edge, so `from == to` looks for a
    /// round trip. Ties between equally short paths go to the
    /// lexicographically smaller intermediate name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTool`] if either endpoint is not in the graph
    /// and [`Error::NoPath`] if `to` is unreachable from `from`.
    pub fn shortest_path(&self, from: &str, to: &str) -> Result<Vec<String>> {
        let start = self.index_of(from)?;
        let goal = self.index_of(to)?;

        let mut predecessors: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut visited: HashSet<NodeIndex> = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            for next in self.sorted_neighbors(current) {
                if next == goal {
                    let mut path = vec![self.graph[goal].clone()];
                    let mut cursor = current;
                    while cursor != start {
                        path.push(self.graph[cursor].clone());
                        cursor = predecessors[&cursor];
                    }
                    path.push(self.graph[start].clone());
                    path.reverse();
                    return Ok(path);
                }
                if visited.insert(next) {
                    predecessors.insert(next, current);
                    queue.push_back(next);
                }
            }
        }

        Err(Error::NoPath {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    /// Tools to splice between `from` and `to`: the shortest path without
    /// its endpoints.
    ///
    /// # Errors
    ///
    /// See [`shortest_path`](Self::shortest_path).
    pub fn glue_between(&self, from: &str, to: &str) -> Result<Vec<String>> {
        let mut path = self.shortest_path(from, to)?;
        path.pop();
        path.remove(0);
        Ok(path)
    }

    /// Get the number of tools in the graph.
    #[must_use]
    pub fn tool_count(&self) -> usize {
        self.graph.node_count()
    }

    fn index_of(&self, name: &str) -> Result<NodeIndex> {
        self.name_to_node
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownTool {
                name: name.to_string(),
            })
    }

    fn sorted_neighbors(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut neighbors: Vec<NodeIndex> = self.graph.neighbors(node).collect();
        neighbors.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
        neighbors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tool {
        name: String,
        consumes: Vec<String>,
        produces: Vec<String>,
    }

    impl TypedNode for Tool {
        fn node_name(&self) -> &str {
            &self.name
        }
        fn consumes(&self) -> &[String] {
            &self.consumes
        }
        fn produces(&self) -> &[String] {
            &self.produces
        }
    }

    fn tool(name: &str, consumes: &str, produces: &str) -> Tool {
        Tool {
            name: name.into(),
            consumes: vec![consumes.into()],
            produces: vec![produces.into()],
        }
    }

    #[test]
    fn test_direct_connection_needs_no_glue() {
        let tools = [tool("A", "-", "data"), tool("B", "data", "--")];
        let graph = ToolchainGraph::build(&tools);
        assert!(graph.glue_between("A", "B").unwrap().is_empty());
    }

    #[test]
    fn test_single_glue_tool() {
        let tools = [
            tool("A", "-", "outA"),
            tool("B", "inB", "--"),
            tool("transform", "outA", "inB"),
        ];
        let graph = ToolchainGraph::build(&tools);
        assert_eq!(graph.glue_between("A", "B").unwrap(), vec!["transform"]);
    }

    #[test]
    fn test_prefers_shortest_connection() {
        let tools = [
            tool("A", "-", "outA"),
            tool("B", "inB", "--"),
            tool("C", "inC", "outC"),
            tool("transform", "outA", "inB"),
            tool("transform2", "outA", "inC"),
            tool("transform3", "outC", "inB"),
        ];
        let graph = ToolchainGraph::build(&tools);
        assert_eq!(graph.glue_between("A", "B").unwrap(), vec!["transform"]);
    }

    #[test]
    fn test_longer_connection() {
        let tools = [
            tool("A", "-", "outA"),
            tool("B", "inB", "--"),
            tool("C", "inC", "outC"),
            tool("transform2", "outA", "inC"),
            tool("transform3", "outC", "inB"),
        ];
        let graph = ToolchainGraph::build(&tools);
        assert_eq!(
            graph.glue_between("A", "B").unwrap(),
            vec!["transform2", "C", "transform3"]
        );
    }

    #[test]
    fn test_ties_break_lexicographically() {
        let tools = [
            tool("A", "-", "outA"),
            tool("B", "inB", "--"),
            tool("zeta", "outA", "inB"),
            tool("alpha", "outA", "inB"),
        ];
        let graph = ToolchainGraph::build(&tools);
        assert_eq!(graph.glue_between("A", "B").unwrap(), vec!["alpha"]);
    }

    #[test]
    fn test_unreachable_fails() {
        let tools = [
            tool("A", "-", "outA"),
            tool("B", "inB", "--"),
            tool("transform", "inA", "inB"),
        ];
        let graph = ToolchainGraph::build(&tools);
        let err = graph.glue_between("A", "B").unwrap_err();
        assert_eq!(
            err,
            Error::NoPath {
                from: "A".into(),
                to: "B".into()
            }
        );
    }

    #[test]
    fn test_unknown_endpoint() {
        let tools = [tool("A", "-", "outA")];
        let graph = ToolchainGraph::build(&tools);
        assert!(matches!(
            graph.shortest_path("A", "missing"),
            Err(Error::UnknownTool { .. })
        ));
    }

    #[test]
    fn test_multi_type_tools_connect_on_any_shared_label() {
        let tools = [
            Tool {
                name: "A".into(),
                consumes: vec!["input".into()],
                produces: vec!["x".into(), "y".into()],
            },
            tool("B", "y", "out"),
        ];
        let graph = ToolchainGraph::build(&tools);
        assert_eq!(graph.shortest_path("A", "B").unwrap(), vec!["A", "B"]);
    }
}
