//! Graph algorithms for toolchain resolution.
//!
//! Two transient graphs are built for every resolution request:
//!
//! - [`DependencyGraph`]: nodes are tool names, an edge `a -> b` means `a`
//!   must run before `b`. Used to detect cycles and to order prerequisites.
//! - [`ToolchainGraph`]: nodes are tool names, an edge `x -> y` means `x`
//!   produces a type that `y` consumes. Used to find glue tools between two
//!   type-incompatible neighbours.
//!
//! Neither graph knows about packages, versions or processes. Callers feed
//! them through the [`DependencyNode`] and [`TypedNode`] traits.
//!
//! # Example
//!
//! ```ignore
//! use pipewright_graph::DependencyGraph;
//!
//! let graph = DependencyGraph::build_for_target("C", |name| match name {
//!     "C" => Some(vec!["D".to_string()]),
//!     "D" => Some(vec![]),
//!     _ => None,
//! })?;
//! assert_eq!(graph.execution_order()?, vec!["D", "C"]);
//! ```

mod dependency;
mod error;
mod toolchain;

pub use dependency::DependencyGraph;
pub use error::{Error, Result};
pub use toolchain::ToolchainGraph;

/// A node that declares prerequisites by name.
pub trait DependencyNode {
    /// Names of the nodes that must run before this one.
    fn dependency_names(&self) -> impl Iterator<Item = &str>;
}

/// A node with typed inputs and outputs.
pub trait TypedNode {
    /// Unique node name.
    fn node_name(&self) -> &str;

    /// Type labels this node accepts.
    fn consumes(&self) -> &[String];

    /// Type labels this node emits.
    fn produces(&self) -> &[String];

    /// Whether some output of `self` is an accepted input of `next`.
    fn feeds(&self, next: &impl TypedNode) -> bool
    where
        Self: Sized,
    {
        self.produces()
            .iter()
            .any(|produced| next.consumes().contains(produced))
    }
}
