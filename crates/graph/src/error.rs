//! Error types for graph operations.

use thiserror::Error;

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or querying a graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// One or more dependency cycles were found.
    #[error("Found cycles in the dependency graph: {}", format_cycles(.cycles))]
    CycleDetected {
        /// Every cycle, each listed as the names taking part in it.
        cycles: Vec<Vec<String>>,
    },

    /// A node depends on a name that could not be looked up.
    #[error("Tool '{tool}' depends on unknown tool '{dependency}'")]
    MissingDependency {
        /// The node declaring the dependency.
        tool: String,
        /// The name that could not be found.
        dependency: String,
    },

    /// The requested node is not part of the graph.
    #[error("Unknown tool '{name}'")]
    UnknownTool {
        /// The missing name.
        name: String,
    },

    /// No chain of type-compatible nodes connects two nodes.
    #[error("No transformation path from '{from}' to '{to}'")]
    NoPath {
        /// Start of the requested path.
        from: String,
        /// End of the requested path.
        to: String,
    },
}

fn format_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|cycle| format!("[{}]", cycle.join(" -> ")))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_every_cycle() {
        let error = Error::CycleDetected {
            cycles: vec![
                vec!["a".into(), "b".into()],
                vec!["c".into()],
            ],
        };
        assert_eq!(
            error.to_string(),
            "Found cycles in the dependency graph: [a -> b], [c]"
        );
    }

    #[test]
    fn test_no_path_message() {
        let error = Error::NoPath {
            from: "lisgy".into(),
            to: "graphify".into(),
        };
        assert_eq!(
            error.to_string(),
            "No transformation path from 'lisgy' to 'graphify'"
        );
    }
}
