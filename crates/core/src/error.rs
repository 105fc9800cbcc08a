//! Error types for toolchain resolution and execution.

use miette::Diagnostic;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for pipewright operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pipewright operations.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// No registered input tool accepted the raw input.
    #[error("No registered tool accepts the given input")]
    #[diagnostic(
        code(pipewright::resolve::no_matching_input),
        help("Tools consuming 'input' must declare activation predicates that match this input")
    )]
    NoMatchingInput,

    /// The registry's `depends` declarations contain a cycle.
    #[error("Found cycles in the tool dependencies: {}", format_cycles(.cycles))]
    #[diagnostic(code(pipewright::resolve::cyclic_dependency))]
    CyclicDependency {
        /// Every cycle, listed by tool name.
        cycles: Vec<Vec<String>>,
    },

    /// A tool referenced by name is not registered.
    #[error("Unknown tool '{name}'")]
    #[diagnostic(code(pipewright::resolve::unknown_tool))]
    UnknownTool {
        /// The unregistered name.
        name: String,
    },

    /// No chain of registered tools converts one type into another.
    #[error("No transformation path from '{from}' ({produced}) to '{to}' ({consumed})")]
    #[diagnostic(code(pipewright::resolve::no_path))]
    NoPathBetweenTypes {
        /// Tool whose output needs converting.
        from: String,
        /// Tool whose input must be reached.
        to: String,
        /// Types produced by `from`.
        produced: String,
        /// Types consumed by `to`.
        consumed: String,
    },

    /// A resolved pipeline breaks an ordering, uniqueness or typing rule.
    #[error("Invalid toolchain: {reason}")]
    #[diagnostic(code(pipewright::resolve::invalid_sequence))]
    InvalidSequence {
        /// The violated rule.
        reason: String,
    },

    /// No shared-dependency version satisfies every tool in the sequence.
    #[error("No version of '{dependency}' is compatible with tool '{tool}'")]
    #[diagnostic(
        code(pipewright::negotiate::no_compatible_version),
        help("Publish a release of '{tool}' built against a newer '{dependency}', or raise its minimum version")
    )]
    NoCompatibleVersion {
        /// The tool that rejected every candidate.
        tool: String,
        /// Name of the shared dependency being negotiated.
        dependency: String,
    },

    /// Fetching or unpacking a package failed.
    #[error("Failed to install {package}@{version}: {message}")]
    #[diagnostic(code(pipewright::cache::install_failed))]
    InstallFailed {
        /// Package name.
        package: String,
        /// Pinned version.
        version: String,
        /// What went wrong.
        message: String,
    },

    /// Another process held the install lock past the retry budget.
    #[error("Timed out after {seconds}s waiting for install lock {}", path.display())]
    #[diagnostic(
        code(pipewright::cache::lock_timeout),
        help("Another pipewright process is installing this package; retry later")
    )]
    LockTimeout {
        /// The contended lock file.
        path: PathBuf,
        /// How long acquisition was attempted.
        seconds: u64,
    },

    /// A pipeline step exited unsuccessfully.
    #[error("Tool '{tool}' failed: {stderr}")]
    #[diagnostic(code(pipewright::execute::tool_failed))]
    ToolExecutionFailed {
        /// Name of the failing tool.
        tool: String,
        /// Exit code, if the process exited normally.
        exit_code: Option<i32>,
        /// Captured standard error (or the in-process failure message).
        stderr: String,
    },

    /// A provider lookup failed.
    #[error("Provider error: {message}")]
    #[diagnostic(code(pipewright::provider::error))]
    Provider {
        /// What went wrong.
        message: String,
    },

    /// A version string could not be parsed.
    #[error("Invalid version '{value}': {message}")]
    #[diagnostic(code(pipewright::version::invalid))]
    InvalidVersion {
        /// The offending string.
        value: String,
        /// Parser message.
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(pipewright::config::invalid))]
    Configuration {
        /// The error message describing the configuration issue.
        message: String,
    },

    /// I/O error with path context.
    #[error("I/O error during {operation}: {source}")]
    #[diagnostic(code(pipewright::io::error))]
    Io {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
        /// The path where the I/O error occurred, if applicable.
        path: Option<Box<Path>>,
        /// Description of the operation that failed.
        operation: String,
    },
}

impl Error {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid-sequence error.
    pub fn invalid_sequence(reason: impl Into<String>) -> Self {
        Self::InvalidSequence {
            reason: reason.into(),
        }
    }

    /// Create a provider error.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }

    /// Create an install failure.
    pub fn install_failed(
        package: impl Into<String>,
        version: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InstallFailed {
            package: package.into(),
            version: version.into(),
            message: message.into(),
        }
    }

    /// Create a tool execution failure.
    pub fn tool_failed(
        tool: impl Into<String>,
        exit_code: Option<i32>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::ToolExecutionFailed {
            tool: tool.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }

    /// Create an I/O error with context.
    pub fn io(source: std::io::Error, path: Option<&Path>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: path.map(|p| p.to_path_buf().into_boxed_path()),
            operation: operation.into(),
        }
    }
}

impl From<pipewright_graph::Error> for Error {
    fn from(error: pipewright_graph::Error) -> Self {
        match error {
            pipewright_graph::Error::CycleDetected { cycles } => Self::CyclicDependency { cycles },
            pipewright_graph::Error::MissingDependency { dependency, .. } => {
                Self::UnknownTool { name: dependency }
            }
            pipewright_graph::Error::UnknownTool { name } => Self::UnknownTool { name },
            pipewright_graph::Error::NoPath { from, to } => Self::NoPathBetweenTypes {
                from,
                to,
                produced: String::new(),
                consumed: String::new(),
            },
        }
    }
}

fn format_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|cycle| format!("[{}]", cycle.join(" -> ")))
        .collect::<Vec<_>>()
        .join(", ")
}
