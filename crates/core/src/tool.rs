//! Tool declarations and resolved pipeline steps.

use crate::{Error, Result};
use pipewright_graph::{DependencyNode, TypedNode};
use semver::Version;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Type label consumed by tools that accept raw user input.
pub const INPUT_TYPE: &str = "input";

/// Invocation template used when a tool does not declare one.
pub const DEFAULT_TEMPLATE: &str = "$<bin> $<args>";

/// In-process activation predicate over the raw input.
pub type Predicate = Arc<dyn Fn(&[u8]) -> bool + Send + Sync>;

/// In-process transformation of an artifact.
pub type TransformFn =
    Arc<dyn Fn(&[u8], &TransformContext<'_>) -> std::result::Result<Vec<u8>, String> + Send + Sync>;

/// Decides whether an input tool accepts a given raw input.
#[derive(Clone)]
pub enum Activation {
    /// Evaluated in process.
    InProcess(Predicate),
    /// A shell command template; a zero exit status means "accepted".
    ExternalProbe(String),
}

impl Activation {
    /// Create an in-process predicate.
    pub fn in_process(predicate: impl Fn(&[u8]) -> bool + Send + Sync + 'static) -> Self {
        Self::InProcess(Arc::new(predicate))
    }

    /// Create an external probe from a command template.
    pub fn probe(template: impl Into<String>) -> Self {
        Self::ExternalProbe(template.into())
    }
}

impl fmt::Debug for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProcess(_) => f.write_str("InProcess(..)"),
            Self::ExternalProbe(template) => f.debug_tuple("ExternalProbe").field(template).finish(),
        }
    }
}

/// How a tool is launched.
///
/// Templates may reference `$<bin>` (the resolved executable), `$<args>`
/// (the static arguments) and `$<input>` (the current artifact, passed
/// literally instead of on standard input).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Command template.
    pub template: String,
    /// Static arguments substituted for `$<args>`.
    pub args: Vec<String>,
    /// Program placed in front of the executable, e.g. `node`.
    pub interpreter: Option<String>,
}

impl Default for Invocation {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            args: Vec::new(),
            interpreter: None,
        }
    }
}

impl Invocation {
    /// Whether the template passes the artifact as an argument.
    #[must_use]
    pub fn takes_literal_input(&self) -> bool {
        self.template.contains("$<input>")
    }

    /// Same arguments and interpreter, different template.
    #[must_use]
    pub fn with_template(&self, template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            ..self.clone()
        }
    }
}

/// Context handed to in-process transforms.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformContext<'a> {
    /// Installed package directory, for packaged tools.
    pub install_dir: Option<&'a Path>,
    /// Pinned package version, for packaged tools.
    pub version: Option<&'a Version>,
}

/// A registered tool.
#[derive(Clone)]
pub struct Tool {
    /// Unique name within the registry.
    pub name: String,
    /// Package that provides the executable. `None` for in-process tools.
    pub package: Option<String>,
    /// Releases older than this are never selected.
    pub min_version: Option<Version>,
    /// Accepted type labels.
    pub consumes: Vec<String>,
    /// Emitted type labels.
    pub produces: Vec<String>,
    /// Tools that must run earlier in the same pipeline.
    pub depends: Vec<String>,
    /// Input activation checks; all must pass. A tool with none never
    /// accepts input.
    pub activation: Vec<Activation>,
    /// Launch description for packaged tools.
    pub invocation: Invocation,
    /// In-process transformation; takes precedence over `invocation`.
    pub transform: Option<TransformFn>,
}

impl Tool {
    /// Create a tool with no types, dependencies or package.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            package: None,
            min_version: None,
            consumes: Vec::new(),
            produces: Vec::new(),
            depends: Vec::new(),
            activation: Vec::new(),
            invocation: Invocation::default(),
            transform: None,
        }
    }

    /// Set the providing package.
    #[must_use]
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    /// Set the minimum acceptable release.
    #[must_use]
    pub fn with_min_version(mut self, version: Version) -> Self {
        self.min_version = Some(version);
        self
    }

    /// Set the accepted type labels.
    #[must_use]
    pub fn consuming<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.consumes = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Set the emitted type labels.
    #[must_use]
    pub fn producing<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.produces = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Set the prerequisite tools.
    #[must_use]
    pub fn depending_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends = names.into_iter().map(Into::into).collect();
        self
    }

    /// Add an activation check.
    #[must_use]
    pub fn activated_by(mut self, activation: Activation) -> Self {
        self.activation.push(activation);
        self
    }

    /// Set the command template.
    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.invocation.template = template.into();
        self
    }

    /// Set the static arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invocation.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Run the executable through an interpreter.
    #[must_use]
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.invocation.interpreter = Some(interpreter.into());
        self
    }

    /// Make the tool run in process.
    #[must_use]
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&[u8], &TransformContext<'_>) -> std::result::Result<Vec<u8>, String>
            + Send
            + Sync
            + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// Whether this tool accepts raw user input.
    #[must_use]
    pub fn is_input(&self) -> bool {
        self.consumes.iter().any(|label| label == INPUT_TYPE)
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("package", &self.package)
            .field("min_version", &self.min_version)
            .field("consumes", &self.consumes)
            .field("produces", &self.produces)
            .field("depends", &self.depends)
            .field("activation", &self.activation)
            .field("invocation", &self.invocation)
            .field("transform", &self.transform.as_ref().map(|_| ".."))
            .finish()
    }
}

impl DependencyNode for Tool {
    fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.depends.iter().map(String::as_str)
    }
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

/// A tool placed in a pipeline, before versions are pinned.
#[derive(Debug, Clone)]
pub struct PlannedStep {
    /// The registered tool.
    pub tool: Arc<Tool>,
    /// Soft dependencies taken over from the step this glue tool feeds.
    pub inherited_depends: Vec<String>,
}

impl PlannedStep {
    /// A step without inherited dependencies.
    #[must_use]
    pub fn new(tool: Arc<Tool>) -> Self {
        Self {
            tool,
            inherited_depends: Vec::new(),
        }
    }
}

/// A pipeline step with its package version pinned.
#[derive(Debug, Clone)]
pub struct ResolvedTool {
    /// The registered tool.
    pub tool: Arc<Tool>,
    /// Pinned package release; `None` for in-process tools.
    pub version: Option<Version>,
    /// Shared-dependency version of the pinned release.
    pub shared_version: Option<Version>,
    /// Soft dependencies taken over from the step this glue tool feeds.
    pub inherited_depends: Vec<String>,
}

impl ResolvedTool {
    /// Resolve an in-process step.
    #[must_use]
    pub fn unpinned(step: PlannedStep) -> Self {
        Self {
            tool: step.tool,
            version: None,
            shared_version: None,
            inherited_depends: step.inherited_depends,
        }
    }

    /// Tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.tool.name
    }

    /// `package@version` for packaged tools, the tool name otherwise.
    #[must_use]
    pub fn display_name(&self) -> String {
        match (&self.tool.package, &self.version) {
            (Some(package), Some(version)) => format!("{package}@{version}"),
            _ => self.tool.name.clone(),
        }
    }
}

impl fmt::Display for ResolvedTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// An ordered, pinned pipeline.
#[derive(Debug, Clone, Default)]
pub struct Sequence {
    steps: Vec<ResolvedTool>,
    shared_version: Option<Version>,
}

impl Sequence {
    /// Build a sequence from pinned steps.
    #[must_use]
    pub fn new(steps: Vec<ResolvedTool>, shared_version: Option<Version>) -> Self {
        Self {
            steps,
            shared_version,
        }
    }

    /// The steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[ResolvedTool] {
        &self.steps
    }

    /// Iterate over the steps.
    pub fn iter(&self) -> std::slice::Iter<'_, ResolvedTool> {
        self.steps.iter()
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether there are no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The negotiated shared-dependency version, if any packaged tool
    /// declared one.
    #[must_use]
    pub fn shared_version(&self) -> Option<&Version> {
        self.shared_version.as_ref()
    }

    /// Tool names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(ResolvedTool::name).collect()
    }

    /// Check the structural guarantees of a resolved pipeline.
    ///
    /// - no tool appears twice
    /// - every declared prerequisite appears strictly before the step
    ///   needing it; inherited dependencies are advisory and not checked
    /// - adjacent steps share at least one type label
    /// - every packaged step is pinned at or above its minimum version
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSequence`] naming the first violated rule.
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::new();
        for (idx, step) in self.steps.iter().enumerate() {
            if seen.contains(step.name()) {
                return Err(Error::invalid_sequence(format!(
                    "'{}' appears more than once",
                    step.name()
                )));
            }
            for dependency in &step.tool.depends {
                if !seen.contains(dependency.as_str()) {
                    return Err(Error::invalid_sequence(format!(
                        "'{}' runs before its prerequisite '{dependency}'",
                        step.name()
                    )));
                }
            }
            if let Some(next) = self.steps.get(idx + 1)
                && !step.tool.feeds(next.tool.as_ref())
            {
                return Err(Error::invalid_sequence(format!(
                    "'{}' does not produce a type '{}' consumes",
                    step.name(),
                    next.name()
                )));
            }
            if step.tool.package.is_some() {
                let Some(version) = &step.version else {
                    return Err(Error::invalid_sequence(format!(
                        "'{}' has no pinned version",
                        step.name()
                    )));
                };
                if !crate::version::at_least(version, step.tool.min_version.as_ref()) {
                    return Err(Error::invalid_sequence(format!(
                        "'{}' is pinned below its minimum version",
                        step.name()
                    )));
                }
            }
            seen.insert(step.name());
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Sequence {
    type Item = &'a ResolvedTool;
    type IntoIter = std::slice::Iter<'a, ResolvedTool>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, step) in self.steps.iter().enumerate() {
            if idx > 0 {
                f.write_str(" --> ")?;
            }
            write!(f, "[{step}]")?;
        }
        Ok(())
    }
}
