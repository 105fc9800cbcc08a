//! Toolchain resolution.
//!
//! Resolution runs in four stages:
//!
//! 1. pick the input tool whose activation accepts the raw input
//! 2. expand the prerequisites of the requested output
//! 3. splice glue tools between type-incompatible neighbours
//! 4. negotiate the shared-dependency version and pin every package
//!
//! The output type and any extra prerequisites are modelled as a synthetic
//! sink tool appended to the pipeline; it is dropped before pinning.

use crate::cache::PackageCache;
use crate::config::Config;
use crate::executor::ExecutionObserver;
use crate::negotiate::VersionNegotiator;
use crate::process;
use crate::provider::PackageProvider;
use crate::registry::Registry;
use crate::tool::{Activation, PlannedStep, Sequence, Tool};
use crate::{Error, Result};
use futures::future::join_all;
use pipewright_graph::{DependencyGraph, ToolchainGraph, TypedNode};
use semver::Version;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the synthetic step standing for a typed input.
pub const SOURCE_STEP: &str = "<source>";

/// Name of the synthetic step standing for the requested output.
pub const SINK_STEP: &str = "<sink>";

/// What the pipeline must produce.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    /// Requested output type label.
    pub output_type: String,
    /// Tools that must run somewhere in the pipeline.
    pub depends: Vec<String>,
}

impl Target {
    /// Target an output type.
    pub fn new(output_type: impl Into<String>) -> Self {
        Self {
            output_type: output_type.into(),
            depends: Vec::new(),
        }
    }

    /// Require additional tools.
    #[must_use]
    pub fn with_depends<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Resolves raw inputs and output types into pinned tool sequences.
pub struct Resolver {
    registry: Arc<Registry>,
    provider: Arc<dyn PackageProvider>,
    cache: PackageCache,
    shared_dependency: String,
    floor: Version,
}

impl Resolver {
    /// Create a resolver.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidVersion`] if the configured floor is invalid.
    pub fn new(
        registry: Arc<Registry>,
        provider: Arc<dyn PackageProvider>,
        config: &Config,
    ) -> Result<Self> {
        Ok(Self {
            registry,
            provider,
            cache: PackageCache::from_config(config),
            shared_dependency: config.shared_dependency.clone(),
            floor: config.shared_dependency_floor()?,
        })
    }

    /// The tool registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Input tools accepting `input`, in registry order.
    ///
    /// Candidates are checked concurrently. A probe whose tool cannot be
    /// provisioned counts as a rejection.
    pub async fn matching_input_tools(&self, input: &[u8]) -> Vec<Arc<Tool>> {
        let candidates: Vec<&Arc<Tool>> = self.registry.inputs().collect();
        let verdicts = join_all(candidates.iter().map(|tool| self.accepts(tool, input))).await;
        candidates
            .into_iter()
            .zip(verdicts)
            .filter_map(|(tool, accepted)| accepted.then(|| tool.clone()))
            .collect()
    }

    /// The first input tool accepting `input`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMatchingInput`] if no tool accepts it.
    pub async fn select_input_tool(&self, input: &[u8]) -> Result<Arc<Tool>> {
        let matching = self.matching_input_tools(input).await;
        if matching.len() > 1 {
            debug!(
                candidates = ?matching.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
                "Several input tools match, taking the first"
            );
        }
        matching.into_iter().next().ok_or(Error::NoMatchingInput)
    }

    /// `target` preceded by its transitive prerequisites, in execution order.
    ///
    /// `target` need not be registered; its dependencies must be.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CyclicDependency`] listing every cycle and
    /// [`Error::UnknownTool`] for unregistered dependencies.
    pub fn expand_dependencies(&self, target: &Tool) -> Result<Vec<Arc<Tool>>> {
        let graph = DependencyGraph::build_for_target(&target.name, |name| self.lookup(target, name))?;
        let order = graph.execution_order()?;
        debug!(target = %target.name, order = ?order, "Dependencies expanded");

        order
            .iter()
            .map(|name| {
                if name == &target.name {
                    return Ok(Arc::new(target.clone()));
                }
                self.registry
                    .get(name)
                    .cloned()
                    .ok_or_else(|| Error::UnknownTool { name: name.clone() })
            })
            .collect()
    }

    /// Insert glue tools between every type-incompatible pair of `skeleton`.
    ///
    /// Tools already in the skeleton, or spliced into an earlier gap, are
    /// never used as glue, so every tool appears at most once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoPathBetweenTypes`] when no chain of registered
    /// tools connects a pair.
    pub fn connect_types(&self, skeleton: &[Arc<Tool>]) -> Result<Vec<PlannedStep>> {
        let Some(first) = skeleton.first() else {
            return Ok(Vec::new());
        };
        let mut placed: HashSet<String> = skeleton.iter().map(|tool| tool.name.clone()).collect();
        let mut steps = vec![PlannedStep::new(first.clone())];

        for pair in skeleton.windows(2) {
            let (left, right) = (&pair[0], &pair[1]);
            if !left.feeds(right.as_ref()) {
                let graph = ToolchainGraph::build(
                    self.registry
                        .iter()
                        .filter(|tool| !placed.contains(&tool.name))
                        .map(Arc::as_ref)
                        .chain([left.as_ref(), right.as_ref()]),
                );
                let glue = graph
                    .glue_between(&left.name, &right.name)
                    .map_err(|e| match e {
                        pipewright_graph::Error::NoPath { .. } => Error::NoPathBetweenTypes {
                            from: left.name.clone(),
                            to: right.name.clone(),
                            produced: left.produces.join(", "),
                            consumed: right.consumes.join(", "),
                        },
                        other => other.into(),
                    })?;
                debug!(from = %left.name, to = %right.name, glue = ?glue, "Glue inserted");

                let closure = self.dependency_closure(right);
                let mut inherited: HashSet<String> = HashSet::new();
                for name in glue {
                    let tool = self
                        .registry
                        .get(&name)
                        .cloned()
                        .ok_or(Error::UnknownTool { name })?;
                    placed.insert(tool.name.clone());
                    let inherited_depends: Vec<String> = closure
                        .iter()
                        .filter(|dep| tool.feeds(dep.as_ref()))
                        .filter(|dep| inherited.insert(dep.name.clone()))
                        .map(|dep| dep.name.clone())
                        .collect();
                    steps.push(PlannedStep {
                        tool,
                        inherited_depends,
                    });
                }
            }
            steps.push(PlannedStep::new(right.clone()));
        }
        Ok(steps)
    }

    /// Unpinned pipeline from `start` to `target`.
    ///
    /// A glue tool with prerequisites of its own is promoted into the
    /// expanded dependencies and the pipeline is planned again, until every
    /// prerequisite runs before the tool needing it.
    ///
    /// # Errors
    ///
    /// See [`expand_dependencies`](Self::expand_dependencies) and
    /// [`connect_types`](Self::connect_types). Returns
    /// [`Error::InvalidSequence`] when prerequisites cannot be ordered
    /// before the tools needing them.
    pub fn plan(&self, start: Arc<Tool>, target: &Target) -> Result<Vec<PlannedStep>> {
        let mut required = target.depends.clone();
        loop {
            let sink = Tool::new(SINK_STEP)
                .consuming([target.output_type.clone()])
                .depending_on(required.clone());
            let expanded = self.expand_dependencies(&sink)?;

            let mut skeleton = vec![start.clone()];
            skeleton.extend(expanded.into_iter().filter(|tool| tool.name != start.name));

            let mut steps = self.connect_types(&skeleton)?;
            let unmet = unmet_prerequisites(&steps);
            if unmet.is_empty() {
                steps.retain(|step| step.tool.name != SOURCE_STEP && step.tool.name != SINK_STEP);
                return Ok(steps);
            }

            let promoted: Vec<String> = unmet
                .iter()
                .filter(|name| !required.contains(name))
                .cloned()
                .collect();
            if promoted.is_empty() {
                return Err(Error::invalid_sequence(format!(
                    "prerequisites of [{}] cannot run before them",
                    unmet.join(", ")
                )));
            }
            debug!(promoted = ?promoted, "Glue tools have prerequisites, planning again");
            required.extend(promoted);
        }
    }

    /// Pin the packages of a planned pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCompatibleVersion`] when the packaged tools share
    /// no usable version of the shared dependency.
    pub async fn negotiate(&self, plan: Vec<PlannedStep>) -> Result<Sequence> {
        VersionNegotiator::new(self.provider.as_ref(), &self.shared_dependency, &self.floor)
            .pin(plan)
            .await
    }

    /// Resolve the pipeline turning raw `input` into `target`.
    ///
    /// # Errors
    ///
    /// Any resolution error; see the individual stages.
    pub async fn resolve_input(
        &self,
        input: &[u8],
        target: &Target,
        observer: &dyn ExecutionObserver,
    ) -> Result<Sequence> {
        observer.on_build_start();
        let start = self.select_input_tool(input).await?;
        info!(tool = %start.name, "Input tool selected");
        let sequence = self.negotiate(self.plan(start, target)?).await?;
        sequence.validate()?;
        info!(toolchain = %sequence, "Toolchain resolved");
        observer.on_build_finish(&sequence);
        Ok(sequence)
    }

    /// Resolve the pipeline turning an artifact of `input_type` into
    /// `target`, without inspecting any input.
    ///
    /// # Errors
    ///
    /// Any resolution error; see the individual stages.
    pub async fn resolve_type(
        &self,
        input_type: &str,
        target: &Target,
        observer: &dyn ExecutionObserver,
    ) -> Result<Sequence> {
        observer.on_build_start();
        let source = Arc::new(Tool::new(SOURCE_STEP).producing([input_type]));
        let sequence = self.negotiate(self.plan(source, target)?).await?;
        sequence.validate()?;
        info!(toolchain = %sequence, "Toolchain resolved");
        observer.on_build_finish(&sequence);
        Ok(sequence)
    }

    async fn accepts(&self, tool: &Tool, input: &[u8]) -> bool {
        if tool.activation.is_empty() {
            return false;
        }
        let mut bin: Option<PathBuf> = None;
        for activation in &tool.activation {
            let passed = match activation {
                Activation::InProcess(predicate) => predicate(input),
                Activation::ExternalProbe(template) => {
                    if bin.is_none() && tool.package.is_some() {
                        match self.provision(tool).await {
                            Ok(path) => bin = Some(path),
                            Err(e) => {
                                warn!(tool = %tool.name, error = %e, "Could not provision probe");
                                return false;
                            }
                        }
                    }
                    let invocation = tool.invocation.with_template(template);
                    process::probe(&tool.name, &invocation, bin.as_deref(), input).await
                }
            };
            if !passed {
                debug!(tool = %tool.name, "Activation rejected input");
                return false;
            }
        }
        true
    }

    /// Install the newest usable release of `tool` and locate its executable.
    async fn provision(&self, tool: &Tool) -> Result<PathBuf> {
        let negotiator =
            VersionNegotiator::new(self.provider.as_ref(), &self.shared_dependency, &self.floor);
        let releases = negotiator.releases(tool).await?;
        let (Some(package), Some(latest)) = (&tool.package, releases.best(None)) else {
            return Err(Error::NoCompatibleVersion {
                tool: tool.name.clone(),
                dependency: self.shared_dependency.clone(),
            });
        };
        let version = latest.version.to_string();
        let dest = self
            .cache
            .ensure_installed(self.provider.as_ref(), package, &version)
            .await?;
        self.provider
            .locate_executable(package, &version, &dest)
            .await
    }

    fn lookup<'a>(&'a self, extra: &'a Tool, name: &str) -> Option<&'a Tool> {
        if name == extra.name {
            Some(extra)
        } else {
            self.registry.get(name).map(Arc::as_ref)
        }
    }

    /// Transitive `depends` of `tool`, nearest first, unknown names skipped.
    fn dependency_closure(&self, tool: &Tool) -> Vec<Arc<Tool>> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = tool.depends.iter().map(String::as_str).collect();
        let mut closure = Vec::new();
        while let Some(name) = queue.pop_front() {
            if !seen.insert(name) {
                continue;
            }
            if let Some(dep) = self.registry.get(name) {
                queue.extend(dep.depends.iter().map(String::as_str));
                closure.push(dep.clone());
            }
        }
        closure
    }
}

/// Names of steps whose declared prerequisites do not all run earlier.
fn unmet_prerequisites(steps: &[PlannedStep]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut unmet = Vec::new();
    for step in steps {
        if step
            .tool
            .depends
            .iter()
            .any(|dep| !seen.contains(dep.as_str()))
        {
            unmet.push(step.tool.name.clone());
        }
        seen.insert(&step.tool.name);
    }
    unmet
}
