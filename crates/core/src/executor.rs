//! Sequential execution of resolved pipelines.

use crate::cache::PackageCache;
use crate::process;
use crate::provider::PackageProvider;
use crate::tool::{ResolvedTool, Sequence, TransformContext};
use crate::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Callbacks reporting resolution and execution progress.
///
/// Every method has a no-op default.
pub trait ExecutionObserver: Send + Sync {
    /// Resolution started.
    fn on_build_start(&self) {}

    /// Resolution produced `sequence`.
    fn on_build_finish(&self, _sequence: &Sequence) {}

    /// `tool` is about to run.
    fn on_tool_start(&self, _tool: &ResolvedTool) {}

    /// `tool` finished, with `error` set if it failed.
    fn on_tool_finish(&self, _error: Option<&Error>, _tool: &ResolvedTool) {}
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ExecutionObserver for NoopObserver {}

/// Runs pipelines step by step, installing packages on demand.
pub struct Executor {
    provider: Arc<dyn PackageProvider>,
    cache: PackageCache,
}

impl Executor {
    /// Create an executor.
    #[must_use]
    pub fn new(provider: Arc<dyn PackageProvider>, cache: PackageCache) -> Self {
        Self { provider, cache }
    }

    /// Feed `input` through every step of `sequence`, returning the last
    /// step's output.
    ///
    /// Stops at the first failing step; later steps are neither installed
    /// nor run.
    ///
    /// # Errors
    ///
    /// Returns the first step's error, after reporting it to `observer`.
    pub async fn run(
        &self,
        sequence: &Sequence,
        input: Vec<u8>,
        observer: &dyn ExecutionObserver,
    ) -> Result<Vec<u8>> {
        let mut artifact = input;
        for step in sequence {
            observer.on_tool_start(step);
            let started = Instant::now();
            match self.run_step(step, &artifact).await {
                Ok(output) => {
                    info!(
                        tool = %step.display_name(),
                        bytes = output.len(),
                        elapsed_ms = started.elapsed().as_millis(),
                        "Step finished"
                    );
                    observer.on_tool_finish(None, step);
                    artifact = output;
                }
                Err(e) => {
                    warn!(tool = %step.display_name(), error = %e, "Step failed");
                    observer.on_tool_finish(Some(&e), step);
                    return Err(e);
                }
            }
        }
        Ok(artifact)
    }

    async fn run_step(&self, step: &ResolvedTool, artifact: &[u8]) -> Result<Vec<u8>> {
        let install_dir = match (&step.tool.package, &step.version) {
            (Some(package), Some(version)) => Some(
                self.cache
                    .ensure_installed(self.provider.as_ref(), package, &version.to_string())
                    .await?,
            ),
            _ => None,
        };

        if let Some(transform) = &step.tool.transform {
            debug!(tool = %step.name(), "Running in-process transform");
            let context = TransformContext {
                install_dir: install_dir.as_deref(),
                version: step.version.as_ref(),
            };
            return transform(artifact, &context)
                .map_err(|message| Error::tool_failed(step.name(), None, message));
        }

        let bin = self.locate(step, install_dir).await?;
        process::run(step.name(), &step.tool.invocation, bin.as_deref(), artifact).await
    }

    async fn locate(
        &self,
        step: &ResolvedTool,
        install_dir: Option<PathBuf>,
    ) -> Result<Option<PathBuf>> {
        let (Some(package), Some(version), Some(dir)) =
            (&step.tool.package, &step.version, install_dir)
        else {
            return Ok(None);
        };
        self.provider
            .locate_executable(package, &version.to_string(), &dir)
            .await
            .map(Some)
    }
}
