//! Subcommand implementations.
//!
//! Each command writes its result to the given writer; logs and progress
//! go to stderr.

use crate::progress::SpinnerObserver;
use miette::IntoDiagnostic;
use pipewright_core::{
    Config, MemoizedProvider, PackageCache, PackageProvider, Registry, Sequence, Target, Toolchain,
};
use pipewright_tools_npm::NpmProvider;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument};

/// Everything a command needs besides its own arguments.
pub struct Context {
    pub config: Config,
    pub registry: Arc<Registry>,
    pub provider: Arc<dyn PackageProvider>,
    pub progress: bool,
    pub json: bool,
}

impl Context {
    /// Build the context from the global flags.
    ///
    /// `--config` is read first, then environment overrides, then
    /// `--cache-dir`.
    pub fn new(
        config_path: Option<&Path>,
        cache_dir: Option<PathBuf>,
        update_cache: bool,
        registry: Registry,
        json: bool,
    ) -> miette::Result<Self> {
        let config = match config_path {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        }
        .with_process_env();
        let config = match cache_dir {
            Some(dir) => config.with_cache_dir(dir),
            None => config,
        };

        let npm: Arc<dyn PackageProvider> = Arc::new(NpmProvider::new());
        let provider = if update_cache {
            npm
        } else {
            Arc::new(MemoizedProvider::new(npm))
        };
        debug!(cache_dir = %config.cache_dir.display(), provider = provider.name(), "Context ready");

        Ok(Self {
            config,
            registry: Arc::new(registry),
            provider,
            progress: !json && std::io::IsTerminal::is_terminal(&std::io::stderr()),
            json,
        })
    }

    fn toolchain(&self) -> miette::Result<Toolchain> {
        Ok(Toolchain::new(
            self.registry.clone(),
            self.provider.clone(),
            &self.config,
        )?)
    }
}

/// Read the whole input file, or stdin when `file` is `None`.
pub async fn read_input(file: Option<&Path>) -> miette::Result<Vec<u8>> {
    match file {
        Some(path) => tokio::fs::read(path)
            .await
            .into_diagnostic()
            .map_err(|e| e.wrap_err(format!("Failed to read {}", path.display()))),
        None => {
            let mut input = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut input)
                .await
                .into_diagnostic()?;
            Ok(input)
        }
    }
}

/// `pipewright run`
#[instrument(skip(ctx, out))]
pub async fn run(
    ctx: &Context,
    file: Option<&Path>,
    target: &Target,
    out: &mut impl Write,
) -> miette::Result<()> {
    let input = read_input(file).await?;
    let toolchain = ctx.toolchain()?;
    let observer = SpinnerObserver::new(ctx.progress);
    let result = toolchain.run(input, target, &observer).await;
    observer.finish();

    let output = result?;
    out.write_all(&output).into_diagnostic()?;
    if !output.ends_with(b"\n") {
        out.write_all(b"\n").into_diagnostic()?;
    }
    Ok(())
}

/// `pipewright show-toolchain`
#[instrument(skip(ctx, out))]
pub async fn show_toolchain(
    ctx: &Context,
    file: Option<&Path>,
    from: Option<&str>,
    target: &Target,
    out: &mut impl Write,
) -> miette::Result<()> {
    let toolchain = ctx.toolchain()?;
    let observer = SpinnerObserver::new(ctx.progress);
    let result = match from {
        Some(from) => {
            toolchain
                .resolver()
                .resolve_type(from, target, &observer)
                .await
        }
        None => {
            let input = read_input(file).await?;
            toolchain.resolve(&input, target, &observer).await
        }
    };
    observer.finish();

    let sequence = result?;
    write_sequence(&sequence, ctx.json, out)
}

fn write_sequence(sequence: &Sequence, json: bool, out: &mut impl Write) -> miette::Result<()> {
    if json {
        let steps: Vec<_> = sequence
            .iter()
            .map(|step| {
                serde_json::json!({
                    "name": step.name(),
                    "package": step.tool.package,
                    "version": step.version.as_ref().map(ToString::to_string),
                })
            })
            .collect();
        let document = serde_json::json!({
            "steps": steps,
            "shared_version": sequence.shared_version().map(ToString::to_string),
        });
        writeln!(out, "{document}").into_diagnostic()
    } else {
        writeln!(out, "{sequence}").into_diagnostic()
    }
}

/// `pipewright list-inputs`
pub fn list_inputs(registry: &Registry, json: bool, out: &mut impl Write) -> miette::Result<()> {
    if json {
        let tools: Vec<_> = registry
            .inputs()
            .map(|tool| {
                serde_json::json!({
                    "name": tool.name,
                    "package": tool.package,
                    "produces": tool.produces,
                })
            })
            .collect();
        return writeln!(out, "{}", serde_json::Value::Array(tools)).into_diagnostic();
    }
    for tool in registry.inputs() {
        write!(out, "{}", tool.name).into_diagnostic()?;
        if let Some(package) = &tool.package {
            write!(out, " ({package})").into_diagnostic()?;
        }
        writeln!(out, " -> {}", tool.produces.join(", ")).into_diagnostic()?;
    }
    Ok(())
}

/// `pipewright list-installed`
pub fn list_installed(cache: &PackageCache, json: bool, out: &mut impl Write) -> miette::Result<()> {
    let entries = cache.installed()?;
    if json {
        let entries: Vec<_> = entries
            .iter()
            .map(|entry| {
                serde_json::json!({
                    "package": entry.package,
                    "version": entry.version,
                    "path": entry.path.display().to_string(),
                })
            })
            .collect();
        return writeln!(out, "{}", serde_json::Value::Array(entries)).into_diagnostic();
    }
    for entry in entries {
        writeln!(out, "{}@{}", entry.package, entry.version).into_diagnostic()?;
    }
    Ok(())
}
