//! pipewright CLI
//!
//! Resolves the toolchain that turns an input artifact into a requested
//! type, installs the packaged tools it needs and runs them in order.

// Artifacts go to stdout and fatal errors to stderr
#![allow(clippy::print_stderr)]

mod cli;
mod commands;
mod progress;
mod registry;
mod tracing;

use crate::cli::{Cli, Commands};
use crate::commands::Context;
use crate::tracing::{TracingConfig, init_tracing};
use pipewright_core::{PackageCache, Target};

#[tokio::main]
async fn main() {
    // Tracing may be unusable during a panic
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    if let Err(error) = run_main().await {
        eprintln!("{error:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> miette::Result<()> {
    let cli = cli::parse();

    init_tracing(TracingConfig {
        format: cli.tracing_format(),
        level: cli.level.into(),
        ..TracingConfig::default()
    })?;

    let ctx = Context::new(
        cli.config.as_deref(),
        cli.cache_dir.clone(),
        cli.update_cache,
        registry::builtin()?,
        cli.json,
    )?;
    let mut out = std::io::stdout().lock();

    match cli.command {
        Commands::Run { file, to, depends } => {
            let target = Target::new(to).with_depends(depends);
            commands::run(&ctx, file.as_deref(), &target, &mut out).await
        }
        Commands::ShowToolchain {
            file,
            to,
            from,
            depends,
        } => {
            let target = Target::new(to).with_depends(depends);
            commands::show_toolchain(&ctx, file.as_deref(), from.as_deref(), &target, &mut out)
                .await
        }
        Commands::ListInputs => commands::list_inputs(&ctx.registry, ctx.json, &mut out),
        Commands::ListInstalled => {
            let cache = PackageCache::from_config(&ctx.config);
            commands::list_installed(&cache, ctx.json, &mut out)
        }
    }
}
