//! npm CLI command wrappers.
//!
//! Thin async wrappers around the `npm` executable plus parsers for its
//! `--json` output. Every command takes the program to run so tests and
//! callers can substitute a different npm.

use pipewright_core::{Error, Result};
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// List every published version of `package` (`npm view <pkg> versions`).
///
/// # Errors
///
/// Returns a provider error if npm fails or prints something other than a
/// version list.
pub async fn view_versions(npm: &Path, package: &str) -> Result<Vec<String>> {
    let stdout = run(npm, &["view", package, "versions", "--json"], None).await?;
    parse_versions(&stdout)
}

/// The declared version of `dependency` in `package@version`, with range
/// markers removed, or `None` if the release does not depend on it.
///
/// # Errors
///
/// Returns a provider error if npm fails.
pub async fn view_dependency(
    npm: &Path,
    package: &str,
    version: &str,
    dependency: &str,
) -> Result<Option<String>> {
    let spec = format!("{package}@{version}");
    let field = format!("dependencies.{dependency}");
    let stdout = run(npm, &["view", &spec, &field, "--json"], None).await?;
    Ok(parse_dependency(&stdout))
}

/// Download the tarball of `package@version` into `dir`, returning its
/// path (`npm pack`).
///
/// # Errors
///
/// Returns a provider error if npm fails or names no tarball.
pub async fn pack(npm: &Path, package: &str, version: &str, dir: &Path) -> Result<std::path::PathBuf> {
    let spec = format!("{package}@{version}");
    let stdout = run(npm, &["pack", &spec, "--silent"], Some(dir)).await?;
    let name = stdout
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .ok_or_else(|| Error::provider(format!("npm pack {spec} produced no tarball")))?;
    Ok(dir.join(name))
}

/// Install the runtime dependencies of the package unpacked in `dir`.
///
/// # Errors
///
/// Returns a provider error if npm fails.
pub async fn install_production(npm: &Path, dir: &Path) -> Result<()> {
    run(
        npm,
        &["install", "--omit=dev", "--no-audit", "--no-fund", "--silent"],
        Some(dir),
    )
    .await
    .map(drop)
}

async fn run(npm: &Path, args: &[&str], cwd: Option<&Path>) -> Result<String> {
    debug!(npm = %npm.display(), ?args, "Running npm");

    let mut cmd = Command::new(npm);
    cmd.args(args);
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    let output = cmd
        .output()
        .await
        .map_err(|e| Error::provider(format!("Failed to run {}: {e}", npm.display())))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::provider(format!(
            "npm {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse `npm view <pkg> versions --json`. npm prints a bare string when a
/// package has a single version.
///
/// # Errors
///
/// Returns a provider error on anything but a string or a string array.
pub fn parse_versions(stdout: &str) -> Result<Vec<String>> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: serde_json::Value = serde_json::from_str(stdout)
        .map_err(|e| Error::provider(format!("Invalid npm version list: {e}")))?;
    match value {
        serde_json::Value::String(version) => Ok(vec![version]),
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::String(version) => Ok(version),
                other => Err(Error::provider(format!("Unexpected version entry {other}"))),
            })
            .collect(),
        other => Err(Error::provider(format!("Unexpected npm version list {other}"))),
    }
}

/// Parse `npm view <pkg>@<v> dependencies.<dep> --json`. Empty output means
/// the dependency is absent.
#[must_use]
pub fn parse_dependency(stdout: &str) -> Option<String> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() || trimmed == "undefined" {
        return None;
    }
    let raw = match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::String(range)) => range,
        Ok(_) => return None,
        Err(_) => trimmed.trim_matches('"').to_string(),
    };
    let stripped = raw.trim_start_matches(['^', '~']).to_string();
    (!stripped.is_empty()).then_some(stripped)
}
