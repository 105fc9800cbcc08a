//! npm registry package provider for pipewright.
//!
//! Answers version and dependency queries with `npm view`, fetches releases
//! with `npm pack`, unpacks the tarball into the cache staging directory
//! and installs runtime dependencies with `npm install --omit=dev`.

pub mod commands;
pub mod unpack;

use async_trait::async_trait;
use pipewright_core::{Error, PackageProvider, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub use unpack::Manifest;

/// Package provider backed by the npm CLI.
#[derive(Debug, Clone)]
pub struct NpmProvider {
    npm: PathBuf,
}

impl Default for NpmProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl NpmProvider {
    /// Use `npm` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            npm: PathBuf::from("npm"),
        }
    }

    /// Use a specific npm executable.
    #[must_use]
    pub fn with_program(npm: impl Into<PathBuf>) -> Self {
        Self { npm: npm.into() }
    }
}

#[async_trait]
impl PackageProvider for NpmProvider {
    fn name(&self) -> &'static str {
        "npm"
    }

    async fn list_versions(&self, package: &str) -> Result<Vec<String>> {
        let versions = commands::view_versions(&self.npm, package).await?;
        debug!(package, count = versions.len(), "Listed npm versions");
        Ok(versions)
    }

    async fn shared_dependency_version(
        &self,
        package: &str,
        version: &str,
        dependency: &str,
    ) -> Result<Option<String>> {
        commands::view_dependency(&self.npm, package, version, dependency).await
    }

    async fn install(&self, package: &str, version: &str, dest: &Path) -> Result<()> {
        let download = tempfile::TempDir::new()
            .map_err(|e| Error::io(e, None, "create download directory"))?;
        let tarball = commands::pack(&self.npm, package, version, download.path()).await?;
        info!(package, version, tarball = %tarball.display(), "Downloaded package");

        let target = dest.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&tarball)
                .map_err(|e| Error::io(e, Some(&tarball), "open tarball"))?;
            unpack::unpack_tarball(std::io::BufReader::new(file), &target)
        })
        .await
        .map_err(|e| Error::install_failed(package, version, format!("unpack task failed: {e}")))??;

        commands::install_production(&self.npm, dest)
            .await
            .map_err(|e| Error::install_failed(package, version, e.to_string()))
    }

    async fn locate_executable(
        &self,
        _package: &str,
        _version: &str,
        dest: &Path,
    ) -> Result<PathBuf> {
        let manifest = Manifest::read(dest)?;
        Ok(dest.join(manifest.executable()))
    }
}
