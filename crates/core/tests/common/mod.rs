//! In-memory package provider shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use pipewright_core::{Error, PackageProvider, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// One published release.
#[derive(Clone)]
pub struct FixtureRelease {
    pub version: String,
    pub shared: Option<String>,
}

/// A published package: its releases and the shell script it installs.
#[derive(Clone, Default)]
pub struct FixturePackage {
    pub releases: Vec<FixtureRelease>,
    pub script: String,
}

/// Provider serving packages from memory and installing them as shell
/// scripts, counting every install.
#[derive(Default)]
pub struct FixtureProvider {
    packages: HashMap<String, FixturePackage>,
    failing: Vec<String>,
    install_delay: Duration,
    installs: AtomicUsize,
    installed: Mutex<Vec<String>>,
}

impl FixtureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `package` with `(version, shared)` releases running `script`.
    pub fn with_package(
        mut self,
        package: &str,
        releases: &[(&str, Option<&str>)],
        script: &str,
    ) -> Self {
        self.packages.insert(
            package.to_string(),
            FixturePackage {
                releases: releases
                    .iter()
                    .map(|(version, shared)| FixtureRelease {
                        version: (*version).to_string(),
                        shared: shared.map(str::to_string),
                    })
                    .collect(),
                script: script.to_string(),
            },
        );
        self
    }

    /// Make installs of `package` fail.
    pub fn failing_install(mut self, package: &str) -> Self {
        self.failing.push(package.to_string());
        self
    }

    /// Slow down installs to widen race windows.
    pub fn with_install_delay(mut self, delay: Duration) -> Self {
        self.install_delay = delay;
        self
    }

    pub fn install_count(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }

    /// `package@version` of every install, in order.
    pub fn installed(&self) -> Vec<String> {
        self.installed.lock().unwrap().clone()
    }

    fn package(&self, package: &str) -> Result<&FixturePackage> {
        self.packages
            .get(package)
            .ok_or_else(|| Error::provider(format!("package '{package}' not found")))
    }
}

#[async_trait]
impl PackageProvider for FixtureProvider {
    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn list_versions(&self, package: &str) -> Result<Vec<String>> {
        Ok(self
            .package(package)?
            .releases
            .iter()
            .map(|r| r.version.clone())
            .collect())
    }

    async fn shared_dependency_version(
        &self,
        package: &str,
        version: &str,
        _dependency: &str,
    ) -> Result<Option<String>> {
        self.package(package)?
            .releases
            .iter()
            .find(|r| r.version == version)
            .map(|r| r.shared.clone())
            .ok_or_else(|| Error::provider(format!("{package}@{version} not found")))
    }

    async fn install(&self, package: &str, version: &str, dest: &Path) -> Result<()> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        self.installed
            .lock()
            .unwrap()
            .push(format!("{package}@{version}"));
        if !self.install_delay.is_zero() {
            tokio::time::sleep(self.install_delay).await;
        }
        if self.failing.iter().any(|p| p == package) {
            std::fs::write(dest.join("partial.js"), "half").unwrap();
            return Err(Error::install_failed(package, version, "tarball truncated"));
        }

        let script = self.package(package)?.script.clone();
        std::fs::write(dest.join("run.sh"), script).unwrap();
        std::fs::create_dir_all(dest.join("lib")).unwrap();
        std::fs::write(dest.join("lib/index.js"), "module.exports = {}").unwrap();
        std::fs::write(
            dest.join("package.json"),
            format!("{{\"name\":\"{package}\",\"version\":\"{version}\"}}"),
        )
        .unwrap();
        Ok(())
    }

    async fn locate_executable(
        &self,
        _package: &str,
        _version: &str,
        dest: &Path,
    ) -> Result<PathBuf> {
        Ok(dest.join("run.sh"))
    }
}
