//! Package provider abstraction.
//!
//! A provider answers the three questions the resolver asks of a package
//! registry (which releases exist, which shared-dependency version a
//! release was built against, how to fetch it) and locates the executable
//! inside an installed package.

use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

/// Source of packaged tools.
#[async_trait]
pub trait PackageProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &'static str;

    /// All published versions of `package`, in any order.
    async fn list_versions(&self, package: &str) -> Result<Vec<String>>;

    /// Version of the shared dependency `dependency` declared by
    /// `package@version`, with range markers already removed. `None` when
    /// the release does not depend on it.
    async fn shared_dependency_version(
        &self,
        package: &str,
        version: &str,
        dependency: &str,
    ) -> Result<Option<String>>;

    /// Fetch `package@version` and unpack it into `dest`.
    ///
    /// `dest` exists and is empty. On success it must contain the package
    /// manifest.
    async fn install(&self, package: &str, version: &str, dest: &Path) -> Result<()>;

    /// Path of the executable inside an installed package.
    async fn locate_executable(&self, package: &str, version: &str, dest: &Path)
    -> Result<PathBuf>;
}

type SharedKey = (String, String, String);

/// Provider wrapper that remembers registry lookups for its lifetime.
///
/// Installs are never memoized; the package cache already makes them
/// idempotent.
pub struct MemoizedProvider {
    inner: Arc<dyn PackageProvider>,
    versions: RwLock<HashMap<String, Vec<String>>>,
    shared: RwLock<HashMap<SharedKey, Option<String>>>,
    executables: RwLock<HashMap<PathBuf, PathBuf>>,
}

impl MemoizedProvider {
    /// Wrap a provider.
    #[must_use]
    pub fn new(inner: Arc<dyn PackageProvider>) -> Self {
        Self {
            inner,
            versions: RwLock::new(HashMap::new()),
            shared: RwLock::new(HashMap::new()),
            executables: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl PackageProvider for MemoizedProvider {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn list_versions(&self, package: &str) -> Result<Vec<String>> {
        if let Some(hit) = self.versions.read().await.get(package) {
            trace!(package, "Version list served from memo");
            return Ok(hit.clone());
        }
        let versions = self.inner.list_versions(package).await?;
        self.versions
            .write()
            .await
            .insert(package.to_string(), versions.clone());
        Ok(versions)
    }

    async fn shared_dependency_version(
        &self,
        package: &str,
        version: &str,
        dependency: &str,
    ) -> Result<Option<String>> {
        let key = (
            package.to_string(),
            version.to_string(),
            dependency.to_string(),
        );
        if let Some(hit) = self.shared.read().await.get(&key) {
            return Ok(hit.clone());
        }
        let shared = self
            .inner
            .shared_dependency_version(package, version, dependency)
            .await?;
        self.shared.write().await.insert(key, shared.clone());
        Ok(shared)
    }

    async fn install(&self, package: &str, version: &str, dest: &Path) -> Result<()> {
        self.inner.install(package, version, dest).await
    }

    async fn locate_executable(
        &self,
        package: &str,
        version: &str,
        dest: &Path,
    ) -> Result<PathBuf> {
        if let Some(hit) = self.executables.read().await.get(dest) {
            return Ok(hit.clone());
        }
        let path = self.inner.locate_executable(package, version, dest).await?;
        self.executables
            .write()
            .await
            .insert(dest.to_path_buf(), path.clone());
        Ok(path)
    }
}
