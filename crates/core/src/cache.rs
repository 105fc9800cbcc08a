//! On-disk package cache with cross-process install locking.
//!
//! Layout:
//!
//! ```text
//! <root>/<package>/<version>/           installed package
//! <root>/<package>/<version>/.lock      install lock
//! <root>/<package>/<version>/.staging/  in-flight install
//! ```
//!
//! An entry counts as installed only once its manifest is present. The
//! manifest is moved out of the staging directory last, so a reader never
//! sees a manifest next to a partially unpacked package.

use crate::config::{Config, DEFAULT_MANIFEST_FILE};
use crate::provider::PackageProvider;
use crate::{Error, Result};
use fs4::tokio::AsyncFileExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

const LOCK_FILE: &str = ".lock";
const STAGING_DIR: &str = ".staging";

/// An installed cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Package name, including any scope.
    pub package: String,
    /// Installed version.
    pub version: String,
    /// Entry directory.
    pub path: PathBuf,
}

/// Package cache rooted at a directory.
#[derive(Debug, Clone)]
pub struct PackageCache {
    root: PathBuf,
    manifest_file: String,
    lock_timeout: Duration,
    poll_interval: Duration,
}

impl PackageCache {
    /// Create a cache at `root` with default timings.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let defaults = Config::default();
        Self {
            root: root.into(),
            manifest_file: DEFAULT_MANIFEST_FILE.to_string(),
            lock_timeout: defaults.lock_timeout(),
            poll_interval: defaults.lock_poll_interval(),
        }
    }

    /// Create a cache from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            root: config.cache_dir.clone(),
            manifest_file: config.manifest_file.clone(),
            lock_timeout: config.lock_timeout(),
            poll_interval: config.lock_poll_interval(),
        }
    }

    /// Set the total lock wait budget.
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Set the delay between lock attempts.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Cache root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of `package@version`. Scoped names nest one level deeper.
    #[must_use]
    pub fn entry_path(&self, package: &str, version: &str) -> PathBuf {
        self.root.join(package).join(version)
    }

    /// Whether `package@version` is fully installed.
    #[must_use]
    pub fn is_installed(&self, package: &str, version: &str) -> bool {
        self.entry_path(package, version)
            .join(&self.manifest_file)
            .is_file()
    }

    /// Install `package@version` through `provider` unless already present,
    /// returning the entry directory.
    ///
    /// Concurrent callers, in this process or others, serialize on the
    /// entry's lock file; exactly one of them runs the provider install.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockTimeout`] if the lock cannot be taken in time,
    /// [`Error::InstallFailed`] if the provider fails, and I/O errors from
    /// cache directory operations.
    pub async fn ensure_installed(
        &self,
        provider: &dyn PackageProvider,
        package: &str,
        version: &str,
    ) -> Result<PathBuf> {
        let entry = self.entry_path(package, version);
        if self.is_installed(package, version) {
            trace!(package, version, "Cache hit");
            return Ok(entry);
        }

        fs::create_dir_all(&entry)
            .await
            .map_err(|e| Error::io(e, Some(&entry), "create cache entry"))?;
        let _lock = self.acquire_lock(&entry.join(LOCK_FILE)).await?;

        // Someone else may have finished while we waited.
        if self.is_installed(package, version) {
            debug!(package, version, "Installed by another process");
            return Ok(entry);
        }

        let staging = entry.join(STAGING_DIR);
        if fs::try_exists(&staging).await.unwrap_or(false) {
            warn!(path = %staging.display(), "Removing leftover staging directory");
            fs::remove_dir_all(&staging)
                .await
                .map_err(|e| Error::io(e, Some(&staging), "remove stale staging directory"))?;
        }
        fs::create_dir_all(&staging)
            .await
            .map_err(|e| Error::io(e, Some(&staging), "create staging directory"))?;

        info!(package, version, provider = provider.name(), "Installing package");
        let result = match provider.install(package, version, &staging).await {
            Ok(()) => self.promote(&staging, &entry).await,
            Err(e) => Err(e),
        }
        .map_err(|e| match e {
            Error::InstallFailed { .. } => e,
            other => Error::install_failed(package, version, other.to_string()),
        });

        if let Err(e) = &result {
            warn!(package, version, error = %e, "Install failed");
            if let Err(cleanup) = fs::remove_dir_all(&staging).await {
                trace!(error = %cleanup, "Staging cleanup failed");
            }
        } else {
            debug!(package, version, path = %entry.display(), "Package installed");
        }
        result.map(|()| entry)
    }

    /// Every fully installed entry, sorted by package then version.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the cache root exists but cannot be read.
    pub fn installed(&self) -> Result<Vec<CacheEntry>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        // <package>/<version>/<manifest> or @scope/<name>/<version>/<manifest>
        for item in WalkDir::new(&self.root)
            .min_depth(3)
            .max_depth(4)
            .into_iter()
            .filter_entry(|e| e.file_name() != STAGING_DIR)
        {
            let item = item.map_err(|e| {
                let path = e.path().map(Path::to_path_buf);
                Error::io(
                    e.into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("directory loop")),
                    path.as_deref(),
                    "scan package cache",
                )
            })?;
            if item.file_name() != self.manifest_file.as_str() || !item.file_type().is_file() {
                continue;
            }
            let Some(dir) = item.path().parent() else {
                continue;
            };
            let Ok(relative) = dir.strip_prefix(&self.root) else {
                continue;
            };
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let Some((version, name)) = parts.split_last() else {
                continue;
            };
            let scoped = name.len() == 2 && name[0].starts_with('@');
            if name.len() == 1 || scoped {
                entries.push(CacheEntry {
                    package: name.join("/"),
                    version: version.clone(),
                    path: dir.to_path_buf(),
                });
            }
        }

        entries.sort_by(|a, b| (&a.package, &a.version).cmp(&(&b.package, &b.version)));
        Ok(entries)
    }

    async fn acquire_lock(&self, path: &Path) -> Result<InstallLock> {
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .await
            .map_err(|e| Error::io(e, Some(path), "open install lock"))?;

        let started = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(true) => {
                    trace!(path = %path.display(), "Install lock acquired");
                    return Ok(InstallLock { _file: file });
                }
                Ok(false) => {}
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(Error::io(e, Some(path), "lock install entry")),
            }
            if started.elapsed() >= self.lock_timeout {
                return Err(Error::LockTimeout {
                    path: path.to_path_buf(),
                    seconds: self.lock_timeout.as_secs(),
                });
            }
            trace!(path = %path.display(), "Install lock busy, waiting");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Move the staged package into the entry, manifest last.
    async fn promote(&self, staging: &Path, entry: &Path) -> Result<()> {
        let manifest = staging.join(&self.manifest_file);
        if !fs::try_exists(&manifest).await.unwrap_or(false) {
            return Err(Error::provider(format!(
                "package has no {}",
                self.manifest_file
            )));
        }

        let mut children = fs::read_dir(staging)
            .await
            .map_err(|e| Error::io(e, Some(staging), "read staging directory"))?;
        while let Some(child) = children
            .next_entry()
            .await
            .map_err(|e| Error::io(e, Some(staging), "read staging directory"))?
        {
            if child.file_name() == self.manifest_file.as_str() {
                continue;
            }
            move_into(&child.path(), &entry.join(child.file_name())).await?;
        }
        move_into(&manifest, &entry.join(&self.manifest_file)).await?;

        fs::remove_dir(staging)
            .await
            .map_err(|e| Error::io(e, Some(staging), "remove staging directory"))
    }
}

/// Lock guard. Dropping the file descriptor releases the lock, including
/// when the install future is cancelled.
struct InstallLock {
    _file: fs::File,
}

async fn move_into(from: &Path, to: &Path) -> Result<()> {
    // Leftovers from an interrupted promote are replaced.
    if let Ok(meta) = fs::symlink_metadata(to).await {
        let removed = if meta.is_dir() {
            fs::remove_dir_all(to).await
        } else {
            fs::remove_file(to).await
        };
        removed.map_err(|e| Error::io(e, Some(to), "replace cache file"))?;
    }
    fs::rename(from, to)
        .await
        .map_err(|e| Error::io(e, Some(to), "move staged file"))
}
