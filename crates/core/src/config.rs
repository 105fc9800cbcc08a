//! Runtime configuration.
//!
//! Values come from, in increasing precedence: built-in defaults, an
//! optional TOML file, the `PIPEWRIGHT_CACHE_DIR` environment variable,
//! and finally whatever the caller sets through the builder methods.

use crate::{Error, Result, version};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the package cache root.
pub const CACHE_DIR_ENV: &str = "PIPEWRIGHT_CACHE_DIR";

/// Shared dependency whose version every packaged tool must agree on.
pub const DEFAULT_SHARED_DEPENDENCY: &str = "@buggyorg/graphtools";

/// Oldest shared-dependency version still accepted.
pub const DEFAULT_SHARED_DEPENDENCY_FLOOR: &str = "0.4.0-pre.11";

/// Package manifest whose presence marks a completed install.
pub const DEFAULT_MANIFEST_FILE: &str = "package.json";

/// Configuration for resolution, caching and execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Root of the package cache.
    pub cache_dir: PathBuf,
    /// Total time to wait for a contended install lock.
    pub lock_timeout_secs: u64,
    /// Delay between lock attempts.
    pub lock_poll_interval_ms: u64,
    /// Name of the shared dependency to negotiate.
    pub shared_dependency: String,
    /// Releases built against an older shared dependency are ignored.
    pub shared_dependency_floor: String,
    /// Manifest file that marks a cache entry as installed.
    pub manifest_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            lock_timeout_secs: 600,
            lock_poll_interval_ms: 500,
            shared_dependency: DEFAULT_SHARED_DEPENDENCY.to_string(),
            shared_dependency_floor: DEFAULT_SHARED_DEPENDENCY_FLOOR.to_string(),
            manifest_file: DEFAULT_MANIFEST_FILE.to_string(),
        }
    }
}

impl Config {
    /// Read a TOML configuration file. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read and a configuration
    /// error if it is not valid TOML for this structure.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::io(e, Some(path), "read configuration"))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::configuration(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    #[must_use]
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(CACHE_DIR_ENV).filter(|v| !v.is_empty()) {
            self.cache_dir = PathBuf::from(dir);
        }
        self
    }

    /// Apply overrides from the process environment.
    #[must_use]
    pub fn with_process_env(self) -> Self {
        self.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Set the cache root.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Set the lock timeout.
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_secs = timeout.as_secs();
        self
    }

    /// Total lock wait budget.
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    /// Delay between lock attempts.
    #[must_use]
    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_interval_ms)
    }

    /// The parsed shared-dependency floor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidVersion`] if the floor is not a version.
    pub fn shared_dependency_floor(&self) -> Result<Version> {
        version::parse(&self.shared_dependency_floor)
    }

    /// Check that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.lock_poll_interval_ms == 0 {
            return Err(Error::configuration("lock-poll-interval-ms must be positive"));
        }
        if self.manifest_file.is_empty() {
            return Err(Error::configuration("manifest-file must not be empty"));
        }
        self.shared_dependency_floor()
            .map_err(|e| Error::configuration(format!("shared-dependency-floor: {e}")))?;
        Ok(())
    }
}

/// Default package cache root.
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("pipewright")
        .join("packages")
}
