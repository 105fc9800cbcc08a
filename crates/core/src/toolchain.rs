//! Resolve-then-run entry point.

use crate::cache::PackageCache;
use crate::config::Config;
use crate::executor::{ExecutionObserver, Executor};
use crate::provider::PackageProvider;
use crate::registry::Registry;
use crate::resolver::{Resolver, Target};
use crate::tool::Sequence;
use crate::Result;
use std::sync::Arc;

/// A registry, a provider and a cache wired together.
pub struct Toolchain {
    resolver: Resolver,
    executor: Executor,
    cache: PackageCache,
}

impl Toolchain {
    /// Wire up a toolchain.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid.
    pub fn new(
        registry: Arc<Registry>,
        provider: Arc<dyn PackageProvider>,
        config: &Config,
    ) -> Result<Self> {
        config.validate()?;
        let cache = PackageCache::from_config(config);
        Ok(Self {
            resolver: Resolver::new(registry, provider.clone(), config)?,
            executor: Executor::new(provider, cache.clone()),
            cache,
        })
    }

    /// The resolver.
    #[must_use]
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// The package cache.
    #[must_use]
    pub fn cache(&self) -> &PackageCache {
        &self.cache
    }

    /// Resolve the pipeline for raw `input`.
    ///
    /// # Errors
    ///
    /// See [`Resolver::resolve_input`].
    pub async fn resolve(
        &self,
        input: &[u8],
        target: &Target,
        observer: &dyn ExecutionObserver,
    ) -> Result<Sequence> {
        self.resolver.resolve_input(input, target, observer).await
    }

    /// Resolve the pipeline for `input` and run it.
    ///
    /// # Errors
    ///
    /// Any resolution or execution error.
    pub async fn run(
        &self,
        input: Vec<u8>,
        target: &Target,
        observer: &dyn ExecutionObserver,
    ) -> Result<Vec<u8>> {
        let sequence = self.resolve(&input, target, observer).await?;
        self.executor.run(&sequence, input, observer).await
    }
}
