//! Shared-dependency version negotiation.
//!
//! Every packaged tool in a pipeline is built against some release of one
//! shared library. The tools exchange artifacts in that library's format,
//! so the pipeline must agree on one version of it: the newest version `v`
//! such that every packaged tool has a release built against `v` or later.

use crate::tool::{PlannedStep, ResolvedTool, Sequence, Tool};
use crate::version::{at_least, parse_lenient};
use crate::{Error, Result};
use futures::future::{join_all, try_join_all};
use semver::Version;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::provider::PackageProvider;

/// A usable release of a packaged tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    /// Package version.
    pub version: Version,
    /// Shared-dependency version the release was built against, if any.
    pub shared: Option<Version>,
}

impl Release {
    /// Whether this release can join a pipeline negotiated at `negotiated`.
    ///
    /// A release without the shared dependency fits any pipeline.
    #[must_use]
    pub fn satisfies(&self, negotiated: Option<&Version>) -> bool {
        match (&self.shared, negotiated) {
            (Some(shared), Some(negotiated)) => shared >= negotiated,
            _ => true,
        }
    }
}

/// Usable releases of one tool, newest first.
#[derive(Debug, Clone)]
pub struct ToolReleases {
    /// Tool name.
    pub tool: String,
    /// Releases at or above the tool's minimum version and the floor.
    pub releases: Vec<Release>,
}

impl ToolReleases {
    /// Newest release fitting `negotiated`.
    #[must_use]
    pub fn best(&self, negotiated: Option<&Version>) -> Option<&Release> {
        self.releases.iter().find(|r| r.satisfies(negotiated))
    }
}

/// Negotiates the shared-dependency version of a pipeline and pins every
/// packaged tool to a release.
pub struct VersionNegotiator<'a> {
    provider: &'a dyn PackageProvider,
    dependency: &'a str,
    floor: &'a Version,
}

impl<'a> VersionNegotiator<'a> {
    /// Create a negotiator for shared dependency `dependency`. Releases
    /// built against a version below `floor` are ignored.
    #[must_use]
    pub fn new(provider: &'a dyn PackageProvider, dependency: &'a str, floor: &'a Version) -> Self {
        Self {
            provider,
            dependency,
            floor,
        }
    }

    /// Usable releases of a packaged tool, newest first.
    ///
    /// A failed version listing is logged and treated as "no releases".
    ///
    /// # Errors
    ///
    /// Returns a provider error if a shared-dependency lookup fails.
    pub async fn releases(&self, tool: &Tool) -> Result<ToolReleases> {
        let Some(package) = &tool.package else {
            return Ok(ToolReleases {
                tool: tool.name.clone(),
                releases: Vec::new(),
            });
        };

        let listed = match self.provider.list_versions(package).await {
            Ok(listed) => listed,
            Err(e) => {
                warn!(tool = %tool.name, package, error = %e, "Could not list versions");
                Vec::new()
            }
        };

        let versions: Vec<Version> = listed
            .iter()
            .filter_map(|raw| {
                let parsed = parse_lenient(raw);
                if parsed.is_none() {
                    trace!(package, version = raw, "Skipping unparsable version");
                }
                parsed
            })
            .filter(|v| at_least(v, tool.min_version.as_ref()))
            .collect();

        let shared = try_join_all(versions.iter().map(|version| {
            let version = version.to_string();
            async move {
                self.provider
                    .shared_dependency_version(package, &version, self.dependency)
                    .await
            }
        }))
        .await?;

        let mut releases: Vec<Release> = versions
            .into_iter()
            .zip(shared)
            .filter_map(|(version, shared)| match shared {
                None => Some(Release {
                    version,
                    shared: None,
                }),
                Some(raw) => match parse_lenient(&raw) {
                    Some(shared) if shared >= *self.floor => Some(Release {
                        version,
                        shared: Some(shared),
                    }),
                    Some(_) => None,
                    None => {
                        warn!(package, %version, shared = raw, "Unparsable shared dependency version");
                        None
                    }
                },
            })
            .collect();
        releases.sort_by(|a, b| b.version.cmp(&a.version));
        releases.dedup_by(|a, b| a.version == b.version);

        debug!(tool = %tool.name, count = releases.len(), "Usable releases");
        Ok(ToolReleases {
            tool: tool.name.clone(),
            releases,
        })
    }

    /// Usable releases of every distinct packaged tool, fetched concurrently.
    ///
    /// # Errors
    ///
    /// See [`releases`](Self::releases).
    pub async fn collect(&self, tools: &[Arc<Tool>]) -> Result<Vec<ToolReleases>> {
        let mut seen = std::collections::HashSet::new();
        let packaged: Vec<&Arc<Tool>> = tools
            .iter()
            .filter(|t| t.package.is_some() && seen.insert(t.name.as_str()))
            .collect();
        join_all(packaged.into_iter().map(|tool| self.releases(tool)))
            .await
            .into_iter()
            .collect()
    }

    /// Negotiate the shared-dependency version over `tools` and pin every
    /// step.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCompatibleVersion`] naming a tool without a usable
    /// release, plus any provider error from [`collect`](Self::collect).
    pub async fn pin(&self, plan: Vec<PlannedStep>) -> Result<Sequence> {
        let tools: Vec<Arc<Tool>> = plan.iter().map(|step| step.tool.clone()).collect();
        let catalog = self.collect(&tools).await?;
        let negotiated = negotiate(&catalog, self.dependency)?;
        if let Some(version) = &negotiated {
            info!(dependency = self.dependency, %version, "Negotiated shared dependency");
        }

        let by_name: HashMap<&str, &ToolReleases> =
            catalog.iter().map(|r| (r.tool.as_str(), r)).collect();
        let steps = plan
            .into_iter()
            .map(|step| {
                let Some(releases) = by_name.get(step.tool.name.as_str()) else {
                    return Ok(ResolvedTool::unpinned(step));
                };
                let release = releases.best(negotiated.as_ref()).ok_or_else(|| {
                    Error::NoCompatibleVersion {
                        tool: step.tool.name.clone(),
                        dependency: self.dependency.to_string(),
                    }
                })?;
                Ok(ResolvedTool {
                    version: Some(release.version.clone()),
                    shared_version: release.shared.clone(),
                    ..ResolvedTool::unpinned(step)
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Sequence::new(steps, negotiated))
    }
}

/// Candidate shared-dependency versions, newest first, without duplicates.
#[must_use]
pub fn candidates(catalog: &[ToolReleases]) -> Vec<Version> {
    let mut all: Vec<Version> = catalog
        .iter()
        .flat_map(|tool| tool.releases.iter().filter_map(|r| r.shared.clone()))
        .collect();
    all.sort_by(|a, b| b.cmp(a));
    all.dedup();
    all
}

/// Pick the newest candidate every tool can satisfy.
///
/// `Ok(None)` means no release declares the shared dependency, so each tool
/// is simply pinned to its newest usable release.
///
/// # Errors
///
/// Returns [`Error::NoCompatibleVersion`] naming the first tool that cannot
/// satisfy even the oldest candidate.
pub fn negotiate(catalog: &[ToolReleases], dependency: &str) -> Result<Option<Version>> {
    let candidates = candidates(catalog);
    let Some(oldest) = candidates.last() else {
        return Ok(None);
    };

    for candidate in &candidates {
        if catalog.iter().all(|tool| tool.best(Some(candidate)).is_some()) {
            return Ok(Some(candidate.clone()));
        }
        trace!(%candidate, "Candidate rejected");
    }

    let blocker = catalog
        .iter()
        .find(|tool| tool.best(Some(oldest)).is_none())
        .map_or_else(String::new, |tool| tool.tool.clone());
    Err(Error::NoCompatibleVersion {
        tool: blocker,
        dependency: dependency.to_string(),
    })
}
