//! Version parsing helpers.
//!
//! Registries report versions as loose strings: dependency declarations
//! often carry a range prefix (`^0.4.0`, `~1.2.3`) and some tags carry a
//! leading `v`. Everything past this module works with [`semver::Version`].

use crate::{Error, Result};
use semver::Version;

/// Parse a strict semantic version.
///
/// # Errors
///
/// Returns [`Error::InvalidVersion`] if `value` is not a valid version.
pub fn parse(value: &str) -> Result<Version> {
    Version::parse(value.trim()).map_err(|e| Error::InvalidVersion {
        value: value.to_string(),
        message: e.to_string(),
    })
}

/// Strip a leading `^`, `~`, `=` or `v` range marker.
#[must_use]
pub fn strip_range(value: &str) -> &str {
    value
        .trim()
        .trim_start_matches(['^', '~', '='])
        .trim_start_matches('v')
}

/// Parse a version after removing range markers, or `None` if it still
/// does not parse.
#[must_use]
pub fn parse_lenient(value: &str) -> Option<Version> {
    Version::parse(strip_range(value)).ok()
}

/// Whether `version` is at least `minimum`. An absent bound is always met.
#[must_use]
pub fn at_least(version: &Version, minimum: Option<&Version>) -> bool {
    minimum.is_none_or(|min| version >= min)
}
