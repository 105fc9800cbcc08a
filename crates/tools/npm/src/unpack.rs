//! Tarball extraction and package manifest inspection.

use flate2::read::GzDecoder;
use pipewright_core::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tracing::{debug, trace, warn};

/// The parts of `package.json` needed to find an executable.
#[derive(Debug, Default, Deserialize)]
pub struct Manifest {
    /// Package name.
    #[serde(default)]
    pub name: Option<String>,
    /// Executables, either a single path or a name → path map.
    #[serde(default)]
    pub bin: Option<Bin>,
    /// Entry module, used when no `bin` is declared.
    #[serde(default)]
    pub main: Option<String>,
}

/// The `bin` field of a package manifest.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Bin {
    /// `"bin": "cli.js"`
    Single(String),
    /// `"bin": { "lisgy": "bin/cli.js" }`
    Named(BTreeMap<String, String>),
}

impl Manifest {
    /// Read and parse `<dir>/package.json`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file is missing and a provider error if
    /// it is not valid JSON.
    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join("package.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::io(e, Some(&path), "read package manifest"))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::provider(format!("Invalid {}: {e}", path.display())))
    }

    /// Relative path of the executable.
    ///
    /// A named `bin` map prefers the entry matching the unscoped package
    /// name, then the first entry. Without `bin`, `main` is used, then
    /// `index.js`.
    #[must_use]
    pub fn executable(&self) -> String {
        match &self.bin {
            Some(Bin::Single(path)) => path.clone(),
            Some(Bin::Named(map)) if !map.is_empty() => {
                let short = self
                    .name
                    .as_deref()
                    .map(|name| name.rsplit('/').next().unwrap_or(name));
                short
                    .and_then(|short| map.get(short))
                    .or_else(|| map.values().next())
                    .cloned()
                    .unwrap_or_default()
            }
            _ => self.main.clone().unwrap_or_else(|| "index.js".to_string()),
        }
    }
}

/// Unpack an npm tarball into `dest`, dropping the leading `package/`
/// directory every npm tarball wraps its contents in.
///
/// # Errors
///
/// Returns a provider error for unreadable archives or entries escaping
/// `dest`, and I/O errors while writing.
pub fn unpack_tarball(data: impl Read, dest: &Path) -> Result<usize> {
    let mut archive = Archive::new(GzDecoder::new(data));
    let mut unpacked = 0;

    for entry in archive
        .entries()
        .map_err(|e| Error::provider(format!("Failed to read tarball: {e}")))?
    {
        let mut entry =
            entry.map_err(|e| Error::provider(format!("Failed to read tarball entry: {e}")))?;
        let path = entry
            .path()
            .map_err(|e| Error::provider(format!("Invalid path in tarball: {e}")))?
            .into_owned();

        let kind = entry.header().entry_type();
        if kind.is_symlink() || kind.is_hard_link() {
            warn!(path = %path.display(), "Skipping link entry");
            continue;
        }
        let Some(relative) = strip_first_component(&path) else {
            trace!(path = %path.display(), "Skipping top-level entry");
            continue;
        };
        let target = dest.join(&relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::io(e, Some(parent), "create package directory"))?;
        }
        entry
            .unpack(&target)
            .map_err(|e| Error::io(e, Some(&target), "unpack tarball entry"))?;
        unpacked += 1;
    }

    debug!(entries = unpacked, dest = %dest.display(), "Tarball unpacked");
    Ok(unpacked)
}

/// Drop the first path component, rejecting anything that is not a plain
/// relative path.
fn strip_first_component(path: &Path) -> Option<PathBuf> {
    let mut components = path.components();
    components.next()?;
    let mut relative = PathBuf::new();
    for component in components {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!relative.as_os_str().is_empty()).then_some(relative)
}
