//! Discovery of installed component packages.
//!
//! A component package is any directory containing a `component.json`
//! manifest that names the component and declares its asset root:
//!
//! ```json
//! { "name": "gauge", "assets": "dist" }
//! ```
//!
//! Discovery is read-only; nothing is persisted. The registry is rebuilt
//! from manifests and registration calls on every process start.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use walkdir::WalkDir;

/// Manifest file searched for in each component directory.
pub const MANIFEST_FILE: &str = "component.json";

#[derive(Debug, Deserialize)]
struct Manifest {
    name: String,
    #[serde(default = "default_assets_dir")]
    assets: String,
}

fn default_assets_dir() -> String {
    ".".to_string()
}

/// A component found on disk: its name and canonical asset root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredComponent {
    pub name: String,
    pub root: PathBuf,
}

/// Scan the given directories for component manifests.
///
/// Walks two levels deep (a directory of packages, each with a manifest at
/// its top level). Manifests that cannot be read, declare a missing asset
/// directory, have an empty name, or repeat a name already seen are skipped
/// with a warning.
pub fn discover_components(dirs: &[PathBuf]) -> Vec<DiscoveredComponent> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut found = Vec::new();

    for dir in dirs {
        if !dir.is_dir() {
            tracing::warn!(
                "[discovery] component directory {} does not exist, skipping",
                dir.display()
            );
            continue;
        }

        for entry in WalkDir::new(dir)
            .max_depth(2)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.file_type().is_file() && entry.file_name() == MANIFEST_FILE {
                match read_manifest(entry.path()) {
                    Ok(component) => {
                        if seen.insert(component.name.clone()) {
                            crate::debug_event!(
                                "discovery",
                                "found",
                                "{} at {}",
                                component.name,
                                component.root.display()
                            );
                            found.push(component);
                        } else {
                            tracing::warn!(
                                "[discovery] duplicate component '{}' at {}, keeping the first",
                                component.name,
                                entry.path().display()
                            );
                        }
                    }
                    Err(reason) => {
                        tracing::warn!(
                            "[discovery] skipping {}: {reason}",
                            entry.path().display()
                        );
                    }
                }
            }
        }
    }

    found
}

fn read_manifest(path: &Path) -> Result<DiscoveredComponent, String> {
    let contents = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let manifest: Manifest = serde_json::from_str(&contents).map_err(|e| e.to_string())?;

    if manifest.name.trim().is_empty() {
        return Err("manifest has an empty component name".to_string());
    }

    let package_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let root = package_dir
        .join(&manifest.assets)
        .canonicalize()
        .map_err(|e| format!("asset directory '{}' is not usable: {e}", manifest.assets))?;

    if !root.is_dir() {
        return Err(format!("asset path '{}' is not a directory", manifest.assets));
    }

    Ok(DiscoveredComponent {
        name: manifest.name,
        root,
    })
}
