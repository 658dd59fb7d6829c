//! Plugin manifests.
//!
//! A plugin ships as a cdylib next to a small TOML manifest:
//!
//! ```toml
//! name = "greeter"
//! version = "0.3.0"
//! library = "libgreeter_plugin.so"
//! ```
//!
//! The library path is resolved relative to the manifest file.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::HostError;

#[derive(Debug, Clone, Deserialize)]
pub struct PluginManifest {
    /// Stable plugin identifier; duplicate names refuse to load.
    pub name: String,
    pub version: String,
    /// Library filename, relative to the manifest.
    pub library: PathBuf,
    /// Manifests can be parked without deleting them.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl PluginManifest {
    pub fn load(path: &Path) -> Result<Self, HostError> {
        let text = std::fs::read_to_string(path)?;
        let manifest: PluginManifest =
            toml::from_str(&text).map_err(|e| HostError::Manifest {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        if manifest.name.trim().is_empty() {
            return Err(HostError::Manifest {
                path: path.to_path_buf(),
                reason: "plugin name must not be blank".to_string(),
            });
        }
        Ok(manifest)
    }

    /// Absolute library path, resolved against the manifest location.
    pub fn library_path(&self, manifest_path: &Path) -> PathBuf {
        if self.library.is_absolute() {
            self.library.clone()
        } else {
            manifest_path
                .parent()
                .map(|dir| dir.join(&self.library))
                .unwrap_or_else(|| self.library.clone())
        }
    }
}

/// Scans `dir` for `*.toml` manifests, sorted by filename for a
/// deterministic load order.
pub fn discover_manifests(dir: &Path) -> Result<Vec<(PathBuf, PluginManifest)>, HostError> {
    if !dir.exists() {
        debug!("plugin directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().map_or(false, |ext| ext == "toml"))
        .collect();
    paths.sort();

    let mut manifests = Vec::new();
    for path in paths {
        let manifest = PluginManifest::load(&path)?;
        if !manifest.enabled {
            debug!("skipping disabled plugin manifest {}", path.display());
            continue;
        }
        manifests.push((path, manifest));
    }
    Ok(manifests)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifests_are_discovered_in_filename_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("20-second.toml"),
            "name = \"second\"\nversion = \"1.0.0\"\nlibrary = \"libsecond.so\"\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("10-first.toml"),
            "name = \"first\"\nversion = \"1.0.0\"\nlibrary = \"libfirst.so\"\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("30-parked.toml"),
            "name = \"parked\"\nversion = \"1.0.0\"\nlibrary = \"libparked.so\"\nenabled = false\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a manifest").unwrap();

        let manifests = discover_manifests(dir.path()).unwrap();
        let names: Vec<&str> = manifests
            .iter()
            .map(|(_, manifest)| manifest.name.as_str())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn library_path_resolves_relative_to_the_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("greeter.toml");
        std::fs::write(
            &manifest_path,
            "name = \"greeter\"\nversion = \"0.3.0\"\nlibrary = \"libgreeter_plugin.so\"\n",
        )
        .unwrap();

        let manifest = PluginManifest::load(&manifest_path).unwrap();
        assert_eq!(
            manifest.library_path(&manifest_path),
            dir.path().join("libgreeter_plugin.so")
        );
    }

    #[test]
    fn blank_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "name = \"  \"\nversion = \"1.0.0\"\nlibrary = \"x.so\"\n").unwrap();

        assert!(matches!(
            PluginManifest::load(&path),
            Err(HostError::Manifest { .. })
        ));
    }
}
