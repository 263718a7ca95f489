//! Reading and writing persisted manifest snapshots.

use super::{Manifest, ManifestError, Snapshot};
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Loads and saves [`Snapshot`] files
pub struct ManifestLoader;

impl ManifestLoader {
    /// Load a manifest from a snapshot file
    ///
    /// Existence is not checked here: a missing file is an I/O error. Callers
    /// that want "missing" to mean "no prior manifest" check first.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read ([`ManifestError::Io`])
    /// - The contents are not a `{keys, values}` JSON object ([`ManifestError::Parse`])
    pub async fn load(path: &Path) -> Result<Manifest, ManifestError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|source| ManifestError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let snapshot = serde_json::from_str::<Snapshot>(&content).map_err(|source| {
            ManifestError::Parse {
                path: Some(path.to_path_buf()),
                source,
            }
        })?;

        debug!(path = %path.display(), entries = snapshot.keys.len(), "Loaded manifest");
        Ok(Manifest::create(Some(snapshot)))
    }

    /// Parse snapshot text into a manifest
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Parse`] if the text is not a valid snapshot
    pub fn parse(content: &str) -> Result<Manifest, ManifestError> {
        serde_json::from_str::<Snapshot>(content)
            .map(|snapshot| Manifest::create(Some(snapshot)))
            .map_err(|source| ManifestError::Parse { path: None, source })
    }

    /// Write a manifest snapshot to `path`, creating parent directories
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The parent directory cannot be created
    /// - The file cannot be written
    pub async fn save(path: &Path, manifest: &Manifest, compact: bool) -> anyhow::Result<()> {
        let content = manifest.to_json(compact)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| ManifestError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        fs::write(path, content)
            .await
            .map_err(|source| ManifestError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(())
    }
}
