//! Terminal pipeline stage that applies items to the build folder.

use anyhow::{Context, Result};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use super::{FileEventKind, ItemReceiver, PipelineItem};

/// Writes pipeline items under a root directory
#[derive(Debug, Clone)]
pub struct DiskSink {
    root: PathBuf,
}

/// Counters reported when the sink drains
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Files written or rewritten
    pub written: u64,
    /// Files and directories removed
    pub removed: u64,
    /// Manifest snapshots written
    pub manifests: u64,
}

impl DiskSink {
    /// Create a sink rooted at `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Apply one item
    ///
    /// Removing something that is already gone is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if a write or removal fails
    pub async fn write(&self, item: &PipelineItem, stats: &mut SinkStats) -> Result<()> {
        match item {
            PipelineItem::File(file) => {
                let target = self.root.join(&file.path);
                match file.event {
                    FileEventKind::Add | FileEventKind::Change => {
                        write_file(&target, &file.contents).await?;
                        stats.written += 1;
                    }
                    FileEventKind::Unlink => {
                        if ignore_missing(fs::remove_file(&target).await)
                            .with_context(|| format!("Failed to remove {}", target.display()))?
                        {
                            stats.removed += 1;
                        }
                    }
                    FileEventKind::UnlinkDir => {
                        if ignore_missing(fs::remove_dir_all(&target).await).with_context(|| {
                            format!("Failed to remove directory {}", target.display())
                        })? {
                            stats.removed += 1;
                        }
                    }
                }
            }
            PipelineItem::Manifest(write) => {
                let target = self.root.join(&write.path);
                write_file(&target, &write.contents).await?;
                stats.manifests += 1;
            }
        }
        Ok(())
    }

    /// Apply every item from `input` until it closes
    ///
    /// A failing item is logged and skipped.
    pub async fn drain(&self, mut input: ItemReceiver) -> SinkStats {
        let mut stats = SinkStats::default();
        while let Some(item) = input.recv().await {
            if let Err(e) = self.write(&item, &mut stats).await {
                warn!(path = %item.path().display(), error = %format!("{e:#}"), "Sink write failed");
            }
        }
        debug!(?stats, "Sink drained");
        stats
    }
}

async fn write_file(target: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    fs::write(target, contents)
        .await
        .with_context(|| format!("Failed to write {}", target.display()))
}

/// `Ok(true)` if something was removed, `Ok(false)` if it was already gone
fn ignore_missing(result: io::Result<()>) -> io::Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
