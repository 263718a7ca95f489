//! Pipeline stage that keeps the manifest in step with the file-event stream.
//!
//! For every item it receives the stage:
//!
//! 1. Forwards the item downstream, unchanged and before anything else
//! 2. Updates the manifest: `add`/`change` map the file's origin to its
//!    current path, `unlink`/`unlinkDir` remove the origin's mapping
//! 3. Captures a compact snapshot of the manifest and hands it to the
//!    debouncer, replacing any snapshot still waiting
//!
//! Snapshots leave the stage as [`PipelineItem::Manifest`] items once the
//! quiescence window has passed without further events.

use anyhow::{Context, Result, anyhow};
use std::path::PathBuf;
use tokio::fs;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use super::{Debouncer, ItemReceiver, ItemSender, ManifestWrite, PipelineItem, path_key};
use crate::QUIESCENCE_WINDOW;
use crate::config::StageConfig;
use crate::manifest::{Manifest, ManifestError, ManifestLoader, SharedManifest};

/// Handles the stage exposes to collaborators wired up after it
#[derive(Debug, Clone)]
pub struct Ready {
    /// Live manifest, updated as events flow through the stage
    pub manifest: SharedManifest,
}

/// Counters reported when the stage finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStats {
    /// Items passed downstream, excluding snapshots
    pub forwarded: u64,
    /// Snapshot writes emitted
    pub snapshots: u64,
    /// Events whose manifest bookkeeping failed
    pub failed: u64,
}

/// The manifest stage
#[derive(Debug)]
pub struct ManifestStage {
    manifest: SharedManifest,
    write_manifest_file: bool,
    manifest_path: PathBuf,
    debouncer: Debouncer<ManifestWrite>,
    stats: StageStats,
}

/// Build the manifest stage described by `config`
///
/// Outside production, an existing snapshot at
/// `build_folder/manifest_path` seeds the manifest; otherwise it starts empty.
///
/// # Errors
///
/// Returns an error if:
/// - The configuration is invalid
/// - The snapshot's existence cannot be determined
/// - A snapshot exists but cannot be read or parsed
pub async fn create_stage_manifest(config: &StageConfig) -> Result<ManifestStage> {
    config.validate()?;
    let manifest_file = config.manifest_file();

    let manifest = if !config.environment.is_production()
        && fs::try_exists(&manifest_file).await.with_context(|| {
            format!("Failed to check for manifest: {}", manifest_file.display())
        })? {
        let manifest = ManifestLoader::load(&manifest_file)
            .await
            .with_context(|| format!("Failed to load manifest: {}", manifest_file.display()))?;
        info!(
            path = %manifest_file.display(),
            entries = manifest.len(),
            "Loaded existing manifest"
        );
        manifest
    } else {
        debug!(environment = %config.environment, "Starting with an empty manifest");
        Manifest::new()
    };

    Ok(ManifestStage::new(
        manifest,
        config.write_manifest_file,
        &config.manifest_path,
    ))
}

impl ManifestStage {
    /// Create a stage around an existing manifest
    #[must_use]
    pub fn new(
        manifest: Manifest,
        write_manifest_file: bool,
        manifest_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            manifest: SharedManifest::new(manifest),
            write_manifest_file,
            manifest_path: manifest_path.into(),
            debouncer: Debouncer::new(QUIESCENCE_WINDOW),
            stats: StageStats::default(),
        }
    }

    /// Handles for collaborators that need to query the manifest
    #[must_use]
    pub fn ready(&self) -> Ready {
        Ready {
            manifest: self.manifest.clone(),
        }
    }

    /// Counters so far
    #[must_use]
    pub const fn stats(&self) -> StageStats {
        self.stats
    }

    /// Deadline of the snapshot waiting to be emitted, if any
    #[must_use]
    pub fn pending_snapshot_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// Process one item
    ///
    /// The item is pushed to `push` before the manifest is touched, so it is
    /// forwarded even when bookkeeping fails.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The downstream receiver is gone
    /// - A removal names an origin with no mapping ([`ManifestError::NotFound`])
    /// - The origin or current path is not valid UTF-8 ([`ManifestError::InvalidPath`])
    /// - The snapshot cannot be serialized
    pub fn transform(&mut self, item: PipelineItem, push: &ItemSender) -> Result<()> {
        let bookkeeping = match &item {
            PipelineItem::File(file) => {
                Some((file.event, path_key(file.origin()), path_key(&file.path)))
            }
            PipelineItem::Manifest(_) => None,
        };

        push.send(item)
            .map_err(|_| anyhow!("Downstream stage closed"))?;
        self.stats.forwarded += 1;

        let Some((event, origin, dest)) = bookkeeping else {
            return Ok(());
        };

        let origin = origin?;
        debug!(event = %event, origin = %origin, "event");
        if event.is_removal() {
            self.manifest.write().remove_key(&origin)?;
        } else {
            let dest = dest?;
            self.manifest.write().set_entry(origin, dest);
        }

        if self.write_manifest_file {
            let contents = self.manifest.to_json(true)?;
            self.debouncer.schedule(ManifestWrite {
                path: self.manifest_path.clone(),
                contents: contents.into_bytes(),
            });
        }
        Ok(())
    }

    /// Push the pending snapshot downstream if there is one
    ///
    /// # Errors
    ///
    /// Returns an error if the downstream receiver is gone
    pub fn flush(&mut self, push: &ItemSender) -> Result<bool> {
        match self.debouncer.take() {
            Some(write) => self.emit(write, push).map(|()| true),
            None => Ok(false),
        }
    }

    fn emit(&mut self, write: ManifestWrite, push: &ItemSender) -> Result<()> {
        debug!(path = %write.path.display(), bytes = write.contents.len(), "Emitting manifest");
        push.send(write.into())
            .map_err(|_| anyhow!("Downstream stage closed"))?;
        self.stats.snapshots += 1;
        Ok(())
    }

    /// Drive the stage until `input` closes
    ///
    /// A snapshot still pending when the input closes is emitted once its
    /// window elapses. Per-event bookkeeping failures are logged and counted;
    /// they never stop the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the downstream receiver is gone or a snapshot
    /// cannot be serialized
    pub async fn run(mut self, mut input: ItemReceiver, output: ItemSender) -> Result<StageStats> {
        info!(
            write_manifest_file = self.write_manifest_file,
            manifest_path = %self.manifest_path.display(),
            "Manifest stage running"
        );

        loop {
            let deadline = self.debouncer.deadline();
            tokio::select! {
                biased;

                () = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.flush(&output)?;
                }
                item = input.recv() => {
                    let Some(item) = item else {
                        break;
                    };
                    let path = item.path().to_path_buf();
                    if let Err(err) = self.transform(item, &output) {
                        match err.downcast_ref::<ManifestError>() {
                            Some(manifest_err) if manifest_err.is_per_event() => {
                                self.stats.failed += 1;
                                warn!(path = %path.display(), error = %manifest_err, "Manifest update failed");
                            }
                            _ => return Err(err),
                        }
                    }
                }
            }
        }

        if let Some(write) = self.debouncer.settle().await {
            self.emit(write, &output)?;
        }

        info!(
            forwarded = self.stats.forwarded,
            snapshots = self.stats.snapshots,
            failed = self.stats.failed,
            "Manifest stage finished"
        );
        Ok(self.stats)
    }

    /// Run the stage on its own task
    #[must_use]
    pub fn spawn(self, input: ItemReceiver, output: ItemSender) -> JoinHandle<Result<StageStats>> {
        tokio::spawn(self.run(input, output))
    }
}

/// Wait for a spawned stage that stopped accepting input and return why
///
/// Use this when sending into the stage fails, so the stage's own error is
/// reported instead of the closed channel.
pub async fn stop_error(handle: JoinHandle<Result<StageStats>>) -> anyhow::Error {
    match handle.await {
        Ok(Err(err)) => err,
        Ok(Ok(_)) => anyhow!("Manifest stage stopped"),
        Err(join_err) => anyhow::Error::new(join_err).context("Manifest stage panicked"),
    }
}
