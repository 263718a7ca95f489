//! File-event pipeline plumbing around the manifest.
//!
//! Items flow watcher -> [`stage::ManifestStage`] -> [`sink::DiskSink`] over
//! unbounded `tokio` channels. The stage forwards every item it receives and
//! occasionally injects a [`ManifestWrite`] carrying a manifest snapshot.

pub mod debounce;
pub mod sink;
pub mod stage;

pub use debounce::Debouncer;
pub use sink::{DiskSink, SinkStats};
pub use stage::{ManifestStage, Ready, StageStats, create_stage_manifest, stop_error};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use crate::manifest::ManifestError;

/// Sending half of a pipeline channel
pub type ItemSender = mpsc::UnboundedSender<PipelineItem>;

/// Receiving half of a pipeline channel
pub type ItemReceiver = mpsc::UnboundedReceiver<PipelineItem>;

/// Create a pipeline channel
#[must_use]
pub fn channel() -> (ItemSender, ItemReceiver) {
    mpsc::unbounded_channel()
}

/// Kind of change reported by the watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileEventKind {
    /// File appeared
    Add,
    /// File contents changed
    Change,
    /// File was deleted
    Unlink,
    /// Directory was deleted
    UnlinkDir,
}

impl FileEventKind {
    /// Whether this event removes a mapping
    #[must_use]
    pub const fn is_removal(self) -> bool {
        matches!(self, Self::Unlink | Self::UnlinkDir)
    }

    /// Name as reported by the watcher
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Change => "change",
            Self::Unlink => "unlink",
            Self::UnlinkDir => "unlinkDir",
        }
    }
}

impl fmt::Display for FileEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file moving through the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvent {
    /// What happened to the file
    pub event: FileEventKind,
    /// Current (destination) location
    pub path: PathBuf,
    /// Prior locations, earliest first; `history[0]` is the authored source
    #[serde(default)]
    pub history: Vec<PathBuf>,
    /// File payload, opaque to the manifest
    #[serde(default)]
    pub contents: Vec<u8>,
}

impl FileEvent {
    /// Create an event for a file that has not been moved yet
    #[must_use]
    pub fn new(event: FileEventKind, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            event,
            history: vec![path.clone()],
            path,
            contents: Vec::new(),
        }
    }

    /// Record a move to `path`, keeping the previous location in the history
    #[must_use]
    pub fn moved_to(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if self.history.last() != Some(&path) {
            self.history.push(path.clone());
        }
        self.path = path;
        self
    }

    /// Attach a payload
    #[must_use]
    pub fn with_contents(mut self, contents: impl Into<Vec<u8>>) -> Self {
        self.contents = contents.into();
        self
    }

    /// Original location before any upstream transform
    ///
    /// Falls back to the current path when no history was recorded.
    #[must_use]
    pub fn origin(&self) -> &Path {
        self.history.first().unwrap_or(&self.path)
    }
}

/// Synthetic item carrying a manifest snapshot to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestWrite {
    /// Location relative to the build folder
    pub path: PathBuf,
    /// Serialized snapshot
    pub contents: Vec<u8>,
}

/// Anything that travels between pipeline stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineItem {
    /// A watched file
    File(FileEvent),
    /// A manifest snapshot emitted by the manifest stage
    Manifest(ManifestWrite),
}

impl PipelineItem {
    /// Current location of the item
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::File(file) => &file.path,
            Self::Manifest(write) => &write.path,
        }
    }
}

impl From<FileEvent> for PipelineItem {
    fn from(file: FileEvent) -> Self {
        Self::File(file)
    }
}

impl From<ManifestWrite> for PipelineItem {
    fn from(write: ManifestWrite) -> Self {
        Self::Manifest(write)
    }
}

/// Manifest key for a path
///
/// Keys must round-trip through the JSON snapshot, so paths that are not
/// valid UTF-8 are rejected instead of being lossily converted.
pub(crate) fn path_key(path: &Path) -> Result<String, ManifestError> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| ManifestError::InvalidPath {
            path: path.to_path_buf(),
        })
}
