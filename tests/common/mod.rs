#![allow(dead_code)]

use anyhow::Result;
use buildmap::config::{Environment, StageConfig};
use buildmap::manifest::{Manifest, ManifestLoader};
use buildmap::pipeline::{FileEvent, FileEventKind, ItemReceiver, PipelineItem};
use std::path::Path;
use tempfile::TempDir;

/// Build folder fixture for consistent stage setup
pub struct TestBuild {
    pub temp_dir: TempDir,
    pub config: StageConfig,
}

impl TestBuild {
    /// Create an empty build folder with development settings
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let config = StageConfig {
            build_folder: temp_dir.path().join("build"),
            environment: Environment::Development,
            ..StageConfig::default()
        };
        std::fs::create_dir_all(&config.build_folder)?;
        Ok(Self { temp_dir, config })
    }

    /// Persist `manifest` where the stage will look for it
    pub async fn persist(&self, manifest: &Manifest) -> Result<()> {
        ManifestLoader::save(&self.config.manifest_file(), manifest, false).await
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }
}

/// Source file compiled to `dest`
pub fn compiled(event: FileEventKind, origin: &str, dest: &str) -> PipelineItem {
    FileEvent::new(event, origin)
        .moved_to(dest)
        .with_contents(format!("// {origin}"))
        .into()
}

/// Everything currently sitting in `rx`
pub fn drain_now(rx: &mut ItemReceiver) -> Vec<PipelineItem> {
    let mut items = Vec::new();
    while let Ok(item) = rx.try_recv() {
        items.push(item);
    }
    items
}

/// Snapshot payloads among `items`, decoded
pub fn snapshots(items: &[PipelineItem]) -> Vec<Manifest> {
    items
        .iter()
        .filter_map(|item| match item {
            PipelineItem::Manifest(write) => std::str::from_utf8(&write.contents)
                .ok()
                .and_then(|text| ManifestLoader::parse(text).ok()),
            PipelineItem::File(_) => None,
        })
        .collect()
}
