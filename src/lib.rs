#![warn(missing_docs)]
#![allow(clippy::arithmetic_side_effects)] // Event counters cannot realistically overflow

//! # Buildmap - Source/Output Manifest for Incremental Builds
//!
//! Buildmap tracks where every file of an incremental, file-watching build
//! came from and where it ended up. As the watcher streams `add`, `change`,
//! `unlink` and `unlinkDir` events through the pipeline, the manifest stage
//! records each file's original location against its current output path,
//! so tooling reading the build output (an error overlay resolving a compiled
//! stack frame, for instance) can translate in either direction.
//!
//! ## Architecture
//!
//! - [`manifest`]: the bidirectional [`manifest::Manifest`], its snapshot
//!   format and the loader
//! - [`pipeline`]: pipeline items, the debouncer, the manifest stage and the
//!   disk sink
//! - [`config`]: `buildmap.toml` parsing
//! - [`cli`]: argument parsing for the `buildmap` binary
//!
//! ## Example Usage
//!
//! ```no_run
//! use buildmap::config::StageConfig;
//! use buildmap::pipeline::{self, FileEvent, FileEventKind, create_stage_manifest};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let stage = create_stage_manifest(&StageConfig::default()).await?;
//! let ready = stage.ready();
//!
//! let (watcher_tx, stage_rx) = pipeline::channel();
//! let (stage_tx, mut sink_rx) = pipeline::channel();
//! let handle = stage.spawn(stage_rx, stage_tx);
//!
//! watcher_tx.send(
//!     FileEvent::new(FileEventKind::Add, "app/pages/index.tsx")
//!         .moved_to("pages/index.js")
//!         .into(),
//! )?;
//! let forwarded = sink_rx.recv().await;
//! assert!(forwarded.is_some());
//! assert_eq!(
//!     ready.manifest.get_by_value("pages/index.js").as_deref(),
//!     Some("app/pages/index.tsx")
//! );
//!
//! drop(watcher_tx);
//! handle.await??;
//! # Ok(())
//! # }
//! ```

/// Command-line interface definitions (argument parsing structures).
pub mod cli;

/// Configuration parsing and validation.
pub mod config;

/// Bidirectional origin/output manifest and its persistence.
pub mod manifest;

/// Pipeline items, the manifest stage and the disk sink.
pub mod pipeline;

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Current version of the buildmap binary.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default snapshot file name, relative to the build folder.
pub const DEFAULT_MANIFEST_PATH: &str = "_manifest.json";

/// Default configuration file path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "buildmap.toml";

/// Quiet period a snapshot must survive before it is written.
pub const QUIESCENCE_WINDOW: Duration = Duration::from_millis(500);

/// Loaded configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct BuildmapContext {
    /// Path to the configuration file.
    pub config_path: PathBuf,

    /// Loaded configuration settings.
    pub config: config::Config,
}

impl BuildmapContext {
    /// Creates a context from `config_path`, or from `BUILDMAP_CONFIG_PATH`,
    /// or from [`DEFAULT_CONFIG_PATH`], in that order.
    ///
    /// # Errors
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn new(config_path: Option<PathBuf>) -> Result<Self> {
        let config_path = config_path
            .or_else(|| std::env::var_os("BUILDMAP_CONFIG_PATH").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let config = config::Config::load(&config_path)?;
        Ok(Self {
            config_path,
            config,
        })
    }

    /// Stage settings from the loaded configuration.
    #[must_use]
    pub const fn stage(&self) -> &config::StageConfig {
        &self.config.stage
    }

    /// Mutable stage settings, for command-line overrides.
    pub const fn stage_mut(&mut self) -> &mut config::StageConfig {
        &mut self.config.stage
    }
}
