//! Command-line interface definitions for buildmap.
//!
//! Field-level documentation is provided via clap attributes, so missing_docs
//! is allowed for this module.

#![allow(missing_docs)]

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::config::Environment;

/// Main CLI structure for buildmap.
#[derive(Parser)]
#[command(
    name = "buildmap",
    version = crate::VERSION,
    about = "Source/output manifest for incremental builds",
    long_about = "Tracks which authored source produced each build output, and back"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./buildmap.toml)
    #[arg(short, long, global = true, env = "BUILDMAP_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Build output folder
    #[arg(short, long, global = true)]
    pub build_folder: Option<PathBuf>,

    /// Server environment (development, production, test)
    #[arg(short, long, global = true)]
    pub env: Option<Environment>,

    /// Snapshot file name relative to the build folder
    #[arg(short, long, global = true)]
    pub manifest_path: Option<String>,

    /// Show verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// All available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Stream newline-delimited JSON file events from stdin through the manifest stage
    Run {
        /// Do not write manifest snapshots
        #[arg(long)]
        no_manifest_file: bool,
    },

    /// Print the output path produced from a source path
    Resolve {
        /// Path to look up
        path: String,

        /// Treat PATH as an output path and print its source
        #[arg(short, long)]
        reverse: bool,
    },

    /// Print the persisted manifest
    Show {
        /// Print on a single line
        #[arg(long)]
        compact: bool,
    },

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
