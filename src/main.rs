use anyhow::{Context, Result, anyhow};
use buildmap::cli::{Cli, Commands};
use buildmap::config::StageConfig;
use buildmap::manifest::ManifestLoader;
use buildmap::pipeline::{self, DiskSink, FileEvent, FileEventKind, create_stage_manifest};
use buildmap::BuildmapContext;
use clap::{CommandFactory, Parser};
use clap_complete::{Generator, generate};
use colored::Colorize;
use serde::Deserialize;
use std::io;
use std::path::PathBuf;
use std::process;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// One line of `buildmap run` input
#[derive(Deserialize)]
struct WatchRecord {
    event: FileEventKind,
    path: PathBuf,
    #[serde(default)]
    history: Vec<PathBuf>,
    #[serde(default)]
    contents: Option<String>,
}

impl From<WatchRecord> for FileEvent {
    fn from(record: WatchRecord) -> Self {
        Self {
            event: record.event,
            path: record.path,
            history: record.history,
            contents: record.contents.map(String::into_bytes).unwrap_or_default(),
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Commands::Completion { shell } = cli.command {
        print_completions(shell, &mut Cli::command());
        return Ok(());
    }

    let mut ctx = BuildmapContext::new(cli.config)?;
    let stage = ctx.stage_mut();
    if let Some(build_folder) = cli.build_folder {
        stage.build_folder = build_folder;
    }
    if let Some(environment) = cli.env {
        stage.environment = environment;
    }
    if let Some(manifest_path) = cli.manifest_path {
        stage.manifest_path = manifest_path;
    }
    stage.validate()?;

    match cli.command {
        Commands::Run { no_manifest_file } => {
            if no_manifest_file {
                ctx.stage_mut().write_manifest_file = false;
            }
            run_pipeline(ctx.stage()).await?;
        }
        Commands::Resolve { path, reverse } => {
            let manifest = ManifestLoader::load(&existing_manifest(ctx.stage())?).await?;
            let resolved = if reverse {
                manifest.get_by_value(&path)
            } else {
                manifest.get_by_key(&path)
            };
            let resolved = resolved.ok_or_else(|| anyhow!("No manifest entry for {path}"))?;
            println!("{resolved}");
        }
        Commands::Show { compact } => {
            let manifest = ManifestLoader::load(&existing_manifest(ctx.stage())?).await?;
            println!("{}", manifest.to_json(compact)?);
        }
        Commands::Completion { .. } => {}
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn existing_manifest(stage: &StageConfig) -> Result<PathBuf> {
    let path = stage.manifest_file();
    if !path.exists() {
        anyhow::bail!("No manifest found at {}", path.display());
    }
    Ok(path)
}

async fn run_pipeline(stage_config: &StageConfig) -> Result<()> {
    let stage = create_stage_manifest(stage_config).await?;

    let (watcher_tx, stage_rx) = pipeline::channel();
    let (stage_tx, sink_rx) = pipeline::channel();
    let stage_handle = stage.spawn(stage_rx, stage_tx);

    let sink = DiskSink::new(&stage_config.build_folder);
    let sink_handle = tokio::spawn(async move { sink.drain(sink_rx).await });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let record: WatchRecord = serde_json::from_str(&line)
            .with_context(|| format!("Invalid file event on line {line_no}"))?;
        if watcher_tx.send(FileEvent::from(record).into()).is_err() {
            return Err(pipeline::stop_error(stage_handle).await);
        }
    }
    drop(watcher_tx);

    let stage_stats = stage_handle.await.context("Manifest stage panicked")??;
    let sink_stats = sink_handle.await.context("Sink panicked")?;

    eprintln!(
        "{}",
        format!(
            "Forwarded {} events ({} written, {} removed), wrote {} manifest snapshot(s)",
            stage_stats.forwarded,
            sink_stats.written,
            sink_stats.removed,
            sink_stats.manifests
        )
        .green()
    );
    if stage_stats.failed > 0 {
        eprintln!(
            "{}",
            format!("{} event(s) could not be recorded in the manifest", stage_stats.failed)
                .yellow()
                .bold()
        );
    }
    Ok(())
}

fn print_completions<G: Generator>(g: G, cmd: &mut clap::Command) {
    generate(g, cmd, cmd.get_name().to_string(), &mut io::stdout());
}
