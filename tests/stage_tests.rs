mod common;

use anyhow::Result;
use buildmap::config::Environment;
use buildmap::manifest::{Manifest, ManifestLoader};
use buildmap::pipeline::{
    self, DiskSink, FileEvent, FileEventKind, PipelineItem, create_stage_manifest,
};
use common::{TestBuild, compiled, drain_now, snapshots};
use std::path::Path;
use std::time::Duration;
use tokio::time;

#[tokio::test(start_paused = true)]
async fn test_burst_produces_single_snapshot_of_last_state() -> Result<()> {
    let build = TestBuild::new()?;
    let stage = create_stage_manifest(&build.config).await?;
    let ready = stage.ready();

    let (tx, stage_rx) = pipeline::channel();
    let (stage_tx, mut out) = pipeline::channel();
    let handle = stage.spawn(stage_rx, stage_tx);

    tx.send(compiled(FileEventKind::Add, "app/a.tsx", "pages/a.js"))?;
    time::sleep(Duration::from_millis(100)).await;
    tx.send(compiled(FileEventKind::Add, "app/b.tsx", "pages/b.js"))?;
    time::sleep(Duration::from_millis(100)).await;
    tx.send(compiled(FileEventKind::Change, "app/a.tsx", "pages/a.js"))?;
    time::sleep(Duration::from_millis(100)).await;

    // Every event is forwarded straight away; the snapshot is still waiting
    let items = drain_now(&mut out);
    assert_eq!(items.len(), 3);
    assert!(snapshots(&items).is_empty());

    time::sleep(Duration::from_millis(500)).await;
    let items = drain_now(&mut out);
    assert_eq!(items.len(), 1);
    let snaps = snapshots(&items);
    assert_eq!(snaps.len(), 1);
    assert_eq!(snaps[0].to_snapshot(), ready.manifest.snapshot());
    assert_eq!(snaps[0].len(), 2);

    drop(tx);
    let stats = handle.await??;
    assert_eq!(stats.forwarded, 3);
    assert_eq!(stats.snapshots, 1);
    assert_eq!(stats.failed, 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_single_event_snapshot_waits_for_window() -> Result<()> {
    let build = TestBuild::new()?;
    let stage = create_stage_manifest(&build.config).await?;

    let (tx, stage_rx) = pipeline::channel();
    let (stage_tx, mut out) = pipeline::channel();
    let _handle = stage.spawn(stage_rx, stage_tx);

    tx.send(compiled(FileEventKind::Add, "app/index.tsx", "pages/index.js"))?;
    time::sleep(Duration::from_millis(499)).await;
    let items = drain_now(&mut out);
    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], PipelineItem::File(_)));

    time::sleep(Duration::from_millis(2)).await;
    let items = drain_now(&mut out);
    assert_eq!(items.len(), 1);
    let PipelineItem::Manifest(write) = &items[0] else {
        panic!("expected a manifest write, got {:?}", items[0]);
    };
    assert_eq!(write.path, Path::new(&build.config.manifest_path));
    assert_eq!(
        std::str::from_utf8(&write.contents)?,
        r#"{"keys":{"app/index.tsx":"pages/index.js"},"values":{"pages/index.js":"app/index.tsx"}}"#
    );

    // Silence produces nothing further
    time::sleep(Duration::from_secs(5)).await;
    assert!(drain_now(&mut out).is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_missing_key_does_not_stop_stream() -> Result<()> {
    let build = TestBuild::new()?;
    let stage = create_stage_manifest(&build.config).await?;
    let ready = stage.ready();

    let (tx, stage_rx) = pipeline::channel();
    let (stage_tx, mut out) = pipeline::channel();
    let handle = stage.spawn(stage_rx, stage_tx);

    let unknown = FileEvent::new(FileEventKind::Unlink, "app/unknown.tsx");
    tx.send(unknown.clone().into())?;
    tx.send(compiled(FileEventKind::Add, "app/a.tsx", "pages/a.js"))?;
    drop(tx);

    let stats = handle.await??;
    assert_eq!(stats.forwarded, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.snapshots, 1);

    let items = drain_now(&mut out);
    assert_eq!(items[0], PipelineItem::File(unknown));
    assert_eq!(
        ready.manifest.get_by_key("app/a.tsx").as_deref(),
        Some("pages/a.js")
    );
    assert_eq!(ready.manifest.events(), vec!["set:pages/a.js".to_string()]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unlink_removes_mapping() -> Result<()> {
    let build = TestBuild::new()?;
    let stage = create_stage_manifest(&build.config).await?;
    let ready = stage.ready();

    let (tx, stage_rx) = pipeline::channel();
    let (stage_tx, mut out) = pipeline::channel();
    let handle = stage.spawn(stage_rx, stage_tx);

    tx.send(compiled(FileEventKind::Add, "app/a.tsx", "pages/a.js"))?;
    tx.send(compiled(FileEventKind::Unlink, "app/a.tsx", "pages/a.js"))?;
    drop(tx);
    handle.await??;

    assert_eq!(ready.manifest.get_by_key("app/a.tsx"), None);
    assert_eq!(ready.manifest.get_by_value("pages/a.js"), None);
    assert_eq!(
        ready.manifest.events(),
        vec!["set:pages/a.js".to_string(), "del:app/a.tsx".to_string()]
    );

    let snaps = snapshots(&drain_now(&mut out));
    assert_eq!(snaps.len(), 1);
    assert!(snaps[0].is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_disabled_manifest_file_emits_no_snapshots() -> Result<()> {
    let mut build = TestBuild::new()?;
    build.config.write_manifest_file = false;
    let stage = create_stage_manifest(&build.config).await?;

    let (tx, stage_rx) = pipeline::channel();
    let (stage_tx, mut out) = pipeline::channel();
    let handle = stage.spawn(stage_rx, stage_tx);

    tx.send(compiled(FileEventKind::Add, "app/a.tsx", "pages/a.js"))?;
    time::sleep(Duration::from_secs(2)).await;
    drop(tx);

    let stats = handle.await??;
    assert_eq!(stats.snapshots, 0);
    assert_eq!(drain_now(&mut out).len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_loads_existing_manifest_in_development() -> Result<()> {
    let build = TestBuild::new()?;
    let mut previous = Manifest::new();
    previous.set_entry("app/pages/index.tsx", "pages/index.js");
    build.persist(&previous).await?;

    let stage = create_stage_manifest(&build.config).await?;
    let manifest = stage.ready().manifest;

    assert_eq!(
        manifest.get_by_value("pages/index.js").as_deref(),
        Some("app/pages/index.tsx")
    );
    assert!(manifest.events().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_production_ignores_existing_manifest() -> Result<()> {
    let mut build = TestBuild::new()?;
    let mut previous = Manifest::new();
    previous.set_entry("app/pages/index.tsx", "pages/index.js");
    build.persist(&previous).await?;
    build.config.environment = Environment::Production;

    let stage = create_stage_manifest(&build.config).await?;
    assert!(stage.ready().manifest.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_corrupt_manifest_fails_startup() -> Result<()> {
    let build = TestBuild::new()?;
    std::fs::write(build.config.manifest_file(), "{\"keys\": [")?;

    let err = create_stage_manifest(&build.config).await.unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse manifest"));
    Ok(())
}

#[tokio::test]
async fn test_custom_manifest_path() -> Result<()> {
    let mut build = TestBuild::new()?;
    build.config.manifest_path = "meta/routes.json".to_string();
    let mut previous = Manifest::new();
    previous.set_entry("app/a.tsx", "pages/a.js");
    build.persist(&previous).await?;

    let stage = create_stage_manifest(&build.config).await?;
    assert_eq!(
        stage.ready().manifest.get_by_key("app/a.tsx").as_deref(),
        Some("pages/a.js")
    );
    Ok(())
}

#[tokio::test]
async fn test_pipeline_writes_manifest_to_build_folder() -> Result<()> {
    let build = TestBuild::new()?;
    let stage = create_stage_manifest(&build.config).await?;

    let (tx, stage_rx) = pipeline::channel();
    let (stage_tx, sink_rx) = pipeline::channel();
    let stage_handle = stage.spawn(stage_rx, stage_tx);
    let sink = DiskSink::new(&build.config.build_folder);
    let sink_handle = tokio::spawn(async move { sink.drain(sink_rx).await });

    tx.send(compiled(FileEventKind::Add, "app/pages/index.tsx", "pages/index.js"))?;
    tx.send(compiled(FileEventKind::Add, "app/pages/about.tsx", "pages/about.js"))?;
    drop(tx);

    let stage_stats = stage_handle.await??;
    let sink_stats = sink_handle.await?;
    assert_eq!(stage_stats.forwarded, 2);
    assert_eq!(sink_stats.written, 2);
    assert_eq!(sink_stats.manifests, 1);

    let written = std::fs::read_to_string(build.config.build_folder.join("pages/index.js"))?;
    assert_eq!(written, "// app/pages/index.tsx");

    // Compact snapshot on disk, and the next session picks it up
    let raw = std::fs::read_to_string(build.config.manifest_file())?;
    assert!(!raw.contains('\n'));
    let reloaded = ManifestLoader::load(&build.config.manifest_file()).await?;
    assert_eq!(reloaded.get_by_key("app/pages/about.tsx"), Some("pages/about.js"));

    let next = create_stage_manifest(&build.config).await?;
    assert_eq!(next.ready().manifest.len(), 2);
    Ok(())
}
