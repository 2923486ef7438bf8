//! One complete exporter run, from database connection to final progress.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::control::RunControl;
use crate::db::{self, AlbumAssetRow};
use crate::progress::{FileProgressStore, ProgressPublisher, ProgressStore, RunProgress, Status};
use crate::sensor::create_sink;
use crate::sync::{SyncEngine, SyncOptions};

/// Run the export and return the final progress.
///
/// Failures never escape: they are recorded in the progress file with
/// `status=failed` and relayed like any other state.
pub fn run_export(config: &Config, control: &RunControl) -> RunProgress {
    let store: Arc<dyn ProgressStore> = Arc::new(FileProgressStore::new(config.progress_path()));
    let sink = create_sink(&config.sensor);
    info!("Sensor sink: {}", sink.sink_name());

    let mut publisher = ProgressPublisher::new(
        store,
        sink,
        Duration::from_secs(config.sensor.push_interval_secs),
    );

    let mut progress = RunProgress::starting();
    publisher.publish(&mut progress);

    if let Err(e) = export_albums(config, control, &mut publisher, &mut progress) {
        record_failure(&mut progress, &e);
        publisher.publish(&mut progress);
    }

    progress
}

fn export_albums(
    config: &Config,
    control: &RunControl,
    publisher: &mut ProgressPublisher,
    progress: &mut RunProgress,
) -> Result<()> {
    if config.copy.parallel_copies > 1 {
        info!(
            "parallel_copies={} requested; copies run one at a time",
            config.copy.parallel_copies
        );
    }

    let mut client = db::connect(&config.database)?;
    let schema = db::resolve_schema(&mut client).context("Schema resolution failed")?;

    info!("Fetching albums and assets...");
    let rows = db::fetch_album_assets(&mut client, &schema, config.database.user_id.as_deref())?;
    let albums: HashSet<&str> = rows.iter().map(|r| r.album_id.as_str()).collect();
    info!("Found {} assets in {} albums", rows.len(), albums.len());

    sync_rows(config, control, publisher, &rows, progress)?;

    if let Err(e) = client.close() {
        warn!("Failed to close database connection: {}", e);
    }
    info!("Export completed successfully");
    Ok(())
}

/// Mirror `rows` into the export directory. An empty row set completes without pruning.
pub fn sync_rows(
    config: &Config,
    control: &RunControl,
    publisher: &mut ProgressPublisher,
    rows: &[AlbumAssetRow],
    progress: &mut RunProgress,
) -> Result<()> {
    if rows.is_empty() {
        info!("No assets found to export");
        progress.status = Status::Complete;
        publisher.publish(progress);
        return Ok(());
    }

    let outcome = SyncEngine::new(SyncOptions::from_config(config), publisher, control)
        .run(rows, progress)?;

    info!(
        "Run finished: copied={} skipped={} failed={} deleted={} (found {} of {})",
        progress.copied,
        progress.skipped,
        progress.failed,
        progress.deleted,
        outcome.found_on_disk,
        progress.total
    );
    if outcome.interrupted {
        info!("Run was interrupted after {} rows", outcome.processed);
    }
    Ok(())
}

/// Mark `progress` failed with a labelled message and the full error chain.
pub fn record_failure(progress: &mut RunProgress, err: &anyhow::Error) {
    let label = failure_label(err);
    error!("{}: {:#}", label, err);

    progress.status = Status::Failed;
    progress.error = Some(format!("{}: {:#}", label, err));
    progress.traceback = Some(format!("{:?}", err));
    progress.current_album = None;
    progress.current_file = None;
    progress.paused = false;
    progress.can_pause = false;
    progress.can_resume = false;
}

fn failure_label(err: &anyhow::Error) -> &'static str {
    if err.chain().any(|cause| cause.is::<postgres::Error>()) {
        "Database error"
    } else {
        "Unexpected error"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::MemoryProgressStore;
    use crate::sensor::NullSink;
    use anyhow::anyhow;
    use std::fs;
    use tempfile::tempdir;

    fn test_config(export: &std::path::Path, assets: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.export.dir = export.to_path_buf();
        config.assets.root = Some(assets.to_path_buf());
        config
    }

    fn memory_publisher() -> ProgressPublisher {
        ProgressPublisher::new(
            Arc::new(MemoryProgressStore::new()),
            Box::new(NullSink),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_record_failure_unexpected() {
        let mut progress = RunProgress::starting();
        progress.current_file = Some("x.jpg".to_string());
        let err = anyhow!("disk on fire").context("Copy stage");

        record_failure(&mut progress, &err);

        assert_eq!(progress.status, Status::Failed);
        assert_eq!(
            progress.error.as_deref(),
            Some("Unexpected error: Copy stage: disk on fire")
        );
        assert!(progress.traceback.as_deref().unwrap().contains("disk on fire"));
        assert_eq!(progress.current_file, None);
    }

    #[test]
    fn test_unreachable_database_is_recorded_as_database_error() {
        let export = tempdir().unwrap();
        let assets = tempdir().unwrap();
        let mut config = test_config(export.path(), assets.path());
        config.database.host = "127.0.0.1".to_string();
        config.database.port = 1;
        config.database.connect_retries = 1;
        config.database.connect_timeout_secs = 2;

        let progress = run_export(&config, &RunControl::new());

        assert_eq!(progress.status, Status::Failed);
        assert!(progress.error.as_deref().unwrap().starts_with("Database error: "));

        let on_disk = FileProgressStore::new(config.progress_path()).load().unwrap();
        assert_eq!(on_disk.status, Status::Failed);
    }

    #[test]
    fn test_empty_row_set_completes_without_pruning() {
        let export = tempdir().unwrap();
        let assets = tempdir().unwrap();
        fs::write(assets.path().join("a.jpg"), b"a").unwrap();
        fs::create_dir_all(export.path().join("Album")).unwrap();
        fs::write(export.path().join("Album/a.jpg"), b"a").unwrap();

        let config = test_config(export.path(), assets.path());
        let mut publisher = memory_publisher();
        let mut progress = RunProgress::starting();
        sync_rows(&config, &RunControl::new(), &mut publisher, &[], &mut progress).unwrap();

        assert_eq!(progress.status, Status::Complete);
        assert_eq!(progress.deleted, 0);
        assert!(export.path().join("Album/a.jpg").is_file());
        assert_eq!(publisher.store().snapshot().status, Status::Complete);
    }

    #[test]
    fn test_sync_rows_mirrors_albums() {
        let export = tempdir().unwrap();
        let assets = tempdir().unwrap();
        fs::create_dir_all(assets.path().join("library/2024")).unwrap();
        fs::write(assets.path().join("library/2024/a.jpg"), b"a").unwrap();

        let config = test_config(export.path(), assets.path());
        let rows = vec![AlbumAssetRow::new(
            "7",
            "Holiday",
            "/usr/src/app/upload/library/2024/a.jpg",
        )];
        let mut publisher = memory_publisher();
        let mut progress = RunProgress::starting();
        sync_rows(&config, &RunControl::new(), &mut publisher, &rows, &mut progress).unwrap();

        assert_eq!(progress.status, Status::Complete);
        assert_eq!(progress.copied, 1);
        assert!(export.path().join("Holiday/a.jpg").is_file());
    }
}
