//! One reconciliation pass of the mirror against the album/asset rows.
//!
//! Rows are handled strictly in order, one copy at a time. Each asset lands
//! at `<export_dir>/<album dir>/<source file name>`; an existing destination
//! with the same size is treated as identical. Afterwards, mirror files no
//! row referenced are pruned unless the deletion guard objects.

pub mod guard;

use anyhow::{anyhow, bail, Context, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::{Config, GuardConfig};
use crate::control::RunControl;
use crate::db::AlbumAssetRow;
use crate::mirror::{album_dir_name, hashing, scan_export_dir, translate_path, ExistingFileMap};
use crate::progress::{ProgressPublisher, RunProgress, Status};

pub use guard::{GuardReason, PassSummary};

/// Progress is persisted every this many rows (and after the last one).
const PUBLISH_EVERY: usize = 10;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub export_dir: PathBuf,
    pub assets_root: Option<PathBuf>,
    pub guard: GuardConfig,
    pub verify_integrity: bool,
    pub pause_poll: Duration,
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            export_dir: config.export.dir.clone(),
            assets_root: config.assets.root.clone(),
            guard: config.guard.clone(),
            verify_integrity: config.copy.verify_integrity,
            pause_poll: Duration::from_secs(1),
        }
    }
}

/// What happened to one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    /// Source not found on disk.
    Missing,
    /// Destination was absent and has been copied.
    Copied,
    /// Destination differed in size and has been overwritten.
    Updated,
    /// Destination already matches.
    Unchanged,
    /// Copy or filesystem error.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub found_on_disk: usize,
    pub processed: usize,
    pub interrupted: bool,
    pub guard: Option<GuardReason>,
}

pub struct SyncEngine<'a> {
    options: SyncOptions,
    publisher: &'a mut ProgressPublisher,
    control: &'a RunControl,
    paused_for: Duration,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        options: SyncOptions,
        publisher: &'a mut ProgressPublisher,
        control: &'a RunControl,
    ) -> Self {
        Self {
            options,
            publisher,
            control,
            paused_for: Duration::ZERO,
        }
    }

    /// Copy, then (guard permitting) prune. Leaves `progress` complete.
    pub fn run(&mut self, rows: &[AlbumAssetRow], progress: &mut RunProgress) -> Result<SyncOutcome> {
        let total = rows.len();
        progress.status = Status::Running;
        progress.copied = 0;
        progress.skipped = 0;
        progress.failed = 0;
        progress.deleted = 0;
        progress.total = total as u64;
        progress.guard = None;
        progress.error = None;
        progress.traceback = None;
        progress.paused = false;
        progress.can_pause = true;
        progress.can_resume = false;
        self.publisher.publish(progress);

        let mut existing = scan_export_dir(&self.options.export_dir)
            .context("Failed to scan export directory")?;
        debug!("{} files already in the mirror", existing.len());

        let started = Instant::now();
        let mut found_on_disk = 0;
        let mut processed = 0;
        let mut interrupted = false;

        for (i, row) in rows.iter().enumerate() {
            self.wait_while_paused(progress);
            if self.control.is_shutdown_requested() {
                info!("Shutdown requested, stopping after {} of {} rows", processed, total);
                interrupted = true;
                break;
            }

            progress.current_album = Some(row.album_name.clone());
            let outcome = self.sync_row(row, &mut existing, progress);
            if tally(progress, outcome) {
                found_on_disk += 1;
            }
            processed += 1;

            self.update_rate(progress, started, processed, total);
            let index = i + 1;
            if index % PUBLISH_EVERY == 0 || index == total {
                self.publisher.publish(progress);
            }
        }

        progress.current_album = None;
        progress.current_file = None;
        progress.can_pause = false;
        progress.can_resume = false;

        let pass = PassSummary {
            found_on_disk,
            processed,
            total,
        };
        let guard = guard::evaluate(self.options.assets_root.as_deref(), pass, &self.options.guard);

        match &guard {
            Some(reason) => {
                warn!(
                    "Deletion guard triggered: {}. Skipping cleanup deletions.",
                    reason
                );
                progress.guard = Some(reason.to_string());
            }
            None => self.prune(&existing, progress),
        }

        progress.status = Status::Complete;
        self.publisher.publish(progress);

        Ok(SyncOutcome {
            found_on_disk,
            processed,
            interrupted,
            guard,
        })
    }

    /// Bring one row's destination up to date.
    pub fn sync_row(
        &self,
        row: &AlbumAssetRow,
        existing: &mut ExistingFileMap,
        progress: &mut RunProgress,
    ) -> RowOutcome {
        let source = translate_path(&row.original_path, self.options.assets_root.as_deref());
        if !source.is_file() {
            info!("Skipping missing asset: {}", source.display());
            return RowOutcome::Missing;
        }

        let Some(file_name) = source.file_name() else {
            warn!("Asset path has no file name: {}", source.display());
            return RowOutcome::Failed;
        };

        let album_dir = self.options.export_dir.join(album_dir_name(&row.album_name));
        if let Err(e) = fs::create_dir_all(&album_dir) {
            warn!("Failed to create {}: {}", album_dir.display(), e);
            return RowOutcome::Failed;
        }

        let dest = album_dir.join(file_name);
        existing.mark_wanted(&dest);
        progress.current_file = Some(dest.to_string_lossy().to_string());

        if dest.exists() && !dest.is_file() {
            warn!("Destination is not a regular file: {}", dest.display());
            return RowOutcome::Failed;
        }

        if dest.exists() {
            match same_size(&source, &dest) {
                Ok(true) => {
                    debug!("Already exists, skipping: {}", dest.display());
                    RowOutcome::Unchanged
                }
                Ok(false) => match self.copy_asset(&source, &dest) {
                    Ok(()) => {
                        info!("Updated: {} -> {}", source.display(), dest.display());
                        RowOutcome::Updated
                    }
                    Err(e) => {
                        warn!("Error with {}: {:#}", dest.display(), e);
                        RowOutcome::Failed
                    }
                },
                Err(e) => {
                    warn!("Error with {}: {:#}", dest.display(), e);
                    RowOutcome::Failed
                }
            }
        } else {
            match self.copy_asset(&source, &dest) {
                Ok(()) => {
                    info!("Copied: {} -> {}", source.display(), dest.display());
                    RowOutcome::Copied
                }
                Err(e) => {
                    warn!("Failed copy {}: {:#}", source.display(), e);
                    RowOutcome::Failed
                }
            }
        }
    }

    /// Copy content and permissions, then carry over the modification time.
    fn copy_asset(&self, source: &Path, dest: &Path) -> Result<()> {
        fs::copy(source, dest).context("Copy failed")?;

        let modified = fs::metadata(source)?.modified()?;
        File::options()
            .write(true)
            .open(dest)?
            .set_modified(modified)
            .context("Failed to preserve modification time")?;

        if self.options.verify_integrity {
            verify_copy(source, dest)?;
        }

        Ok(())
    }

    /// Block between rows while a pause is requested, persisting the paused state.
    fn wait_while_paused(&mut self, progress: &mut RunProgress) {
        if !self.control.is_pause_requested() || self.control.is_shutdown_requested() {
            return;
        }

        info!("Paused");
        let paused_at = Instant::now();
        progress.paused = true;
        progress.can_pause = false;
        progress.can_resume = true;
        self.publisher.publish(progress);

        while self.control.is_pause_requested() && !self.control.is_shutdown_requested() {
            thread::sleep(self.options.pause_poll);
            self.publisher.publish(progress);
        }

        self.paused_for += paused_at.elapsed();
        progress.paused = false;
        progress.can_pause = true;
        progress.can_resume = false;
        self.publisher.publish(progress);
        info!("Resumed");
    }

    fn update_rate(&self, progress: &mut RunProgress, started: Instant, processed: usize, total: usize) {
        let active = started.elapsed().saturating_sub(self.paused_for).as_secs_f64();
        if active <= 0.0 {
            return;
        }

        let rate = processed as f64 / active;
        progress.files_per_second = (rate * 10.0).round() / 10.0;
        progress.estimated_remaining = if rate > 0.0 {
            let remaining = total.saturating_sub(processed) as f64 / rate;
            Some(format_duration(remaining.round() as u64))
        } else {
            None
        };
    }

    /// Delete unreferenced mirror files and any album directory they leave empty.
    fn prune(&self, existing: &ExistingFileMap, progress: &mut RunProgress) {
        for path in existing.unwanted() {
            match fs::remove_file(&path) {
                Ok(()) => {
                    info!("Deleted: {}", path.display());
                    progress.deleted += 1;
                }
                Err(e) => {
                    warn!("Failed delete {}: {}", path.display(), e);
                    continue;
                }
            }

            if let Some(parent) = path.parent() {
                if parent != self.options.export_dir && is_empty_dir(parent) {
                    match fs::remove_dir(parent) {
                        Ok(()) => info!("Removed empty dir: {}", parent.display()),
                        Err(e) => warn!("Failed to remove {}: {}", parent.display(), e),
                    }
                }
            }
        }
    }
}

/// Count `outcome` into `progress`. Returns whether the source was found on disk.
fn tally(progress: &mut RunProgress, outcome: RowOutcome) -> bool {
    match outcome {
        RowOutcome::Missing => {
            progress.skipped += 1;
            false
        }
        RowOutcome::Unchanged => {
            progress.skipped += 1;
            true
        }
        RowOutcome::Copied | RowOutcome::Updated => {
            progress.copied += 1;
            true
        }
        RowOutcome::Failed => {
            progress.failed += 1;
            true
        }
    }
}

/// Compare SHA-256 of a fresh copy with its source; a bad copy is removed.
pub fn verify_copy(source: &Path, dest: &Path) -> Result<()> {
    if hashing::same_content(source, dest)? {
        return Ok(());
    }

    if let Err(e) = fs::remove_file(dest) {
        warn!("Failed to remove bad copy {}: {}", dest.display(), e);
    }
    bail!("integrity check failed for {}", dest.display())
}

fn same_size(a: &Path, b: &Path) -> Result<bool> {
    let a = fs::metadata(a).map_err(|e| anyhow!("stat {}: {}", a.display(), e))?;
    let b = fs::metadata(b).map_err(|e| anyhow!("stat {}: {}", b.display(), e))?;
    Ok(a.len() == b.len())
}

fn is_empty_dir(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

/// `1h 02m 03s`, `4m 05s` or `7s`.
pub fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
