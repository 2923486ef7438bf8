//! Where progress snapshots live.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use super::RunProgress;

/// Backoff between read attempts while a writer may be mid-rename.
const READ_BACKOFF_MS: &[u64] = &[50, 100, 200];

pub trait ProgressStore: Send + Sync {
    /// Persist a snapshot.
    fn save(&self, progress: &RunProgress) -> Result<()>;

    /// Latest readable snapshot, the last good one, or an `unknown` skeleton.
    fn snapshot(&self) -> RunProgress;
}

/// JSON file store. Writes go to a sibling temp file and are renamed into
/// place, so readers see either the old or the new snapshot, never a torn one.
pub struct FileProgressStore {
    path: PathBuf,
    last_good: Mutex<Option<RunProgress>>,
}

impl FileProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_good: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "progress.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn read_once(&self) -> Result<RunProgress> {
        let content = fs::read(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        serde_json::from_slice(&content)
            .with_context(|| format!("Invalid progress file {}", self.path.display()))
    }

    /// Read with a short bounded retry; `None` if every attempt failed.
    pub fn load(&self) -> Option<RunProgress> {
        for (attempt, delay) in READ_BACKOFF_MS.iter().enumerate() {
            match self.read_once() {
                Ok(progress) => return Some(progress),
                Err(e) => {
                    tracing::debug!("Progress read attempt {} failed: {:#}", attempt + 1, e);
                    thread::sleep(Duration::from_millis(*delay));
                }
            }
        }
        self.read_once().ok()
    }
}

impl ProgressStore for FileProgressStore {
    fn save(&self, progress: &RunProgress) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.temp_path();
        let json = serde_json::to_vec_pretty(progress)?;
        {
            let mut file = fs::File::create(&tmp)
                .with_context(|| format!("Failed to create {}", tmp.display()))?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }

    fn snapshot(&self) -> RunProgress {
        // Read without the cache lock so slow retries don't serialize readers.
        let loaded = self.load();

        let mut last_good = self
            .last_good
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match loaded {
            Some(progress) => {
                *last_good = Some(progress.clone());
                progress
            }
            None => last_good.clone().unwrap_or_default(),
        }
    }
}

/// In-process store, for tests and embedding.
#[derive(Default)]
pub struct MemoryProgressStore {
    current: Mutex<Option<RunProgress>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressStore for MemoryProgressStore {
    fn save(&self, progress: &RunProgress) -> Result<()> {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = Some(progress.clone());
        Ok(())
    }

    fn snapshot(&self) -> RunProgress {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .unwrap_or_default()
    }
}
