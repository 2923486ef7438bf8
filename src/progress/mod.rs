//! Run progress: the externally visible state of one export run.
//!
//! The exporter writes it; the status server and the sensor sink read it.
//! The two processes share nothing but the progress file.

pub mod publisher;
pub mod store;

use serde::{Deserialize, Serialize};

pub use publisher::ProgressPublisher;
pub use store::{FileProgressStore, MemoryProgressStore, ProgressStore};

/// Lifecycle of a run. `Unknown` only appears when no snapshot could be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Starting,
    Running,
    Complete,
    Failed,
    #[default]
    Unknown,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Starting => "starting",
            Status::Running => "running",
            Status::Complete => "complete",
            Status::Failed => "failed",
            Status::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunProgress {
    pub status: Status,
    pub copied: u64,
    pub skipped: u64,
    pub failed: u64,
    pub deleted: u64,
    pub total: u64,
    pub last_run: String,

    /// Why deletions were skipped this run, if they were.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
    pub files_per_second: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_remaining: Option<String>,
    pub paused: bool,
    pub can_pause: bool,
    pub can_resume: bool,
}

impl RunProgress {
    /// Fresh state for a run that is about to start.
    pub fn starting() -> Self {
        Self {
            status: Status::Starting,
            last_run: now_stamp(),
            ..Default::default()
        }
    }

    /// Rows handled so far (copied, skipped or failed).
    pub fn processed(&self) -> u64 {
        self.copied + self.skipped + self.failed
    }

    /// Percent of rows handled, one decimal; 0 when there is nothing to do.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let pct = self.processed() as f64 * 100.0 / self.total as f64;
        (pct * 10.0).round() / 10.0
    }

    pub fn is_running(&self) -> bool {
        self.status == Status::Running
    }
}

/// Local wall-clock timestamp in the format shown on the dashboard.
pub fn now_stamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
