//! Advisory PID-file lock marking an exporter run in progress.
//!
//! The file holds the exporter's PID. It is advisory only: a holder is
//! considered active while that process is alive, and a file left behind
//! by a dead process is cleared on the next check.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// PID of the live lock holder, clearing a stale or unreadable lock file.
    pub fn active_pid(&self) -> Option<u32> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(_) => return None,
        };

        match content.trim().parse::<u32>() {
            Ok(pid) if pid_is_alive(pid) => Some(pid),
            Ok(pid) => {
                info!("Clearing stale lock held by dead process {}", pid);
                self.remove();
                None
            }
            Err(_) => {
                warn!("Clearing unreadable lock file {}", self.path.display());
                self.remove();
                None
            }
        }
    }

    /// Record `pid` as the lock holder.
    pub fn acquire(&self, pid: u32) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, pid.to_string())
            .with_context(|| format!("Failed to write lock file {}", self.path.display()))
    }

    /// Remove the lock if it still names `pid`.
    pub fn release(&self, pid: u32) {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim() == pid.to_string() => self.remove(),
            Ok(_) => debug!("Lock file no longer held by {}, leaving it", pid),
            Err(_) => {}
        }
    }

    fn remove(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove lock file {}: {}", self.path.display(), e);
            }
        }
    }
}

#[cfg(target_os = "linux")]
pub fn pid_is_alive(pid: u32) -> bool {
    pid > 0 && Path::new(&format!("/proc/{}", pid)).exists()
}

#[cfg(all(unix, not(target_os = "linux")))]
pub fn pid_is_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }

    // Signal 0 only checks for existence; EPERM still means the process exists.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn pid_is_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // Above the kernel's pid_max, so never a live process.
    const DEAD_PID: u32 = i32::MAX as u32;

    #[test]
    fn test_no_lock_file() {
        let dir = tempdir().unwrap();
        let lock = RunLock::new(dir.path().join("run.lock"));
        assert_eq!(lock.active_pid(), None);
    }

    #[test]
    fn test_live_holder_is_reported() {
        let dir = tempdir().unwrap();
        let lock = RunLock::new(dir.path().join("run.lock"));
        let me = std::process::id();

        lock.acquire(me).unwrap();
        assert_eq!(lock.active_pid(), Some(me));

        lock.release(me);
        assert!(!lock.path().exists());
    }

    #[test]
    fn test_stale_lock_is_cleared() {
        let dir = tempdir().unwrap();
        let lock = RunLock::new(dir.path().join("run.lock"));

        lock.acquire(DEAD_PID).unwrap();
        assert_eq!(lock.active_pid(), None);
        assert!(!lock.path().exists());
    }

    #[test]
    fn test_garbage_lock_is_cleared() {
        let dir = tempdir().unwrap();
        let lock = RunLock::new(dir.path().join("run.lock"));
        fs::write(lock.path(), "not a pid").unwrap();

        assert_eq!(lock.active_pid(), None);
        assert!(!lock.path().exists());
    }

    #[test]
    fn test_release_leaves_other_holders_alone() {
        let dir = tempdir().unwrap();
        let lock = RunLock::new(dir.path().join("run.lock"));
        let me = std::process::id();

        lock.acquire(me).unwrap();
        lock.release(DEAD_PID);
        assert_eq!(lock.active_pid(), Some(me));
    }
}
