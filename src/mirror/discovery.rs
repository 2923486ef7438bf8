use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::PROGRESS_FILE_NAME;

/// Extensions the exporter manages. Anything else in the export tree is left alone.
const MEDIA_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp", "raw", "dng", "cr2", "nef", "arw", "orf",
    "rw2", "pef", "x3f", "srw", "raf", "3fr", "fff", "iiq", "k25", "kdc", "mos", "mef", "nrw",
    "ptx", "pxn", "r3d", "rwl", "rwz", "mp4", "mov", "avi", "mkv", "m4v", "3gp", "webm",
];

const IGNORED_FILES: &[&str] = &[PROGRESS_FILE_NAME, ".DS_Store", "Thumbs.db"];

/// Files already in the export tree, each flagged once this run still wants it.
#[derive(Debug, Clone, Default)]
pub struct ExistingFileMap {
    files: HashMap<PathBuf, bool>,
}

impl ExistingFileMap {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    /// Flag `path` as still referenced. Paths not seen by the scan are ignored.
    pub fn mark_wanted(&mut self, path: &Path) {
        if let Some(wanted) = self.files.get_mut(path) {
            *wanted = true;
        }
    }

    /// Files no row referenced, sorted for stable deletion order.
    pub fn unwanted(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .files
            .iter()
            .filter(|(_, wanted)| !**wanted)
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        paths
    }
}

pub fn is_media_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            MEDIA_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Walk the export directory and collect managed media files, all initially unwanted.
pub fn scan_export_dir(export_dir: &Path) -> Result<ExistingFileMap> {
    let mut map = ExistingFileMap::default();
    if !export_dir.exists() {
        return Ok(map);
    }

    for entry in WalkDir::new(export_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if IGNORED_FILES.contains(&name.as_ref()) || name.ends_with(".tmp") {
            continue;
        }

        if is_media_file(entry.path()) {
            map.files.insert(entry.path().to_path_buf(), false);
        }
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    #[test]
    fn test_scan_export_dir() {
        let dir = tempdir().unwrap();

        File::create(dir.path().join("progress.json")).unwrap();
        File::create(dir.path().join("notes.txt")).unwrap();
        fs::create_dir(dir.path().join("Summer")).unwrap();
        File::create(dir.path().join("Summer/a.JPG")).unwrap();
        File::create(dir.path().join("Summer/b.mp4")).unwrap();
        File::create(dir.path().join("Summer/Thumbs.db")).unwrap();
        fs::create_dir(dir.path().join("Winter")).unwrap();
        File::create(dir.path().join("Winter/c.nef")).unwrap();

        let map = scan_export_dir(dir.path()).unwrap();

        assert_eq!(map.len(), 3);
        assert!(map.contains(&dir.path().join("Summer/a.JPG")));
        assert!(!map.contains(&dir.path().join("notes.txt")));
        assert!(!map.contains(&dir.path().join("progress.json")));
    }

    #[test]
    fn test_missing_export_dir_is_empty() {
        let dir = tempdir().unwrap();
        let map = scan_export_dir(&dir.path().join("not-yet")).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_mark_wanted_only_affects_scanned_paths() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("keep.jpg")).unwrap();
        File::create(dir.path().join("drop.jpg")).unwrap();

        let mut map = scan_export_dir(dir.path()).unwrap();
        map.mark_wanted(&dir.path().join("keep.jpg"));
        map.mark_wanted(&dir.path().join("never-seen.jpg"));

        assert_eq!(map.len(), 2);
        assert_eq!(map.unwanted(), vec![dir.path().join("drop.jpg")]);
    }
}
