//! The on-disk side of the mirror: where sources live, what the export tree holds.

pub mod discovery;
pub mod hashing;
pub mod paths;
pub mod sanitize;

use std::path::Path;

pub use discovery::{scan_export_dir, ExistingFileMap};
pub use paths::translate_path;
pub use sanitize::album_dir_name;

/// True when the assets root exists and has at least one entry.
///
/// An unmounted network share usually shows up as an empty mount point,
/// which must not be mistaken for "every asset was deleted".
pub fn assets_root_available(root: &Path) -> bool {
    match std::fs::read_dir(root) {
        Ok(mut entries) => entries.next().is_some(),
        Err(_) => false,
    }
}
