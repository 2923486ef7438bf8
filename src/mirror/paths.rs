//! Mapping database-recorded asset paths onto the local mount.
//!
//! The library server records paths as it sees them inside its container
//! (`/usr/src/app/upload/...`, sometimes with a doubled `upload/upload/`).
//! The exporter usually sees the same files under a different mount root.

use std::path::{Path, PathBuf};

const CONTAINER_PREFIX: &str = "usr/src/app/";
const DOUBLE_UPLOAD: &str = "upload/upload/";
const UPLOAD: &str = "upload/";

/// Resolve `orig` to an existing file, or return it unchanged so the caller treats it as missing.
pub fn translate_path(orig: &str, assets_root: Option<&Path>) -> PathBuf {
    let original = PathBuf::from(orig);
    if orig.is_empty() || original.is_file() {
        return original;
    }
    let Some(root) = assets_root else {
        return original;
    };

    candidates(orig, root)
        .into_iter()
        .find(|candidate| candidate.is_file())
        .unwrap_or(original)
}

/// Mount-relative locations to try, most specific first.
fn candidates(orig: &str, root: &Path) -> Vec<PathBuf> {
    let normalized = orig.replace('\\', "/");
    let mut rel = normalized.trim_start_matches('/');
    if let Some(stripped) = rel.strip_prefix(CONTAINER_PREFIX) {
        rel = stripped;
    }

    let mut candidates = vec![root.join(rel)];
    if let Some(stripped) = rel.strip_prefix(DOUBLE_UPLOAD) {
        candidates.push(root.join(stripped));
    }
    if let Some(stripped) = rel.strip_prefix(UPLOAD) {
        candidates.push(root.join(stripped));
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_existing_path_is_returned_unchanged() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.jpg");
        touch(&file);

        let orig = file.to_string_lossy().to_string();
        assert_eq!(translate_path(&orig, Some(Path::new("/nowhere"))), file);
    }

    #[test]
    fn test_no_root_returns_original() {
        assert_eq!(
            translate_path("upload/x/a.jpg", None),
            PathBuf::from("upload/x/a.jpg")
        );
    }

    #[test]
    fn test_container_prefix_is_stripped() {
        let root = tempdir().unwrap();
        let expected = root.path().join("upload/library/a.jpg");
        touch(&expected);

        let resolved = translate_path("/usr/src/app/upload/library/a.jpg", Some(root.path()));
        assert_eq!(resolved, expected);
    }

    #[test]
    fn test_double_upload_prefers_stripped_double() {
        let root = tempdir().unwrap();
        let expected = root.path().join("123/foo.jpg");
        touch(&expected);
        touch(&root.path().join("upload/123/foo.jpg"));

        let resolved = translate_path("upload/upload/123/foo.jpg", Some(root.path()));
        assert_eq!(resolved, expected);
    }

    #[test]
    fn test_double_upload_falls_back_to_single_strip() {
        let root = tempdir().unwrap();
        let expected = root.path().join("upload/123/foo.jpg");
        touch(&expected);

        let resolved = translate_path("upload/upload/123/foo.jpg", Some(root.path()));
        assert_eq!(resolved, expected);
    }

    #[test]
    fn test_unresolvable_returns_original() {
        let root = tempdir().unwrap();
        let resolved = translate_path("upload/upload/123/foo.jpg", Some(root.path()));
        assert_eq!(resolved, PathBuf::from("upload/upload/123/foo.jpg"));
    }

    #[test]
    fn test_backslashes_are_normalized() {
        let root = tempdir().unwrap();
        let expected = root.path().join("library/b.png");
        touch(&expected);

        let resolved = translate_path("upload\\library\\b.png", Some(root.path()));
        assert_eq!(resolved, expected);
    }
}
