use std::fs;
use std::path::Path;

pub const NO_LOG_YET: &str = "No run log yet.";

/// Last `n` lines of the run log, or a placeholder if there is none.
pub fn tail(path: &Path, n: usize) -> String {
    let content = match fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => return NO_LOG_YET.to_string(),
    };

    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_log() {
        let dir = tempdir().unwrap();
        assert_eq!(tail(&dir.path().join("run.log"), 10), NO_LOG_YET);
    }

    #[test]
    fn test_tail_returns_last_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.log");
        fs::write(&path, "one\ntwo\nthree\nfour\n").unwrap();

        assert_eq!(tail(&path, 2), "three\nfour");
        assert_eq!(tail(&path, 200), "one\ntwo\nthree\nfour");
        assert_eq!(tail(&path, 0), "");
    }
}
