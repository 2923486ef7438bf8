//! Deletion guard.
//!
//! Pruning the mirror is only safe when this run actually saw the source
//! library. An unmounted share, an empty mount point, or a mostly
//! unreadable library all look like "everything was deleted"; in those
//! cases the run copies what it can and deletes nothing.

use std::fmt;
use std::path::Path;

use crate::config::GuardConfig;
use crate::mirror::assets_root_available;

#[derive(Debug, Clone, PartialEq)]
pub enum GuardReason {
    AssetsRootUnavailable,
    NoSourceFiles,
    TooFewSources {
        found: usize,
        min_abs: usize,
        fraction: f64,
        min_fraction: f64,
    },
    /// Shutdown arrived before every row was processed.
    Interrupted { processed: usize, total: usize },
}

impl fmt::Display for GuardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardReason::AssetsRootUnavailable => write!(f, "assets root unavailable or empty"),
            GuardReason::NoSourceFiles => write!(f, "no source files found"),
            GuardReason::TooFewSources {
                found,
                min_abs,
                fraction,
                min_fraction,
            } => write!(
                f,
                "too few sources found ({}<{} and {:.1}%<{:.0}%)",
                found,
                min_abs,
                fraction * 100.0,
                min_fraction * 100.0
            ),
            GuardReason::Interrupted { processed, total } => write!(
                f,
                "run interrupted ({} of {} rows processed)",
                processed, total
            ),
        }
    }
}

/// Facts about the finished pass that the guard looks at.
#[derive(Debug, Clone, Copy)]
pub struct PassSummary {
    pub found_on_disk: usize,
    pub processed: usize,
    pub total: usize,
}

/// First reason to skip deletions, or `None` if pruning is safe.
pub fn evaluate(
    assets_root: Option<&Path>,
    pass: PassSummary,
    config: &GuardConfig,
) -> Option<GuardReason> {
    if let Some(root) = assets_root {
        if !assets_root_available(root) {
            return Some(GuardReason::AssetsRootUnavailable);
        }
    }

    if pass.found_on_disk == 0 {
        return Some(GuardReason::NoSourceFiles);
    }

    let fraction = pass.found_on_disk as f64 / pass.total.max(1) as f64;
    if pass.found_on_disk < config.min_found_abs && fraction < config.min_found_fraction {
        return Some(GuardReason::TooFewSources {
            found: pass.found_on_disk,
            min_abs: config.min_found_abs,
            fraction,
            min_fraction: config.min_found_fraction,
        });
    }

    if pass.processed < pass.total {
        return Some(GuardReason::Interrupted {
            processed: pass.processed,
            total: pass.total,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    fn pass(found_on_disk: usize, total: usize) -> PassSummary {
        PassSummary {
            found_on_disk,
            processed: total,
            total,
        }
    }

    #[test]
    fn test_empty_assets_root_blocks_deletion() {
        let root = tempdir().unwrap();
        let reason = evaluate(Some(root.path()), pass(500, 500), &GuardConfig::default());
        assert_eq!(reason, Some(GuardReason::AssetsRootUnavailable));
        assert_eq!(reason.unwrap().to_string(), "assets root unavailable or empty");
    }

    #[test]
    fn test_missing_assets_root_blocks_deletion() {
        let root = tempdir().unwrap();
        let missing = root.path().join("unmounted");
        let reason = evaluate(Some(&missing), pass(500, 500), &GuardConfig::default());
        assert_eq!(reason, Some(GuardReason::AssetsRootUnavailable));
    }

    #[test]
    fn test_no_sources_blocks_deletion() {
        let reason = evaluate(None, pass(0, 10), &GuardConfig::default());
        assert_eq!(reason, Some(GuardReason::NoSourceFiles));
    }

    #[test]
    fn test_too_few_sources_blocks_deletion() {
        let reason = evaluate(None, pass(40, 1000), &GuardConfig::default()).unwrap();
        let text = reason.to_string();

        assert!(matches!(reason, GuardReason::TooFewSources { found: 40, .. }));
        assert!(text.contains("40"));
        assert!(text.contains("100"));
        assert!(text.contains("4.0%"));
        assert!(text.contains("5%"));
        assert_eq!(text, "too few sources found (40<100 and 4.0%<5%)");
    }

    #[test]
    fn test_either_floor_is_enough() {
        let config = GuardConfig::default();
        // Below the absolute floor but above the fraction.
        assert_eq!(evaluate(None, pass(10, 20), &config), None);
        // Below the fraction but above the absolute floor.
        assert_eq!(evaluate(None, pass(150, 10_000), &config), None);
    }

    #[test]
    fn test_interrupted_run_blocks_deletion() {
        let summary = PassSummary {
            found_on_disk: 300,
            processed: 300,
            total: 1000,
        };
        let reason = evaluate(None, summary, &GuardConfig::default());
        assert_eq!(
            reason,
            Some(GuardReason::Interrupted {
                processed: 300,
                total: 1000
            })
        );
    }

    #[test]
    fn test_healthy_run_allows_deletion() {
        let root = tempdir().unwrap();
        File::create(root.path().join("upload")).unwrap();
        assert_eq!(
            evaluate(Some(root.path()), pass(500, 500), &GuardConfig::default()),
            None
        );
    }
}
