//! # Slide Counter
//!
//! Derives the presentation's upper bound from the slide files on disk. This
//! runs once at startup; the count is never re-read.

use std::path::{Path, PathBuf};

use glob::glob;
use thiserror::Error;

use crate::engine::PresentationState;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("slides directory {0} does not exist")]
    MissingDirectory(PathBuf),

    #[error("invalid slides pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// Counts regular files in `dir` matching the glob `pattern` (e.g. `*.png`).
/// Unreadable entries are skipped.
pub fn count_slides(dir: &Path, pattern: &str) -> Result<usize, AssetError> {
    if !dir.is_dir() {
        return Err(AssetError::MissingDirectory(dir.to_path_buf()));
    }

    let full_pattern = format!("{}/{}", glob::Pattern::escape(&dir.display().to_string()), pattern);
    let count = glob(&full_pattern)?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .count();

    tracing::debug!(dir = %dir.display(), pattern, count, "Slides counted.");
    Ok(count)
}

/// Initial state for a deck of `count` slides: first slide shown, `max` is the
/// last valid index (0 for an empty deck).
pub fn initial_state(count: usize) -> PresentationState {
    let max = i64::try_from(count).unwrap_or(i64::MAX).saturating_sub(1).max(0);
    PresentationState::new(0, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn counts_only_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["01.png", "02.png", "03.png", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("nested.png")).unwrap();

        assert_eq!(count_slides(dir.path(), "*.png").unwrap(), 3);
        assert_eq!(count_slides(dir.path(), "*.*").unwrap(), 4);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            count_slides(&missing, "*.png"),
            Err(AssetError::MissingDirectory(path)) if path == missing
        ));
    }

    #[test]
    fn bad_pattern_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(count_slides(dir.path(), "[*.png"), Err(AssetError::Pattern(_))));
    }

    #[test]
    fn initial_state_uses_last_index_as_max() {
        assert_eq!(initial_state(10), PresentationState::new(0, 9));
        assert_eq!(initial_state(1), PresentationState::new(0, 0));
        assert_eq!(initial_state(0), PresentationState::new(0, 0));
    }
}
