//! Timeline index of previously captured positions.
//!
//! Scans the output directory with the filename codec to recover capture
//! timestamps, so the host can render proportional markers along the
//! playback range.

use anyhow::Result;
use std::path::Path;
use tracing::{debug, warn};

use crate::naming::{DecodedName, FilenameMatcher};

/// Ordered multiset of captured positions for one (directory, prefix) pair.
///
/// Duplicate positions are kept: they represent independent files.
#[derive(Debug, Default, Clone)]
pub struct TimelineIndex {
    positions: Vec<u64>,
}

impl TimelineIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the index wholesale from a directory scan.
    ///
    /// Files under other prefixes and files from the oldest naming scheme
    /// (which recorded no position) are excluded. A missing directory is
    /// treated as an empty index, not an error.
    pub fn rebuild(&mut self, directory: &Path, prefix: &str) -> Result<usize> {
        self.positions.clear();

        if !directory.is_dir() {
            debug!("Output directory {:?} does not exist, timeline empty", directory);
            return Ok(0);
        }

        let matcher = FilenameMatcher::new(prefix);
        for entry in std::fs::read_dir(directory)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable directory entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name();
            match matcher.decode(&name.to_string_lossy()) {
                DecodedName::Position(position_ms) => self.positions.push(position_ms),
                DecodedName::NoTimestamp | DecodedName::NoMatch => {}
            }
        }

        self.positions.sort_unstable();
        debug!(
            "Timeline rebuilt from {:?} with prefix {:?}: {} markers",
            directory,
            prefix,
            self.positions.len()
        );
        Ok(self.positions.len())
    }

    /// Insert one position, keeping the set sorted. Used for incremental
    /// updates after a successful capture.
    pub fn insert(&mut self, position_ms: u64) {
        let at = self.positions.partition_point(|&p| p <= position_ms);
        self.positions.insert(at, position_ms);
    }

    /// Sorted positions, ascending.
    pub fn positions(&self) -> &[u64] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Normalize a position into a `[0, 1]` fraction of the duration, clamped
/// at both ends. Used purely for proportional marker rendering.
pub fn normalize(position_ms: i64, duration_ms: u64) -> f64 {
    if duration_ms == 0 {
        return 0.0;
    }
    (position_ms as f64 / duration_ms as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_quarter() {
        assert_eq!(normalize(30_000, 120_000), 0.25);
    }

    #[test]
    fn normalize_clamps_both_ends() {
        assert_eq!(normalize(-10, 100), 0.0);
        assert_eq!(normalize(150, 100), 1.0);
    }

    #[test]
    fn normalize_zero_duration() {
        assert_eq!(normalize(500, 0), 0.0);
    }

    #[test]
    fn insert_keeps_order_and_duplicates() {
        let mut index = TimelineIndex::new();
        for p in [300, 100, 200, 200] {
            index.insert(p);
        }
        assert_eq!(index.positions(), &[100, 200, 200, 300]);
    }

    #[test]
    fn rebuild_scans_only_current_prefix() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "clip_12345.png",
            "clip_500.JPG",
            "clip_20240101_120000_123_45000ms_1920_1080.png",
            // Excluded: no timestamp in the oldest scheme.
            "clip_20240101_120000_123_1920_1080.png",
            // Excluded: different prefix.
            "other_777.png",
            // Excluded: not an image.
            "clip_999.txt",
        ] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let mut index = TimelineIndex::new();
        let count = index.rebuild(dir.path(), "clip").unwrap();
        assert_eq!(count, 3);
        assert_eq!(index.positions(), &[500, 12_345, 45_000]);
    }

    #[test]
    fn rebuild_missing_directory_is_empty() {
        let mut index = TimelineIndex::new();
        index.insert(42);
        let count = index
            .rebuild(Path::new("/nonexistent/framepick-test"), "clip")
            .unwrap();
        assert_eq!(count, 0);
        assert!(index.is_empty());
    }
}
