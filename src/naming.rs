//! Capture filename encoding and decoding.
//!
//! The filename grammar is the durable on-disk contract: every capture is
//! named `<prefix>_<positionMs>.<ext>`, and two older naming schemes from
//! previous releases must stay recognizable so existing datasets keep their
//! timeline markers.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Raster image formats the capture pipeline can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    Bmp,
    Tiff,
}

impl ImageFormat {
    /// Canonical file extension, lowercase, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Tiff => "tiff",
        }
    }

    /// Matching format identifier for the `image` crate encoders.
    pub fn to_image_format(self) -> image::ImageFormat {
        match self {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Bmp => image::ImageFormat::Bmp,
            ImageFormat::Tiff => image::ImageFormat::Tiff,
        }
    }
}

/// Extension alternation shared by all filename patterns. Matching is
/// case-insensitive on the extension only.
const EXT_PATTERN: &str = r"(?i:png|jpe?g|bmp|tiff?)";

/// Outcome of decoding a capture filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedName {
    /// A recognized capture file with a playback position in milliseconds.
    Position(u64),
    /// A recognized capture file from the oldest naming scheme, which did
    /// not record a position. Cannot be placed on the timeline.
    NoTimestamp,
    /// Not a capture file for this prefix.
    NoMatch,
}

/// Encode the canonical capture filename for a position.
pub fn encode(prefix: &str, position_ms: u64, format: ImageFormat) -> String {
    format!("{}_{}.{}", prefix, position_ms, format.extension())
}

/// Compiled filename patterns for one prefix.
///
/// The three recognized schemes are tried in precedence order:
/// 1. current: `prefix_<ms>.<ext>`
/// 2. legacy with position: `prefix_<date>_<time>_<ms3>_<ms>ms_<w>_<h>.<ext>`
/// 3. legacy without position: `prefix_<date>_<time>_<ms3>_<w>_<h>.<ext>`
pub struct FilenameMatcher {
    current: Regex,
    legacy_with_position: Regex,
    legacy_bare: Regex,
}

impl FilenameMatcher {
    /// Build the matchers for a prefix. The prefix is escaped and matched
    /// literally, never interpreted as a pattern.
    pub fn new(prefix: &str) -> Self {
        let p = regex::escape(prefix);
        let current = Regex::new(&format!(r"^{p}_(\d+)\.{EXT_PATTERN}$"))
            .expect("current filename pattern is valid");
        let legacy_with_position = Regex::new(&format!(
            r"^{p}_\d{{8}}_\d{{6}}_\d{{3}}_(\d+)ms_\d+_\d+\.{EXT_PATTERN}$"
        ))
        .expect("legacy filename pattern is valid");
        let legacy_bare = Regex::new(&format!(
            r"^{p}_\d{{8}}_\d{{6}}_\d{{3}}_\d+_\d+\.{EXT_PATTERN}$"
        ))
        .expect("legacy bare filename pattern is valid");

        Self {
            current,
            legacy_with_position,
            legacy_bare,
        }
    }

    /// Decode a bare filename (no directory components) for this prefix.
    pub fn decode(&self, filename: &str) -> DecodedName {
        for pattern in [&self.current, &self.legacy_with_position] {
            if let Some(caps) = pattern.captures(filename) {
                match caps[1].parse::<u64>() {
                    Ok(position_ms) => return DecodedName::Position(position_ms),
                    Err(_) => return DecodedName::NoMatch,
                }
            }
        }
        if self.legacy_bare.is_match(filename) {
            return DecodedName::NoTimestamp;
        }
        DecodedName::NoMatch
    }
}

/// Length of the fixed content-ID prefix some video platforms use in their
/// download filenames, e.g. `dQw4w9WgXcQ_some title.mp4`.
const CONTENT_ID_LEN: usize = 11;

/// Infer a capture filename prefix from a newly opened video's filename.
///
/// If the base name starts with an 11-character alphanumeric/dash/underscore
/// content ID followed by an underscore, that ID becomes the prefix.
/// Otherwise the whole stem (extension stripped) is used.
pub fn infer_prefix(video_path: &Path) -> String {
    let base = video_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let bytes = base.as_bytes();
    if bytes.len() > CONTENT_ID_LEN && bytes[CONTENT_ID_LEN] == b'_' {
        let id = &bytes[..CONTENT_ID_LEN];
        if id
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || *b == b'-' || *b == b'_')
        {
            return base[..CONTENT_ID_LEN].to_string();
        }
    }

    video_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn encode_is_plain_unpadded() {
        assert_eq!(encode("clip", 0, ImageFormat::Png), "clip_0.png");
        assert_eq!(encode("clip", 12345, ImageFormat::Jpeg), "clip_12345.jpg");
    }

    #[test]
    fn round_trip_current_format() {
        for prefix in ["frame", "my-video", "a_b_c", "dQw4w9WgXcQ"] {
            let matcher = FilenameMatcher::new(prefix);
            for position in [0u64, 1, 999, 45_000, 3_600_000] {
                let name = encode(prefix, position, ImageFormat::Png);
                assert_eq!(matcher.decode(&name), DecodedName::Position(position));
            }
        }
    }

    #[test]
    fn legacy_format_with_position() {
        let matcher = FilenameMatcher::new("frame");
        assert_eq!(
            matcher.decode("frame_20240101_120000_123_45000ms_1920_1080.png"),
            DecodedName::Position(45_000)
        );
    }

    #[test]
    fn legacy_format_without_position() {
        let matcher = FilenameMatcher::new("frame");
        assert_eq!(
            matcher.decode("frame_20240101_120000_123_1920_1080.png"),
            DecodedName::NoTimestamp
        );
    }

    #[test]
    fn extension_matching_is_case_insensitive() {
        let matcher = FilenameMatcher::new("clip");
        assert_eq!(matcher.decode("clip_500.PNG"), DecodedName::Position(500));
        assert_eq!(matcher.decode("clip_500.JpEg"), DecodedName::Position(500));
        assert_eq!(matcher.decode("clip_500.TIF"), DecodedName::Position(500));
    }

    #[test]
    fn unrelated_files_do_not_match() {
        let matcher = FilenameMatcher::new("clip");
        assert_eq!(matcher.decode("other_500.png"), DecodedName::NoMatch);
        assert_eq!(matcher.decode("clip_500.txt"), DecodedName::NoMatch);
        assert_eq!(matcher.decode("clip_abc.png"), DecodedName::NoMatch);
        assert_eq!(matcher.decode("clip_500.png.bak"), DecodedName::NoMatch);
    }

    #[test]
    fn prefix_is_matched_literally() {
        // A prefix containing regex metacharacters must not be interpreted.
        let matcher = FilenameMatcher::new("a.b");
        assert_eq!(matcher.decode("a.b_100.png"), DecodedName::Position(100));
        assert_eq!(matcher.decode("aXb_100.png"), DecodedName::NoMatch);
    }

    #[test]
    fn other_prefixes_are_invisible() {
        let matcher = FilenameMatcher::new("clip");
        assert_eq!(
            matcher.decode("frame_20240101_120000_123_45000ms_1920_1080.png"),
            DecodedName::NoMatch
        );
    }

    #[test]
    fn infer_prefix_content_id() {
        let path = PathBuf::from("/videos/dQw4w9WgXcQ_never gonna.mp4");
        assert_eq!(infer_prefix(&path), "dQw4w9WgXcQ");
    }

    #[test]
    fn infer_prefix_falls_back_to_stem() {
        // Character 12 is not an underscore.
        let path = PathBuf::from("/videos/holiday recording 2024.mp4");
        assert_eq!(infer_prefix(&path), "holiday recording 2024");

        // First 11 characters are not all from the ID alphabet.
        let path = PathBuf::from("/videos/my video 01_cut.mp4");
        assert_eq!(infer_prefix(&path), "my video 01_cut");

        // Too short for an ID.
        let path = PathBuf::from("/videos/short.mkv");
        assert_eq!(infer_prefix(&path), "short");
    }
}
