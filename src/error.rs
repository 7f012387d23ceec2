//! Error taxonomy for the capture pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by a single capture attempt.
///
/// None of these are retried automatically and none are fatal to the
/// process; each is terminal for the one capture that produced it.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No video is loaded, or the playback engine is stopped.
    #[error("no video loaded or playback stopped")]
    NoActiveMedia,

    /// The encoded frame could not be written to disk.
    #[error("failed to write frame to {path}: {source}")]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The external extraction tool was not found or did not answer the
    /// availability probe in time. Only produced during backend selection,
    /// never by an individual capture.
    #[error("external frame extraction tool is not available")]
    ToolUnavailable,

    /// The external extraction tool exited abnormally or failed to spawn.
    #[error("frame extraction tool failed: {stderr}")]
    ToolExecutionFailure { stderr: String },

    /// The in-process frame buffer could not be encoded in the requested
    /// image format.
    #[error("failed to encode frame image: {0}")]
    EncodeFailure(#[from] image::ImageError),
}

impl CaptureError {
    /// Whether the failure should be shown to the operator as an explicit
    /// error message, as opposed to being logged only.
    pub fn user_visible(&self) -> bool {
        matches!(
            self,
            CaptureError::WriteFailure { .. } | CaptureError::ToolExecutionFailure { .. }
        )
    }
}
