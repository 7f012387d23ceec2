//! Frame capture pipeline: backend contract and capture data model.

mod buffer;
mod coordinator;
mod tool;

pub use buffer::BufferBackend;
pub use coordinator::{select_backend, CaptureCoordinator};
pub use tool::FfmpegBackend;

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::CaptureError;
use crate::naming::{self, ImageFormat};

/// One capture attempt, constructed fresh per request and consumed by
/// exactly one backend invocation.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    /// Playback position the still should represent, in milliseconds.
    pub position_ms: u64,
    /// Filename prefix for the written file.
    pub prefix: String,
    /// Image format the file is encoded in.
    pub format: ImageFormat,
    /// Directory the file is written into.
    pub output_dir: PathBuf,
    /// Path of the loaded video, for backends that re-extract from source.
    pub video_path: PathBuf,
}

impl CaptureRequest {
    /// Canonical filename for this request.
    pub fn filename(&self) -> String {
        naming::encode(&self.prefix, self.position_ms, self.format)
    }

    /// Full output path for this request.
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(self.filename())
    }
}

/// A successfully captured frame, as listed in the UI and the timeline.
/// Never mutated; removed on user deletion or superseded by a rescan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    pub position_ms: u64,
    pub filename: String,
    pub width: u32,
    pub height: u32,
}

/// Result of one capture attempt.
#[derive(Debug)]
pub enum CaptureOutcome {
    Saved(FrameRecord),
    Failed(CaptureError),
}

/// What a backend produced for a capture request.
#[derive(Debug)]
pub enum CaptureArtifact {
    /// Encoded image bytes; the coordinator writes them to the output path.
    Encoded {
        data: Vec<u8>,
        width: u32,
        height: u32,
    },
    /// The backend wrote the output file itself.
    WrittenToDisk { width: u32, height: u32 },
}

/// A concrete strategy for turning the current position into a still image.
///
/// Selected once at coordinator construction; there is no per-call
/// re-selection.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Short name for logs and the journal.
    fn name(&self) -> &'static str;

    /// Whether captures run as a detached subprocess rather than
    /// completing inline.
    fn runs_detached(&self) -> bool {
        false
    }

    /// Produce a still image for the request.
    async fn capture(&self, request: &CaptureRequest) -> Result<CaptureArtifact, CaptureError>;
}
