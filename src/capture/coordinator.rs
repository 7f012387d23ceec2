//! Capture coordination: backend selection, file writing, record and
//! timeline bookkeeping.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::capture::{
    BufferBackend, CaptureArtifact, CaptureBackend, CaptureOutcome, CaptureRequest, FfmpegBackend,
    FrameRecord,
};
use crate::error::CaptureError;
use crate::naming::ImageFormat;
use crate::player::{FrameStore, MediaStatus};
use crate::timeline::TimelineIndex;

/// Pick the capture backend for the process lifetime.
///
/// The external tool is preferred when its availability probe answers in
/// time; otherwise captures read the in-process frame buffer. The choice is
/// a static default made once, with no per-call re-selection.
pub async fn select_backend(frames: FrameStore) -> Arc<dyn CaptureBackend> {
    match FfmpegBackend::detect().await {
        Ok(tool) => {
            info!("Capture backend: external tool");
            Arc::new(tool)
        }
        Err(CaptureError::ToolUnavailable) => {
            info!("Capture backend: frame buffer (external tool unavailable)");
            Arc::new(BufferBackend::new(frames))
        }
        Err(e) => {
            warn!("Unexpected probe error, using frame buffer backend: {}", e);
            Arc::new(BufferBackend::new(frames))
        }
    }
}

/// Drives captures against the selected backend and keeps the visible
/// frame list and timeline index up to date.
///
/// In-flight external captures are not serialized or deduplicated: rapid
/// repeated saves may overlap, and identical positions re-encode to the
/// same filename, which the forced overwrite makes idempotent.
pub struct CaptureCoordinator {
    backend: Arc<dyn CaptureBackend>,
    output_dir: PathBuf,
    prefix: String,
    format: ImageFormat,
    index: TimelineIndex,
    records: Vec<FrameRecord>,
}

impl CaptureCoordinator {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        output_dir: PathBuf,
        prefix: String,
        format: ImageFormat,
    ) -> Self {
        let mut coordinator = Self {
            backend,
            output_dir,
            prefix,
            format,
            index: TimelineIndex::new(),
            records: Vec::new(),
        };
        coordinator.rebuild_index();
        coordinator
    }

    pub fn backend(&self) -> Arc<dyn CaptureBackend> {
        self.backend.clone()
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Captured-position markers, sorted ascending.
    pub fn timeline(&self) -> &TimelineIndex {
        &self.index
    }

    /// Frames captured or recovered this session, in capture order.
    pub fn records(&self) -> &[FrameRecord] {
        &self.records
    }

    /// Validate preconditions and build the request for one capture.
    pub fn begin_capture(
        &self,
        video_path: Option<&Path>,
        status: MediaStatus,
        position_ms: u64,
    ) -> Result<CaptureRequest, CaptureError> {
        let video_path = match video_path {
            Some(path) if status.is_active() => path.to_path_buf(),
            _ => return Err(CaptureError::NoActiveMedia),
        };

        Ok(CaptureRequest {
            position_ms,
            prefix: self.prefix.clone(),
            format: self.format,
            output_dir: self.output_dir.clone(),
            video_path,
        })
    }

    /// Apply a finished backend invocation: write buffer artifacts to
    /// disk, then record the frame and update the timeline.
    pub fn complete(
        &mut self,
        request: &CaptureRequest,
        result: Result<CaptureArtifact, CaptureError>,
    ) -> CaptureOutcome {
        let (width, height) = match result {
            Ok(CaptureArtifact::Encoded {
                data,
                width,
                height,
            }) => {
                let path = request.output_path();
                if let Err(source) = std::fs::create_dir_all(&request.output_dir) {
                    error!("Could not create output directory {:?}: {}", request.output_dir, source);
                    return CaptureOutcome::Failed(CaptureError::WriteFailure { path, source });
                }
                if let Err(source) = std::fs::write(&path, &data) {
                    error!("Could not write frame to {:?}: {}", path, source);
                    return CaptureOutcome::Failed(CaptureError::WriteFailure { path, source });
                }
                (width, height)
            }
            Ok(CaptureArtifact::WrittenToDisk { width, height }) => (width, height),
            Err(e) => {
                error!("Capture at {}ms failed: {}", request.position_ms, e);
                return CaptureOutcome::Failed(e);
            }
        };

        let record = FrameRecord {
            position_ms: request.position_ms,
            filename: request.filename(),
            width,
            height,
        };
        info!(
            "Saved frame {} ({}x{}) via {} backend",
            record.filename,
            width,
            height,
            self.backend.name()
        );
        self.records.push(record.clone());
        self.index.insert(record.position_ms);
        CaptureOutcome::Saved(record)
    }

    /// Run one capture to completion inline. The session uses this for the
    /// buffer backend; external-tool captures are detached instead and fed
    /// back through [`Self::complete`].
    pub async fn capture_frame(
        &mut self,
        video_path: Option<&Path>,
        status: MediaStatus,
        position_ms: u64,
    ) -> CaptureOutcome {
        let request = match self.begin_capture(video_path, status, position_ms) {
            Ok(request) => request,
            Err(e) => return CaptureOutcome::Failed(e),
        };
        let backend = self.backend.clone();
        let result = backend.capture(&request).await;
        self.complete(&request, result)
    }

    /// Point captures at a different directory; the index is rebuilt
    /// wholesale since its key changed.
    pub fn set_output_dir(&mut self, output_dir: PathBuf) {
        self.output_dir = output_dir;
        self.rebuild_index();
    }

    /// Change the filename prefix; the index is rebuilt wholesale since
    /// its key changed.
    pub fn set_prefix(&mut self, prefix: String) {
        self.prefix = prefix;
        self.rebuild_index();
    }

    pub fn set_format(&mut self, format: ImageFormat) {
        self.format = format;
    }

    /// Rescan the output directory for previously captured positions.
    pub fn rebuild_index(&mut self) -> usize {
        match self.index.rebuild(&self.output_dir, &self.prefix) {
            Ok(count) => count,
            Err(e) => {
                warn!("Timeline rescan of {:?} failed: {}", self.output_dir, e);
                0
            }
        }
    }

    /// Drop a frame from the visible list. The file is left on disk, so
    /// its timeline marker stays until the file itself is deleted and the
    /// directory rescanned.
    pub fn remove_record(&mut self, filename: &str) -> Option<FrameRecord> {
        let at = self.records.iter().position(|r| r.filename == filename)?;
        Some(self.records.remove(at))
    }

    /// Clear the visible frame list. Files and timeline markers remain.
    pub fn clear_records(&mut self) {
        self.records.clear();
    }
}
