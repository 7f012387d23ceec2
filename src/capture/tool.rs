//! Capture backend invoking an external ffmpeg subprocess.
//!
//! Extracts exactly one frame at the requested position, writing the file
//! directly to the output path. Availability is probed once with a bounded
//! wait; a launched extraction runs to completion with no further timeout
//! or cancellation.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::capture::{CaptureArtifact, CaptureBackend, CaptureRequest};
use crate::error::CaptureError;

/// Executable name resolved through `PATH`.
const FFMPEG_PROGRAM: &str = "ffmpeg";

/// Bounded wait for the availability probe. A tool that cannot answer a
/// version query in this window is treated as unavailable.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// JPEG-scale quality level passed as `-q:v` (2 is near-lossless).
const QUALITY_LEVEL: &str = "2";

/// Backend extracting single frames with an ffmpeg subprocess.
pub struct FfmpegBackend {
    program: String,
}

impl FfmpegBackend {
    /// Probe tool availability and construct the backend.
    ///
    /// Runs `ffmpeg -version` with a bounded wait. Spawn failure, non-zero
    /// exit, or a timed-out probe all yield [`CaptureError::ToolUnavailable`].
    pub async fn detect() -> Result<Self, CaptureError> {
        Self::detect_program(FFMPEG_PROGRAM).await
    }

    /// Probe a specific executable. Used by `detect` and by tests.
    pub async fn detect_program(program: &str) -> Result<Self, CaptureError> {
        let probe = Command::new(program)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match tokio::time::timeout(PROBE_TIMEOUT, probe).await {
            Ok(Ok(status)) if status.success() => {
                info!("External extraction tool available: {}", program);
                Ok(Self {
                    program: program.to_string(),
                })
            }
            Ok(Ok(status)) => {
                warn!("Tool probe exited with {}: {}", status, program);
                Err(CaptureError::ToolUnavailable)
            }
            Ok(Err(e)) => {
                debug!("Tool probe could not spawn {}: {}", program, e);
                Err(CaptureError::ToolUnavailable)
            }
            Err(_) => {
                warn!("Tool probe timed out after {:?}: {}", PROBE_TIMEOUT, program);
                Err(CaptureError::ToolUnavailable)
            }
        }
    }
}

#[async_trait]
impl CaptureBackend for FfmpegBackend {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn runs_detached(&self) -> bool {
        true
    }

    async fn capture(&self, request: &CaptureRequest) -> Result<CaptureArtifact, CaptureError> {
        let output_path = request.output_path();
        let seconds = request.position_ms as f64 / 1000.0;

        debug!(
            "Extracting frame at {:.3}s from {:?} to {:?}",
            seconds, request.video_path, output_path
        );

        let output = Command::new(&self.program)
            .arg("-loglevel")
            .arg("error")
            .arg("-ss")
            .arg(format!("{seconds:.3}"))
            .arg("-i")
            .arg(&request.video_path)
            .arg("-frames:v")
            .arg("1")
            .arg("-q:v")
            .arg(QUALITY_LEVEL)
            .arg("-y")
            .arg(&output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| CaptureError::ToolExecutionFailure {
                stderr: format!("failed to spawn {}: {}", self.program, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(CaptureError::ToolExecutionFailure { stderr });
        }

        // The tool wrote the file itself; read the dimensions back from
        // its header for the frame record.
        let (width, height) = match image::image_dimensions(&output_path) {
            Ok(dims) => dims,
            Err(e) => {
                warn!("Could not read dimensions of {:?}: {}", output_path, e);
                (0, 0)
            }
        };

        Ok(CaptureArtifact::WrittenToDisk { width, height })
    }
}
