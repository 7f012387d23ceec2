//! Persisted session settings, stored as TOML.
//!
//! Holds the state that must survive a restart: the last opened video, the
//! capture output directory, the filename prefix and the host's opaque
//! window-geometry blob. Saved on output-directory change, on opening a
//! new video, and at shutdown.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::naming::ImageFormat;

/// Persisted session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path of the most recently opened video, restored on startup.
    #[serde(default)]
    pub last_video_path: Option<PathBuf>,
    /// Directory captured frames are written to.
    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,
    /// Filename prefix for new captures.
    #[serde(default = "default_prefix")]
    pub filename_prefix: String,
    /// Image format new captures are encoded in.
    #[serde(default)]
    pub image_format: ImageFormat,
    /// Opaque window-layout blob owned by the host UI.
    #[serde(default)]
    pub geometry: Option<String>,
    /// Directory the capture journal is written to.
    #[serde(default = "default_journal_dir")]
    pub journal_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            last_video_path: None,
            output_directory: default_output_directory(),
            filename_prefix: default_prefix(),
            image_format: ImageFormat::default(),
            geometry: None,
            journal_dir: default_journal_dir(),
        }
    }
}

fn default_output_directory() -> PathBuf {
    dirs::document_dir()
        .map(|d| d.join("AnnotationFrames"))
        .unwrap_or_else(|| PathBuf::from("AnnotationFrames"))
}

fn default_prefix() -> String {
    "frame".to_string()
}

fn default_journal_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("framepick/logs"))
        .unwrap_or_else(|| PathBuf::from(".framepick/logs"))
}

/// Default settings file location under the platform config directory.
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("framepick/settings.toml"))
        .unwrap_or_else(|| PathBuf::from("framepick-settings.toml"))
}

impl Settings {
    /// Load settings from a TOML file, falling back to defaults when the
    /// file does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings file at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {:?}", path))?;
        let settings: Settings =
            toml::from_str(&content).with_context(|| "Failed to parse settings file")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Persist settings, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings directory: {:?}", parent))?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write settings file: {:?}", path))?;
        debug!("Settings saved to {:?}", path);
        Ok(())
    }

    /// Validate settings values.
    pub fn validate(&self) -> Result<()> {
        if self.filename_prefix.is_empty() {
            anyhow::bail!("Filename prefix cannot be empty");
        }
        if self.filename_prefix.contains(['/', '\\']) {
            anyhow::bail!("Filename prefix cannot contain path separators");
        }
        Ok(())
    }
}
