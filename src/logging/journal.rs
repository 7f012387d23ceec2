//! JSONL journal of capture activity.
//!
//! One line per event, one file per day. The journal is the durable record
//! of what was captured and why captures failed; transient status notes to
//! the operator are separate.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::debug;

/// Journal event types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JournalEvent {
    SessionStart {
        timestamp: DateTime<Utc>,
        version: String,
    },
    SessionEnd {
        timestamp: DateTime<Utc>,
        frames_captured: u64,
    },
    VideoOpened {
        timestamp: DateTime<Utc>,
        path: PathBuf,
        prefix: String,
    },
    FrameSaved {
        timestamp: DateTime<Utc>,
        position_ms: u64,
        filename: String,
        width: u32,
        height: u32,
        backend: String,
    },
    CaptureFailed {
        timestamp: DateTime<Utc>,
        position_ms: u64,
        reason: String,
    },
}

/// Daily-rotated JSONL writer.
pub struct CaptureJournal {
    journal_dir: PathBuf,
    current_file: Option<BufWriter<File>>,
    current_date: Option<String>,
}

impl CaptureJournal {
    pub fn new(journal_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&journal_dir)
            .with_context(|| format!("Failed to create journal directory: {:?}", journal_dir))?;

        Ok(Self {
            journal_dir,
            current_file: None,
            current_date: None,
        })
    }

    /// Get or create the journal file for today.
    fn get_writer(&mut self) -> Result<&mut BufWriter<File>> {
        let today = Local::now().format("%Y-%m-%d").to_string();

        if self.current_date.as_ref() != Some(&today) {
            let path = self.journal_dir.join(format!("{}.jsonl", today));
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open journal file: {:?}", path))?;

            self.current_file = Some(BufWriter::new(file));
            self.current_date = Some(today);
            debug!("Opened journal file: {:?}", path);
        }

        self.current_file
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("No journal file available"))
    }

    /// Append one event line.
    pub fn record(&mut self, event: &JournalEvent) -> Result<()> {
        let line = serde_json::to_string(event)?;
        let writer = self.get_writer()?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }

    pub fn session_start(&mut self, version: &str) -> Result<()> {
        self.record(&JournalEvent::SessionStart {
            timestamp: Utc::now(),
            version: version.to_string(),
        })
    }

    pub fn session_end(&mut self, frames_captured: u64) -> Result<()> {
        self.record(&JournalEvent::SessionEnd {
            timestamp: Utc::now(),
            frames_captured,
        })
    }

    pub fn video_opened(&mut self, path: PathBuf, prefix: &str) -> Result<()> {
        self.record(&JournalEvent::VideoOpened {
            timestamp: Utc::now(),
            path,
            prefix: prefix.to_string(),
        })
    }

    pub fn frame_saved(&mut self, record: &crate::capture::FrameRecord, backend: &str) -> Result<()> {
        self.record(&JournalEvent::FrameSaved {
            timestamp: Utc::now(),
            position_ms: record.position_ms,
            filename: record.filename.clone(),
            width: record.width,
            height: record.height,
            backend: backend.to_string(),
        })
    }

    pub fn capture_failed(&mut self, position_ms: u64, reason: &str) -> Result<()> {
        self.record(&JournalEvent::CaptureFailed {
            timestamp: Utc::now(),
            position_ms,
            reason: reason.to_string(),
        })
    }
}

impl Drop for CaptureJournal {
    fn drop(&mut self) {
        if let Some(ref mut writer) = self.current_file {
            let _ = writer.flush();
        }
    }
}
