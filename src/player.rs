//! External playback and rendering-surface contracts.
//!
//! The playback engine and the video widget are owned by the host
//! application; the core consumes them only through the narrow interfaces
//! defined here.

use std::path::Path;
use std::sync::{Arc, Mutex};

/// Load status of the playback engine, mirrored from the host's media
/// status notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaStatus {
    #[default]
    NoMedia,
    Loading,
    Loaded,
    Ended,
    Invalid,
}

impl MediaStatus {
    /// Whether a capture or seek can target the current media.
    pub fn is_active(&self) -> bool {
        matches!(self, MediaStatus::Loaded | MediaStatus::Ended)
    }
}

/// Position/duration/seek contract of the external playback engine.
///
/// All calls are issued from the session's event-loop thread. Seeks are
/// best-effort: the engine may land on the nearest keyframe-aligned sample.
pub trait Player {
    fn set_source(&mut self, path: &Path);
    fn play(&mut self);
    fn pause(&mut self);
    fn set_position(&mut self, position_ms: u64);
    fn position_ms(&self) -> u64;
    fn duration_ms(&self) -> u64;
    fn status(&self) -> MediaStatus;
    fn is_playing(&self) -> bool;
}

/// Change notifications from the playback engine, forwarded by the host
/// into the session loop.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    PositionChanged(u64),
    DurationChanged(u64),
    StatusChanged(MediaStatus),
    Error(String),
}

/// One decoded video frame as delivered by the rendering surface.
///
/// Pixels are tightly packed RGBA8, row-major.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl FrameBuffer {
    /// A buffer is valid when its dimensions are non-zero and the pixel
    /// data length matches them exactly.
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.pixels.len() == (self.width as usize) * (self.height as usize) * 4
    }
}

/// Single-slot, last-writer-wins cell holding the most recent decoded
/// frame.
///
/// The rendering pipeline publishes into it at frame rate; the buffer
/// capture backend reads it on demand. Both sides run on the session's
/// event-loop thread, so the slot needs no ordering guarantees beyond
/// last-writer-wins.
#[derive(Debug, Clone, Default)]
pub struct FrameStore {
    slot: Arc<Mutex<Option<FrameBuffer>>>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a newly decoded frame, replacing whatever was there.
    ///
    /// Called 30-60 times per second during playback, so it does nothing
    /// but swap the slot.
    pub fn publish(&self, frame: FrameBuffer) {
        *self.slot.lock().expect("frame slot poisoned") = Some(frame);
    }

    /// Clone of the most recent frame, if any has ever been delivered.
    pub fn snapshot(&self) -> Option<FrameBuffer> {
        self.slot.lock().expect("frame slot poisoned").clone()
    }

    /// Drop the current frame, e.g. when a new video is loaded.
    pub fn invalidate(&self) {
        *self.slot.lock().expect("frame slot poisoned") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba_frame(width: u32, height: u32, value: u8) -> FrameBuffer {
        FrameBuffer {
            width,
            height,
            pixels: vec![value; (width * height * 4) as usize],
        }
    }

    #[test]
    fn store_is_last_writer_wins() {
        let store = FrameStore::new();
        assert!(store.snapshot().is_none());

        store.publish(rgba_frame(2, 2, 1));
        store.publish(rgba_frame(4, 2, 9));

        let frame = store.snapshot().unwrap();
        assert_eq!((frame.width, frame.height), (4, 2));
        assert_eq!(frame.pixels[0], 9);
    }

    #[test]
    fn invalidate_clears_slot() {
        let store = FrameStore::new();
        store.publish(rgba_frame(2, 2, 1));
        store.invalidate();
        assert!(store.snapshot().is_none());
    }

    #[test]
    fn buffer_validity() {
        assert!(rgba_frame(2, 2, 0).is_valid());
        assert!(!FrameBuffer {
            width: 2,
            height: 2,
            pixels: vec![0; 3],
        }
        .is_valid());
        assert!(!rgba_frame(0, 2, 0).is_valid());
    }
}
