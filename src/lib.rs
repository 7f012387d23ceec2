//! framepick - frame-by-frame video navigation and still-frame capture.
//!
//! The embeddable core of a video annotation picker: an operator steps
//! through a loaded video with accelerating key-repeat seeking and
//! persists chosen frames as still images for dataset building. The host
//! application owns the widgets and the actual playback engine and talks
//! to the core through [`player::Player`], [`player::FrameStore`] and the
//! [`session::Session`] command/notification channels.
//!
//! Captures go through one of two backends, selected once at startup: an
//! external ffmpeg subprocess when available, otherwise the most recent
//! decoded frame from the rendering surface. Capture filenames encode the
//! playback position, and a directory scan recovers timestamps from
//! current and legacy filename formats to render timeline markers.

pub mod capture;
pub mod error;
pub mod logging;
pub mod naming;
pub mod player;
pub mod session;
pub mod settings;
pub mod stepping;
pub mod timeline;

pub use capture::{CaptureCoordinator, CaptureOutcome, CaptureRequest, FrameRecord};
pub use error::CaptureError;
pub use player::{FrameBuffer, FrameStore, MediaStatus, Player, PlayerEvent};
pub use session::{Session, SessionCommand, SessionHandle, SessionNote};
pub use settings::Settings;
pub use stepping::{StepDirection, SteppingController};
pub use timeline::TimelineIndex;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
