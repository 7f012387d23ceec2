//! Single-threaded session event loop.
//!
//! All state transitions run here: stepping, capture completion handling,
//! settings and timeline updates. External-tool captures are detached onto
//! a task and their results return through the loop's result channel, so
//! no locking is needed for the follow-up bookkeeping.

use anyhow::Result;
use std::path::PathBuf;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::capture::{
    CaptureArtifact, CaptureBackend, CaptureCoordinator, CaptureOutcome, CaptureRequest,
    FrameRecord,
};
use crate::error::CaptureError;
use crate::logging::CaptureJournal;
use crate::naming;
use crate::player::{FrameStore, MediaStatus, Player, PlayerEvent};
use crate::settings::Settings;
use crate::stepping::{StepDirection, StepPlan, SteppingController, TimerAction};
use std::sync::Arc;

/// Commands from the host UI into the session loop.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    OpenVideo(PathBuf),
    TogglePlayback,
    KeyDown(StepDirection),
    KeyUp(StepDirection),
    SaveFrame,
    SetOutputDirectory(PathBuf),
    SetPrefix(String),
    RemoveFrame(String),
    ClearFrames,
    SetGeometry(String),
    /// A change notification from the playback engine.
    Playback(PlayerEvent),
    Shutdown,
}

/// Notifications from the session loop to the host UI.
#[derive(Debug, Clone)]
pub enum SessionNote {
    /// Transient status-bar text.
    Status(String),
    VideoOpened { path: PathBuf, prefix: String },
    FrameSaved(FrameRecord),
    /// An explicit, user-visible capture failure.
    CaptureFailed(String),
    /// The set of timeline markers changed; positions are sorted.
    TimelineChanged(Vec<u64>),
}

/// Cloneable handle the host uses to drive a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    notes: broadcast::Sender<SessionNote>,
}

impl SessionHandle {
    pub async fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow::anyhow!("session is no longer running"))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionNote> {
        self.notes.subscribe()
    }
}

type CaptureResult = (CaptureRequest, Result<CaptureArtifact, CaptureError>);

/// The frame navigation and capture session.
pub struct Session<P: Player> {
    player: P,
    frames: FrameStore,
    stepping: SteppingController,
    coordinator: CaptureCoordinator,
    settings: Settings,
    settings_path: PathBuf,
    journal: CaptureJournal,
    commands: mpsc::Receiver<SessionCommand>,
    notes: broadcast::Sender<SessionNote>,
    results_tx: mpsc::Sender<CaptureResult>,
    results_rx: mpsc::Receiver<CaptureResult>,
    tick_deadline: Option<Instant>,
    frames_captured: u64,
}

impl<P: Player> Session<P> {
    /// Create a session, probing external-tool availability once to pick
    /// the capture backend.
    pub async fn new(
        player: P,
        frames: FrameStore,
        settings: Settings,
        settings_path: PathBuf,
    ) -> Result<(Self, SessionHandle)> {
        let backend = crate::capture::select_backend(frames.clone()).await;
        Self::with_backend(player, frames, settings, settings_path, backend)
    }

    /// Create a session with an explicitly chosen capture backend.
    pub fn with_backend(
        player: P,
        frames: FrameStore,
        settings: Settings,
        settings_path: PathBuf,
        backend: Arc<dyn CaptureBackend>,
    ) -> Result<(Self, SessionHandle)> {
        settings.validate()?;
        let coordinator = CaptureCoordinator::new(
            backend,
            settings.output_directory.clone(),
            settings.filename_prefix.clone(),
            settings.image_format,
        );
        let journal = CaptureJournal::new(settings.journal_dir.clone())?;

        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (note_tx, _) = broadcast::channel(64);
        let (results_tx, results_rx) = mpsc::channel(8);

        let handle = SessionHandle {
            commands: cmd_tx,
            notes: note_tx.clone(),
        };
        let session = Self {
            player,
            frames,
            stepping: SteppingController::new(),
            coordinator,
            settings,
            settings_path,
            journal,
            commands: cmd_rx,
            notes: note_tx,
            results_tx,
            results_rx,
            tick_deadline: None,
            frames_captured: 0,
        };
        Ok((session, handle))
    }

    pub fn coordinator(&self) -> &CaptureCoordinator {
        &self.coordinator
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run the event loop until `Shutdown` or the last handle is dropped.
    pub async fn run(mut self) -> Result<()> {
        self.journal.session_start(crate::VERSION)?;
        info!("Session started");

        loop {
            enum Wake {
                Command(Option<SessionCommand>),
                CaptureDone(CaptureResult),
                Tick,
            }

            let deadline = self.tick_deadline;
            let wake = tokio::select! {
                command = self.commands.recv() => Wake::Command(command),
                Some(result) = self.results_rx.recv() => Wake::CaptureDone(result),
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                    if deadline.is_some() => Wake::Tick,
            };

            match wake {
                Wake::Command(None) | Wake::Command(Some(SessionCommand::Shutdown)) => break,
                Wake::Command(Some(command)) => self.handle_command(command).await,
                Wake::CaptureDone((request, result)) => self.finish_capture(request, result),
                Wake::Tick => {
                    let plan = self.stepping.tick(
                        self.player.position_ms(),
                        self.player.duration_ms(),
                        Instant::now(),
                    );
                    self.apply_step_plan(plan);
                }
            }
        }

        info!("Session shutting down, {} frames captured", self.frames_captured);
        self.journal.session_end(self.frames_captured)?;
        self.save_settings();
        Ok(())
    }

    /// Apply one host command. Exposed so embedding hosts and tests can
    /// drive a session without the loop.
    pub async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::OpenVideo(path) => self.open_video(path),
            SessionCommand::TogglePlayback => self.toggle_playback(),
            SessionCommand::KeyDown(direction) => self.key_down(direction),
            SessionCommand::KeyUp(direction) => {
                let plan = self.stepping.key_up(direction);
                self.apply_step_plan(plan);
            }
            SessionCommand::SaveFrame => self.save_frame().await,
            SessionCommand::SetOutputDirectory(dir) => {
                self.coordinator.set_output_dir(dir.clone());
                self.settings.output_directory = dir;
                self.save_settings();
                self.notify_timeline();
                self.note(SessionNote::Status("Output directory changed".to_string()));
            }
            SessionCommand::SetPrefix(prefix) => {
                if prefix.is_empty() || prefix.contains(['/', '\\']) {
                    self.note(SessionNote::Status("Invalid filename prefix".to_string()));
                    return;
                }
                self.coordinator.set_prefix(prefix.clone());
                self.settings.filename_prefix = prefix;
                self.notify_timeline();
            }
            SessionCommand::RemoveFrame(filename) => {
                if self.coordinator.remove_record(&filename).is_some() {
                    self.note(SessionNote::Status(format!("Removed {}", filename)));
                }
            }
            SessionCommand::ClearFrames => {
                self.coordinator.clear_records();
                self.note(SessionNote::Status("Frame list cleared".to_string()));
            }
            SessionCommand::SetGeometry(blob) => {
                // Persisted at shutdown with the rest of the settings.
                self.settings.geometry = Some(blob);
            }
            SessionCommand::Playback(event) => self.playback_event(event),
            // Only meaningful inside the run loop, which intercepts it.
            SessionCommand::Shutdown => debug!("Shutdown command outside the run loop ignored"),
        }
    }

    fn open_video(&mut self, path: PathBuf) {
        let prefix = naming::infer_prefix(&path);
        info!("Opening video {:?} with prefix {:?}", path, prefix);

        self.player.set_source(&path);
        self.frames.invalidate();
        self.coordinator.set_prefix(prefix.clone());
        self.settings.last_video_path = Some(path.clone());
        self.settings.filename_prefix = prefix.clone();
        self.save_settings();

        if let Err(e) = self.journal.video_opened(path.clone(), &prefix) {
            warn!("Could not journal video open: {}", e);
        }
        self.note(SessionNote::VideoOpened { path, prefix });
        self.notify_timeline();
    }

    fn playback_event(&mut self, event: PlayerEvent) {
        match event {
            PlayerEvent::PositionChanged(position_ms) => {
                trace!("Position changed to {}ms", position_ms);
            }
            PlayerEvent::DurationChanged(duration_ms) => {
                info!(
                    "Video duration: {}ms ({})",
                    duration_ms,
                    format_time(duration_ms)
                );
            }
            PlayerEvent::StatusChanged(status) => {
                debug!("Media status changed to {:?}", status);
                match status {
                    MediaStatus::Loaded => {
                        self.note(SessionNote::Status("Video loaded".to_string()))
                    }
                    MediaStatus::Invalid => {
                        self.note(SessionNote::Status(
                            "Could not load the video file".to_string(),
                        ));
                    }
                    _ => {}
                }
            }
            PlayerEvent::Error(message) => {
                warn!("Playback error: {}", message);
                self.note(SessionNote::Status(format!("Playback error: {}", message)));
            }
        }
    }

    fn toggle_playback(&mut self) {
        if !self.player.status().is_active() {
            self.note(SessionNote::Status("No video loaded".to_string()));
            return;
        }
        if self.player.is_playing() {
            self.player.pause();
            self.note(SessionNote::Status("Paused".to_string()));
        } else {
            self.player.play();
            self.note(SessionNote::Status("Playing".to_string()));
        }
    }

    fn key_down(&mut self, direction: StepDirection) {
        // Stepping needs loaded media with a known duration.
        if !self.player.status().is_active() || self.player.duration_ms() == 0 {
            debug!("Stepping key ignored, no seekable media");
            return;
        }
        let plan = self.stepping.key_down(
            direction,
            self.player.is_playing(),
            self.player.position_ms(),
            self.player.duration_ms(),
            Instant::now(),
        );
        self.apply_step_plan(plan);
    }

    fn apply_step_plan(&mut self, plan: StepPlan) {
        if plan.pause_playback {
            self.player.pause();
        }
        if let Some(target) = plan.seek_to {
            self.player.set_position(target);
        }
        match plan.timer {
            TimerAction::Keep => {}
            TimerAction::Arm(delay) => self.tick_deadline = Some(Instant::now() + delay),
            TimerAction::Cancel => self.tick_deadline = None,
        }
    }

    async fn save_frame(&mut self) {
        let request = match self.coordinator.begin_capture(
            self.settings.last_video_path.as_deref(),
            self.player.status(),
            self.player.position_ms(),
        ) {
            Ok(request) => request,
            Err(e) => {
                self.report_failure(self.player.position_ms(), e);
                return;
            }
        };

        let backend = self.coordinator.backend();
        if backend.runs_detached() {
            // Detached: the subprocess runs to completion on its own and
            // the result re-enters the loop through the results channel.
            // Overlapping requests are deliberately allowed.
            let results_tx = self.results_tx.clone();
            tokio::spawn(async move {
                let result = backend.capture(&request).await;
                let _ = results_tx.send((request, result)).await;
            });
        } else {
            let result = backend.capture(&request).await;
            self.finish_capture(request, result);
        }
    }

    fn finish_capture(
        &mut self,
        request: CaptureRequest,
        result: Result<CaptureArtifact, CaptureError>,
    ) {
        match self.coordinator.complete(&request, result) {
            CaptureOutcome::Saved(record) => {
                self.frames_captured += 1;
                if let Err(e) = self
                    .journal
                    .frame_saved(&record, self.coordinator.backend().name())
                {
                    warn!("Could not journal saved frame: {}", e);
                }
                self.note(SessionNote::Status(format!(
                    "Frame saved: {}",
                    format_time(record.position_ms)
                )));
                self.note(SessionNote::FrameSaved(record));
                self.notify_timeline();
            }
            CaptureOutcome::Failed(e) => self.report_failure(request.position_ms, e),
        }
    }

    fn report_failure(&mut self, position_ms: u64, error: CaptureError) {
        if let Err(e) = self.journal.capture_failed(position_ms, &error.to_string()) {
            warn!("Could not journal capture failure: {}", e);
        }
        if error.user_visible() {
            self.note(SessionNote::CaptureFailed(error.to_string()));
        } else {
            self.note(SessionNote::Status(format!("Frame not saved: {}", error)));
        }
    }

    fn notify_timeline(&self) {
        self.note(SessionNote::TimelineChanged(
            self.coordinator.timeline().positions().to_vec(),
        ));
    }

    fn note(&self, note: SessionNote) {
        // Nobody listening is fine; notes are best-effort.
        let _ = self.notes.send(note);
    }

    fn save_settings(&self) {
        if let Err(e) = self.settings.save(&self.settings_path) {
            warn!("Could not save settings: {}", e);
        }
    }
}

/// Format a millisecond position as `MM:SS`, or `H:MM:SS` past an hour.
pub fn format_time(position_ms: u64) -> String {
    let seconds = position_ms / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes % 60, seconds % 60)
    } else {
        format!("{:02}:{:02}", minutes % 60, seconds % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::BufferBackend;
    use crate::naming::ImageFormat;
    use crate::player::{FrameBuffer, MediaStatus};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct PlayerState {
        source: Option<PathBuf>,
        playing: bool,
        position_ms: u64,
        duration_ms: u64,
        status: MediaStatus,
        seeks: Vec<u64>,
    }

    /// Scripted playback engine recording every call.
    #[derive(Debug, Clone, Default)]
    struct FakePlayer(Arc<Mutex<PlayerState>>);

    impl FakePlayer {
        fn loaded(duration_ms: u64, position_ms: u64) -> Self {
            let player = Self::default();
            {
                let mut state = player.0.lock().unwrap();
                state.status = MediaStatus::Loaded;
                state.duration_ms = duration_ms;
                state.position_ms = position_ms;
            }
            player
        }

        fn state(&self) -> std::sync::MutexGuard<'_, PlayerState> {
            self.0.lock().unwrap()
        }
    }

    impl Player for FakePlayer {
        fn set_source(&mut self, path: &std::path::Path) {
            let mut state = self.0.lock().unwrap();
            state.source = Some(path.to_path_buf());
            state.status = MediaStatus::Loaded;
        }
        fn play(&mut self) {
            self.0.lock().unwrap().playing = true;
        }
        fn pause(&mut self) {
            self.0.lock().unwrap().playing = false;
        }
        fn set_position(&mut self, position_ms: u64) {
            let mut state = self.0.lock().unwrap();
            state.position_ms = position_ms;
            state.seeks.push(position_ms);
        }
        fn position_ms(&self) -> u64 {
            self.0.lock().unwrap().position_ms
        }
        fn duration_ms(&self) -> u64 {
            self.0.lock().unwrap().duration_ms
        }
        fn status(&self) -> MediaStatus {
            self.0.lock().unwrap().status
        }
        fn is_playing(&self) -> bool {
            self.0.lock().unwrap().playing
        }
    }

    struct Fixture {
        session: Session<FakePlayer>,
        player: FakePlayer,
        store: FrameStore,
        _dir: tempfile::TempDir,
    }

    fn fixture(player: FakePlayer) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = FrameStore::new();
        let mut settings = Settings::default();
        settings.output_directory = dir.path().join("frames");
        settings.journal_dir = dir.path().join("logs");
        settings.filename_prefix = "clip".to_string();
        settings.image_format = ImageFormat::Png;
        settings.last_video_path = Some(PathBuf::from("/videos/clip.mp4"));

        let (session, _handle) = Session::with_backend(
            player.clone(),
            store.clone(),
            settings,
            dir.path().join("settings.toml"),
            Arc::new(BufferBackend::new(store.clone())),
        )
        .unwrap();

        Fixture {
            session,
            player,
            store,
            _dir: dir,
        }
    }

    fn publish_frame(store: &FrameStore) {
        store.publish(FrameBuffer {
            width: 16,
            height: 8,
            pixels: vec![42; 16 * 8 * 4],
        });
    }

    #[tokio::test(start_paused = true)]
    async fn save_frame_writes_file_and_updates_timeline() {
        let mut fx = fixture(FakePlayer::loaded(120_000, 12_345));
        publish_frame(&fx.store);

        fx.session.handle_command(SessionCommand::SaveFrame).await;

        let records = fx.session.coordinator().records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].filename, "clip_12345.png");
        assert!(fx
            .session
            .settings()
            .output_directory
            .join("clip_12345.png")
            .is_file());
        assert_eq!(fx.session.coordinator().timeline().positions(), &[12_345]);
    }

    #[tokio::test(start_paused = true)]
    async fn save_frame_without_media_fails_softly() {
        let mut fx = fixture(FakePlayer::default());

        fx.session.handle_command(SessionCommand::SaveFrame).await;

        assert!(fx.session.coordinator().records().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn key_down_pauses_and_seeks_forward() {
        let player = FakePlayer::loaded(120_000, 1_000);
        player.state().playing = true;
        let mut fx = fixture(player);

        fx.session
            .handle_command(SessionCommand::KeyDown(StepDirection::Forward))
            .await;

        let state = fx.player.state();
        assert!(!state.playing);
        assert_eq!(state.seeks, vec![1_050]);
    }

    #[tokio::test(start_paused = true)]
    async fn key_events_ignored_without_media() {
        let mut fx = fixture(FakePlayer::default());

        fx.session
            .handle_command(SessionCommand::KeyDown(StepDirection::Forward))
            .await;

        assert!(fx.player.state().seeks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn open_video_infers_prefix_and_saves_settings() {
        let mut fx = fixture(FakePlayer::default());

        fx.session
            .handle_command(SessionCommand::OpenVideo(PathBuf::from(
                "/videos/dQw4w9WgXcQ_music.mp4",
            )))
            .await;

        assert_eq!(fx.session.settings().filename_prefix, "dQw4w9WgXcQ");
        assert_eq!(fx.session.coordinator().prefix(), "dQw4w9WgXcQ");
        assert_eq!(
            fx.player.state().source.as_deref(),
            Some(std::path::Path::new("/videos/dQw4w9WgXcQ_music.mp4"))
        );
        // Settings were persisted on open.
        let saved = Settings::load(&fx._dir.path().join("settings.toml")).unwrap();
        assert_eq!(saved.filename_prefix, "dQw4w9WgXcQ");
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_playback_flips_state() {
        let mut fx = fixture(FakePlayer::loaded(120_000, 0));

        fx.session
            .handle_command(SessionCommand::TogglePlayback)
            .await;
        assert!(fx.player.state().playing);

        fx.session
            .handle_command(SessionCommand::TogglePlayback)
            .await;
        assert!(!fx.player.state().playing);
    }

    #[tokio::test(start_paused = true)]
    async fn key_hold_arms_timer_and_release_cancels_it() {
        let mut fx = fixture(FakePlayer::loaded(120_000, 0));

        fx.session
            .handle_command(SessionCommand::KeyDown(StepDirection::Forward))
            .await;
        assert!(fx.session.tick_deadline.is_some());

        fx.session
            .handle_command(SessionCommand::KeyUp(StepDirection::Forward))
            .await;
        assert!(fx.session.tick_deadline.is_none());
        assert_eq!(fx.player.state().seeks.len(), 1);
    }

    #[test]
    fn format_time_matches_display_convention() {
        assert_eq!(format_time(0), "00:00");
        assert_eq!(format_time(59_000), "00:59");
        assert_eq!(format_time(90_000), "01:30");
        assert_eq!(format_time(3_600_000), "1:00:00");
        assert_eq!(format_time(3_725_000), "1:02:05");
    }
}
