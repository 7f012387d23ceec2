//! Accelerating key-repeat frame stepping.
//!
//! Translates held navigation keys into a stream of seek requests with a
//! tap-versus-hold initial delay and progressive acceleration. The
//! controller is a pure state machine: it owns no timer and issues no
//! calls itself, it returns a [`StepPlan`] that the session event loop
//! applies (pause playback, forward the seek, arm or cancel its tick
//! timer). None of its operations can fail.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Coarse seek step per issued seek, in milliseconds. Deliberately larger
/// than one native video frame so successive seeks reliably land on
/// different decoded samples; frame-exact granularity is a non-goal.
pub const STEP_MS: u64 = 50;

/// Repeat interval a fresh hold starts from.
pub const BASE_INTERVAL: Duration = Duration::from_millis(200);

/// Delay before the first repeat, distinguishing a tap from a hold.
pub const INITIAL_DELAY: Duration = Duration::from_millis(500);

/// How much the repeat interval shrinks per tick.
pub const ACCEL_DECREMENT: Duration = Duration::from_millis(10);

/// Fastest repeat interval the acceleration reaches.
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Minimum spacing between seeks reaching the playback engine. Independent
/// of the repeat interval; closer requests are suppressed so the engine is
/// never saturated.
pub const MIN_SEEK_SPACING: Duration = Duration::from_millis(30);

/// Stepping direction of a held navigation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirection {
    Forward,
    Backward,
}

/// What the event loop should do with its stepping timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Leave the timer as it is.
    Keep,
    /// (Re-)arm the timer to fire once after this delay.
    Arm(Duration),
    /// Cancel the timer; no further ticks for this activation.
    Cancel,
}

/// Instructions produced by one controller transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPlan {
    /// Pause the playback engine before seeking.
    pub pause_playback: bool,
    /// Seek target to forward to the playback engine, unless throttled.
    pub seek_to: Option<u64>,
    pub timer: TimerAction,
}

impl StepPlan {
    fn noop() -> Self {
        Self {
            pause_playback: false,
            seek_to: None,
            timer: TimerAction::Keep,
        }
    }
}

/// Key-repeat stepping state machine. At most one direction is active at a
/// time; the state lives only while a key is held.
#[derive(Debug)]
pub struct SteppingController {
    direction: Option<StepDirection>,
    interval: Duration,
    last_seek: Option<Instant>,
}

impl Default for SteppingController {
    fn default() -> Self {
        Self::new()
    }
}

impl SteppingController {
    pub fn new() -> Self {
        Self {
            direction: None,
            interval: BASE_INTERVAL,
            last_seek: None,
        }
    }

    /// Currently active stepping direction, if any.
    pub fn direction(&self) -> Option<StepDirection> {
        self.direction
    }

    /// Key pressed for `direction`.
    ///
    /// Repeated key-down events for the already active direction (OS
    /// auto-repeat) are no-ops; the stepping timer drives the repeats. A
    /// key-down for the opposite direction cancels it first, then starts a
    /// fresh hold.
    pub fn key_down(
        &mut self,
        direction: StepDirection,
        playing: bool,
        position_ms: u64,
        duration_ms: u64,
        now: Instant,
    ) -> StepPlan {
        if self.direction == Some(direction) {
            return StepPlan::noop();
        }
        if let Some(previous) = self.direction {
            debug!("Switching stepping direction {:?} -> {:?}", previous, direction);
        }

        self.direction = Some(direction);
        self.interval = BASE_INTERVAL;
        let seek_to = self.issue_seek(direction, position_ms, duration_ms, now);

        debug!("Started {:?} stepping", direction);
        StepPlan {
            pause_playback: playing,
            seek_to,
            timer: TimerAction::Arm(INITIAL_DELAY),
        }
    }

    /// Stepping timer fired.
    pub fn tick(&mut self, position_ms: u64, duration_ms: u64, now: Instant) -> StepPlan {
        let Some(direction) = self.direction else {
            // No direction active; the timer should not have fired.
            debug!("Stepping tick with no active direction, stopping timer");
            return StepPlan {
                pause_playback: false,
                seek_to: None,
                timer: TimerAction::Cancel,
            };
        };

        let seek_to = self.issue_seek(direction, position_ms, duration_ms, now);

        if self.interval > MIN_INTERVAL {
            self.interval = MIN_INTERVAL.max(self.interval.saturating_sub(ACCEL_DECREMENT));
            trace!("Accelerated stepping interval to {:?}", self.interval);
        }

        StepPlan {
            pause_playback: false,
            seek_to,
            timer: TimerAction::Arm(self.interval),
        }
    }

    /// Key released for `direction`. Releasing a non-active direction is a
    /// no-op.
    pub fn key_up(&mut self, direction: StepDirection) -> StepPlan {
        if self.direction != Some(direction) {
            return StepPlan::noop();
        }

        debug!("Stopped {:?} stepping", direction);
        self.direction = None;
        self.interval = BASE_INTERVAL;
        StepPlan {
            pause_playback: false,
            seek_to: None,
            timer: TimerAction::Cancel,
        }
    }

    /// Compute the clamped seek target, suppressing it when the previous
    /// issued seek was less than [`MIN_SEEK_SPACING`] ago.
    fn issue_seek(
        &mut self,
        direction: StepDirection,
        position_ms: u64,
        duration_ms: u64,
        now: Instant,
    ) -> Option<u64> {
        if let Some(last) = self.last_seek {
            if now.duration_since(last) < MIN_SEEK_SPACING {
                trace!("Seek suppressed by throttle");
                return None;
            }
        }
        self.last_seek = Some(now);

        let target = match direction {
            StepDirection::Forward => position_ms.saturating_add(STEP_MS).min(duration_ms),
            StepDirection::Backward => position_ms.saturating_sub(STEP_MS),
        };
        trace!("Stepping {:?}: {}ms -> {}ms", direction, position_ms, target);
        Some(target)
    }
}
