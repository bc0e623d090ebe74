//! Playback state machine and the shared run state.
//!
//! [`PlaybackState`] is the single owner of [`RunState`] (phase plus step
//! interval). It is shared between the command path (HTTP / `WebSocket`
//! handlers, through the [`PlaybackController`]) and the streaming loop.
//!
//! # Architecture
//!
//! The run state sits in a [`tokio::sync::watch`] channel. Every mutation
//! goes through `send_if_modified`, so a phase check and the transition it
//! guards happen under one lock and readers never see a torn
//! phase/interval pair. The streaming loop holds a receiver, reads the
//! state once at the top of each iteration, and is woken from its sleep as
//! soon as the phase changes.
//!
//! | Phase   | `start` | `pause` | `reset` | `speed(f)` |
//! |---------|---------|---------|---------|------------|
//! | Idle    | spawn   | --      | --      | retime     |
//! | Running | --      | Paused  | Stopped | retime     |
//! | Paused  | Running | --      | Stopped | retime     |
//! | Stopped | spawn   | --      | --      | retime     |
//!
//! [`PlaybackController`]: crate::controller::PlaybackController

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use vegha_types::{Phase, PlaybackCommand};

use crate::adapter::AdapterError;

/// Errors returned by playback commands.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlaybackError {
    /// The speed factor was zero, negative, non-finite, or so large the
    /// interval rounds to nothing.
    #[error("invalid speed factor {factor}: must be a positive, finite number")]
    InvalidSpeed {
        /// The rejected factor.
        factor: f64,
    },

    /// Network bounds were requested while no run is active.
    #[error("simulation not running")]
    BoundsUnavailable,

    /// The simulator could not be started.
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

/// Phase plus cadence, read together by the streaming loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunState {
    /// Current playback phase.
    pub phase: Phase,
    /// Sleep between steps (and between pause re-checks).
    pub step_interval: Duration,
}

/// What a command does in the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Start a fresh run with a new streaming loop.
    Spawn,
    /// Continue the paused run on its existing loop.
    Resume,
    /// Running to Paused.
    Pause,
    /// Running or Paused to Stopped.
    Stop,
    /// Change the step interval; the phase is untouched.
    Retime,
    /// Nothing to do in this phase.
    Ignore,
}

/// The playback transition table.
pub const fn transition(phase: Phase, command: &PlaybackCommand) -> Transition {
    match (phase, command) {
        (_, PlaybackCommand::Speed(_)) => Transition::Retime,
        (Phase::Idle | Phase::Stopped, PlaybackCommand::Start) => Transition::Spawn,
        (Phase::Paused, PlaybackCommand::Start) => Transition::Resume,
        (Phase::Running, PlaybackCommand::Pause) => Transition::Pause,
        (Phase::Running | Phase::Paused, PlaybackCommand::Reset) => Transition::Stop,
        _ => Transition::Ignore,
    }
}

/// Step interval for a speed multiplier: `base / factor`.
pub fn interval_for(base: Duration, factor: f64) -> Result<Duration, PlaybackError> {
    if !factor.is_finite() || factor <= 0.0 {
        return Err(PlaybackError::InvalidSpeed { factor });
    }
    Duration::try_from_secs_f64(base.as_secs_f64() / factor)
        .ok()
        .filter(|interval| !interval.is_zero())
        .ok_or(PlaybackError::InvalidSpeed { factor })
}

/// Shared owner of the run state.
#[derive(Debug)]
pub struct PlaybackState {
    /// Phase and interval. The sender is the only writer.
    tx: watch::Sender<RunState>,

    /// Interval at speed 1x.
    base_interval: Duration,

    /// Steps completed in the current (or last) run.
    steps_completed: AtomicU64,
}

impl PlaybackState {
    /// Create an idle state stepping at `base_interval`.
    pub fn new(base_interval: Duration) -> Self {
        let (tx, _) = watch::channel(RunState {
            phase: Phase::Idle,
            step_interval: base_interval,
        });
        Self {
            tx,
            base_interval,
            steps_completed: AtomicU64::new(0),
        }
    }

    /// Current phase and interval.
    pub fn run_state(&self) -> RunState {
        *self.tx.borrow()
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.tx.borrow().phase
    }

    /// Current step interval.
    pub fn step_interval(&self) -> Duration {
        self.tx.borrow().step_interval
    }

    /// Interval at speed 1x.
    pub const fn base_interval(&self) -> Duration {
        self.base_interval
    }

    /// Effective speed multiplier (`base / interval`).
    pub fn speed_factor(&self) -> f64 {
        self.base_interval.as_secs_f64() / self.step_interval().as_secs_f64()
    }

    /// Steps completed in the current (or last) run.
    pub fn steps_completed(&self) -> u64 {
        self.steps_completed.load(Ordering::Acquire)
    }

    /// Watch the run state. The receiver starts out marked as seen.
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.tx.subscribe()
    }

    /// Set the speed multiplier. Returns the previous interval.
    ///
    /// Non-positive factors are rejected and the interval is kept.
    pub fn set_speed(&self, factor: f64) -> Result<Duration, PlaybackError> {
        let interval = interval_for(self.base_interval, factor)?;
        let mut previous = interval;
        self.tx.send_modify(|run| {
            previous = run.step_interval;
            run.step_interval = interval;
        });
        Ok(previous)
    }

    /// Apply a phase command (`pause`, `reset`, or `start` on a paused run).
    ///
    /// Returns the transition taken. [`Transition::Spawn`] is reported but
    /// not applied: spawning a loop is the controller's job, see
    /// [`begin_run`](Self::begin_run).
    pub(crate) fn apply(&self, command: &PlaybackCommand) -> Transition {
        let mut taken = Transition::Ignore;
        self.tx.send_if_modified(|run| {
            taken = transition(run.phase, command);
            match taken {
                Transition::Resume => run.phase = Phase::Running,
                Transition::Pause => run.phase = Phase::Paused,
                Transition::Stop => run.phase = Phase::Stopped,
                Transition::Spawn | Transition::Retime | Transition::Ignore => return false,
            }
            true
        });
        taken
    }

    /// Enter Running for a fresh run with the step counter at zero.
    pub(crate) fn begin_run(&self) {
        self.steps_completed.store(0, Ordering::Release);
        self.tx.send_modify(|run| run.phase = Phase::Running);
    }

    /// Record the number of steps completed so far in this run.
    pub(crate) fn record_step(&self, completed: u64) {
        self.steps_completed.store(completed, Ordering::Release);
    }

    /// Enter Stopped at the end of a run, whatever the current phase.
    pub(crate) fn finish_run(&self) {
        self.tx.send_if_modified(|run| {
            if run.phase == Phase::Stopped {
                return false;
            }
            run.phase = Phase::Stopped;
            true
        });
    }
}
