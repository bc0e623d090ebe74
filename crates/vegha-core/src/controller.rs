//! Run lifecycle: connecting, spawning and reaping streaming loops.
//!
//! [`PlaybackController`] is what the command surfaces talk to. Phase-only
//! commands (`pause`, `reset`, `start` on a paused run, `speed`) go straight
//! to the shared [`PlaybackState`]. A `start` from Idle or Stopped opens a
//! fresh simulator session and spawns a new loop; the lifecycle lock
//! serializes those so at most one loop ever exists, and a loop that is
//! still unwinding from a reset is awaited before the next one starts.
//! Once [`PlaybackController::shutdown`] has begun, no new run is started.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;
use vegha_types::{NetworkBounds, Phase, PlaybackCommand};

use crate::adapter::AdapterConnector;
use crate::broadcast::SnapshotSink;
use crate::config::PlaybackConfig;
use crate::playback::{PlaybackError, PlaybackState, Transition};
use crate::streaming::{StreamEndReason, StreamOutcome, StreamRun, run_stream};

/// Details of the run that was started most recently.
#[derive(Debug, Clone, Copy)]
struct RunInfo {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    bounds: Option<NetworkBounds>,
}

#[derive(Debug, Default)]
struct RunRecord {
    current: Option<RunInfo>,
    last_outcome: Option<StreamOutcome>,
}

/// Point-in-time view of playback, served by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackStatus {
    /// Current phase.
    pub phase: Phase,
    /// Snapshots published in the current (or last) run.
    pub step: u64,
    /// Current sleep between steps, in seconds.
    pub step_interval_seconds: f64,
    /// Effective speed multiplier.
    pub speed_factor: f64,
    /// Steps per run before it ends on its own.
    pub step_budget: u64,
    /// Identifier of the current (or last) run.
    pub run_id: Option<Uuid>,
    /// When the current (or last) run started.
    pub started_at: Option<DateTime<Utc>>,
    /// Why the previous run ended.
    pub last_end_reason: Option<StreamEndReason>,
}

/// Owns the playback lifecycle.
pub struct PlaybackController {
    connector: Arc<dyn AdapterConnector>,
    sink: Arc<dyn SnapshotSink>,
    state: Arc<PlaybackState>,
    scenario: PathBuf,
    step_budget: u64,

    /// Handle of the current loop. Held across connect so starts serialize.
    lifecycle: Mutex<Option<JoinHandle<StreamOutcome>>>,

    /// Run metadata, written by the controller and by finishing loops.
    record: Arc<RwLock<RunRecord>>,

    /// Set by `shutdown`; a `start` that sees it opens no run.
    shutting_down: AtomicBool,
}

impl PlaybackController {
    /// Create an idle controller.
    ///
    /// # Arguments
    ///
    /// * `connector` - Opens a simulator session per run
    /// * `sink` - Receives every published snapshot
    /// * `playback` - Base interval and step budget
    /// * `scenario` - Scenario file handed to the connector
    pub fn new(
        connector: Arc<dyn AdapterConnector>,
        sink: Arc<dyn SnapshotSink>,
        playback: &PlaybackConfig,
        scenario: PathBuf,
    ) -> Self {
        Self {
            connector,
            sink,
            state: Arc::new(PlaybackState::new(playback.base_step_interval())),
            scenario,
            step_budget: playback.step_budget,
            lifecycle: Mutex::new(None),
            record: Arc::new(RwLock::new(RunRecord::default())),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Shared playback state.
    pub const fn state(&self) -> &Arc<PlaybackState> {
        &self.state
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Apply any playback command.
    pub async fn dispatch(&self, command: PlaybackCommand) -> Result<Transition, PlaybackError> {
        match command {
            PlaybackCommand::Start => self.start().await,
            PlaybackCommand::Pause => Ok(self.pause()),
            PlaybackCommand::Reset => Ok(self.reset()),
            PlaybackCommand::Speed(request) => {
                self.set_speed(request.factor)?;
                Ok(Transition::Retime)
            }
        }
    }

    /// Start a run, or resume a paused one.
    ///
    /// From Idle or Stopped this launches the simulator and spawns a loop
    /// with the step counter at zero. On a paused run it resumes the
    /// existing loop. While running, or once shutdown has begun, it does
    /// nothing and reports [`Transition::Ignore`].
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::Adapter`] if the simulator cannot be
    /// started. The phase is left unchanged in that case.
    pub async fn start(&self) -> Result<Transition, PlaybackError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if self.is_shutting_down() {
            return Ok(Transition::Ignore);
        }

        let taken = self.state.apply(&PlaybackCommand::Start);
        if taken != Transition::Spawn {
            if taken == Transition::Resume {
                info!("Playback resumed");
            }
            return Ok(taken);
        }

        // A reset loop may still be closing its session.
        if let Some(previous) = lifecycle.take() {
            reap(previous).await;
        }

        let mut adapter = self
            .connector
            .connect(&self.scenario)
            .await
            .inspect_err(|e| {
                warn!(error = %e, scenario = %self.scenario.display(), "Simulator failed to start");
            })?;

        // Shutdown may have begun while the simulator was starting.
        if self.is_shutting_down() {
            adapter.close().await;
            info!("Shutdown in progress, discarding new simulator session");
            return Ok(Transition::Ignore);
        }

        let bounds = match adapter.network_bounds().await {
            Ok(bounds) => Some(bounds),
            Err(e) => {
                warn!(error = %e, "Network bounds could not be read");
                None
            }
        };

        let run_id = Uuid::now_v7();
        {
            let mut record = self.record.write().await;
            record.current = Some(RunInfo {
                run_id,
                started_at: Utc::now(),
                bounds,
            });
        }

        self.state.begin_run();
        let run = StreamRun {
            run_id,
            adapter,
            state: Arc::clone(&self.state),
            sink: Arc::clone(&self.sink),
            step_budget: self.step_budget,
        };
        let record = Arc::clone(&self.record);
        let task = tokio::spawn(
            async move {
                let outcome = run_stream(run).await;
                record.write().await.last_outcome = Some(outcome.clone());
                outcome
            }
            .instrument(info_span!("stream", %run_id)),
        );
        *lifecycle = Some(task);

        info!(%run_id, scenario = %self.scenario.display(), "Run started");
        Ok(Transition::Spawn)
    }

    /// Pause a running run.
    pub fn pause(&self) -> Transition {
        let taken = self.state.apply(&PlaybackCommand::Pause);
        if taken == Transition::Pause {
            info!(step = self.state.steps_completed(), "Playback paused");
        }
        taken
    }

    /// Stop the current run. The loop closes the simulator and exits.
    pub fn reset(&self) -> Transition {
        let taken = self.state.apply(&PlaybackCommand::Reset);
        if taken == Transition::Stop {
            info!(step = self.state.steps_completed(), "Playback reset");
        }
        taken
    }

    /// Change the speed multiplier. Returns the new step interval.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::InvalidSpeed`] for non-positive or
    /// non-finite factors; the interval is kept.
    pub fn set_speed(&self, factor: f64) -> Result<Duration, PlaybackError> {
        self.state
            .set_speed(factor)
            .inspect_err(|_| warn!(factor, "Rejected speed change"))?;
        let interval = self.state.step_interval();
        info!(
            factor,
            step_interval_ms = interval.as_millis(),
            "Playback speed changed"
        );
        Ok(interval)
    }

    /// Geographic extent of the network of the active run.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::BoundsUnavailable`] unless a run is Running
    /// or Paused and its bounds could be read.
    pub async fn bounds(&self) -> Result<NetworkBounds, PlaybackError> {
        if !self.state.phase().is_active() {
            return Err(PlaybackError::BoundsUnavailable);
        }
        self.record
            .read()
            .await
            .current
            .and_then(|run| run.bounds)
            .ok_or(PlaybackError::BoundsUnavailable)
    }

    /// Point-in-time status.
    pub async fn status(&self) -> PlaybackStatus {
        let record = self.record.read().await;
        let run_state = self.state.run_state();
        PlaybackStatus {
            phase: run_state.phase,
            step: self.state.steps_completed(),
            step_interval_seconds: run_state.step_interval.as_secs_f64(),
            speed_factor: self.state.speed_factor(),
            step_budget: self.step_budget,
            run_id: record.current.map(|run| run.run_id),
            started_at: record.current.map(|run| run.started_at),
            last_end_reason: record.last_outcome.as_ref().map(|o| o.end_reason),
        }
    }

    /// Wait for the current loop, if any, to finish on its own.
    pub async fn wait_for_loop(&self) -> Option<StreamOutcome> {
        let mut lifecycle = self.lifecycle.lock().await;
        match lifecycle.take() {
            Some(task) => reap(task).await,
            None => None,
        }
    }

    /// Stop any run and wait for its loop to close the simulator.
    ///
    /// A `start` still connecting when this is called opens no run, and no
    /// later `start` does either.
    pub async fn shutdown(&self) -> Option<StreamOutcome> {
        self.shutting_down.store(true, Ordering::Release);
        self.reset();

        let mut lifecycle = self.lifecycle.lock().await;
        // A start holding the lock may have spawned a loop after the reset above.
        self.reset();
        let outcome = match lifecycle.take() {
            Some(task) => reap(task).await,
            None => None,
        };
        info!(
            reason = ?outcome.as_ref().map(|o| o.end_reason),
            "Playback shut down"
        );
        outcome
    }
}

async fn reap(task: JoinHandle<StreamOutcome>) -> Option<StreamOutcome> {
    match task.await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            warn!(error = %e, "Streaming loop ended abnormally");
            None
        }
    }
}
