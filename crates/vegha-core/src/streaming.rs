//! The streaming loop: step, collect, publish, sleep.
//!
//! [`run_stream`] drives one run of the simulator. It owns the adapter for
//! the whole run and follows the shared [`PlaybackState`]:
//!
//! - **Running**: advance one step, read every vehicle and signal, publish a
//!   snapshot, then sleep for the current step interval
//! - **Paused**: sleep without stepping until the phase changes
//! - **Stopped**: leave the loop
//!
//! The run also ends when the step budget is used up or the simulator
//! session fails. Whatever the reason, the adapter is closed and the phase
//! ends up Stopped before [`run_stream`] returns.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vegha_types::{
    Phase, SignalPhase, SignalState, SimulationSnapshot, VehicleCategory, VehiclePosition,
};

use crate::adapter::{AdapterError, SignalReading, SimulatorAdapter, VehicleReading};
use crate::broadcast::SnapshotSink;
use crate::playback::{PlaybackState, RunState};

/// Vehicles slower than this (metres per second) count as waiting.
pub const WAITING_SPEED_THRESHOLD_MPS: f64 = 0.1;

const MPS_TO_KMH: f64 = 3.6;

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEndReason {
    /// The configured number of steps was reached.
    BudgetExhausted,
    /// The simulator session failed mid-run.
    Disconnected,
    /// A `reset` command stopped the run.
    Reset,
}

/// Result of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamOutcome {
    /// Identifier of the run.
    pub run_id: Uuid,
    /// Why the run ended.
    pub end_reason: StreamEndReason,
    /// Snapshots published during the run.
    pub steps: u64,
}

/// Everything one run needs.
pub struct StreamRun {
    /// Identifier of the run, for logs and status.
    pub run_id: Uuid,
    /// Open simulator session. The loop closes it on exit.
    pub adapter: Box<dyn SimulatorAdapter>,
    /// Shared phase and cadence.
    pub state: Arc<PlaybackState>,
    /// Where snapshots go.
    pub sink: Arc<dyn SnapshotSink>,
    /// Maximum number of steps before the run ends on its own.
    pub step_budget: u64,
}

/// Build a snapshot from one step's readings.
///
/// Readings with a repeated ID keep the last one. The average speed is the
/// mean over all vehicles in km/h, truncated to a whole number, and zero when
/// there are no vehicles.
pub fn assemble_snapshot(
    step_index: u64,
    vehicles: &[VehicleReading],
    signals: &[SignalReading],
) -> SimulationSnapshot {
    let mut positions = BTreeMap::new();
    let mut speeds = BTreeMap::new();
    for reading in vehicles {
        positions.insert(
            reading.id.clone(),
            VehiclePosition {
                location: reading.location,
                heading_degrees: reading.heading_degrees,
                category: VehicleCategory::classify(&reading.native_type),
            },
        );
        speeds.insert(reading.id.as_str(), reading.speed_mps.max(0.0));
    }

    let traffic_signals = signals
        .iter()
        .map(|reading| {
            (
                reading.id.clone(),
                SignalState {
                    location: reading.location,
                    heading_degrees: reading.heading_degrees,
                    phase: SignalPhase::classify(&reading.state),
                },
            )
        })
        .collect();

    let waiting_count = speeds
        .values()
        .filter(|&&speed| speed < WAITING_SPEED_THRESHOLD_MPS)
        .count();

    SimulationSnapshot {
        step_index,
        vehicles: positions,
        traffic_signals,
        average_speed_kmh: average_kmh(speeds.values().copied()),
        waiting_count,
    }
}

fn average_kmh(speeds_mps: impl ExactSizeIterator<Item = f64>) -> f64 {
    let count = speeds_mps.len();
    if count == 0 {
        return 0.0;
    }
    let total_kmh: f64 = speeds_mps.map(|speed| speed * MPS_TO_KMH).sum();
    let count = f64::from(u32::try_from(count).unwrap_or(u32::MAX));
    (total_kmh / count).trunc()
}

/// Read every entity from the adapter and assemble a snapshot.
///
/// Entities whose detail query failed are left out and logged at debug.
///
/// # Errors
///
/// Returns the adapter error if the session itself failed.
pub async fn collect_snapshot(
    adapter: &mut dyn SimulatorAdapter,
    step_index: u64,
) -> Result<SimulationSnapshot, AdapterError> {
    let vehicles = adapter.list_vehicles().await?;
    let signals = adapter.list_signals().await?;

    if vehicles.is_partial() || signals.is_partial() {
        debug!(
            step_index,
            vehicles_omitted = vehicles.failures.len(),
            signals_omitted = signals.failures.len(),
            "Some entities could not be read this step"
        );
    }

    Ok(assemble_snapshot(step_index, &vehicles.items, &signals.items))
}

/// Run the streaming loop until the run ends.
///
/// The first snapshot has step index 0. Commands reach the loop through the
/// shared [`PlaybackState`]; a phase change wakes it from its sleep, and the
/// phase is re-checked after every simulator call so a reset never
/// publishes another snapshot.
pub async fn run_stream(run: StreamRun) -> StreamOutcome {
    let StreamRun {
        run_id,
        mut adapter,
        state,
        sink,
        step_budget,
    } = run;
    let mut rx = state.subscribe();
    let mut steps: u64 = 0;

    info!(
        step_budget,
        step_interval_ms = state.step_interval().as_millis(),
        "Streaming loop started"
    );

    let end_reason = loop {
        let current = *rx.borrow_and_update();
        match current.phase {
            Phase::Idle | Phase::Stopped => break StreamEndReason::Reset,
            Phase::Paused => {
                sleep_unless_phase_changes(&mut rx, current).await;
                continue;
            }
            Phase::Running => {}
        }

        if let Err(e) = adapter.advance_step().await {
            warn!(error = %e, step = steps, "Simulator step failed, ending run");
            break StreamEndReason::Disconnected;
        }
        if reset_requested(&rx) {
            break StreamEndReason::Reset;
        }

        let snapshot = match collect_snapshot(adapter.as_mut(), steps).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, step = steps, "Simulator read failed, ending run");
                break StreamEndReason::Disconnected;
            }
        };
        if reset_requested(&rx) {
            break StreamEndReason::Reset;
        }

        let vehicles = snapshot.vehicles.len();
        let viewers = sink.publish(snapshot);
        steps = steps.saturating_add(1);
        state.record_step(steps);
        debug!(step = steps, vehicles, viewers, "Snapshot published");

        if steps >= step_budget {
            info!(steps, step_budget, "Step budget exhausted");
            break StreamEndReason::BudgetExhausted;
        }

        sleep_unless_phase_changes(&mut rx, current).await;
    };

    adapter.close().await;
    state.finish_run();

    let outcome = StreamOutcome {
        run_id,
        end_reason,
        steps,
    };
    log_stream_end(&outcome);
    outcome
}

/// Log the end of a run.
pub fn log_stream_end(outcome: &StreamOutcome) {
    info!(
        run_id = %outcome.run_id,
        reason = ?outcome.end_reason,
        steps = outcome.steps,
        "Streaming loop finished"
    );
    if outcome.steps == 0 {
        warn!(run_id = %outcome.run_id, "Run ended before any snapshot was published");
    }
}

fn reset_requested(rx: &watch::Receiver<RunState>) -> bool {
    rx.borrow().phase == Phase::Stopped
}

/// Sleep for the current interval, returning early if the phase changes.
///
/// Speed changes alone do not cut the sleep short; the new interval applies
/// from the next iteration.
async fn sleep_unless_phase_changes(rx: &mut watch::Receiver<RunState>, current: RunState) {
    let sleep = tokio::time::sleep(current.step_interval);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            () = &mut sleep => return,
            changed = rx.changed() => {
                if changed.is_err() {
                    // state dropped; nothing left to wait for
                    (&mut sleep).await;
                    return;
                }
                if rx.borrow().phase != current.phase {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use vegha_types::PlaybackCommand;

    use super::*;
    use crate::adapter::AdapterConnector;
    use crate::broadcast::SnapshotBroadcaster;
    use crate::stub::{StubConnector, StubScript, stub_signal, stub_vehicle};

    const INTERVAL: Duration = Duration::from_millis(100);

    #[test]
    fn snapshot_statistics() {
        let vehicles = vec![
            stub_vehicle("a", "veh_passenger", 10.0),
            stub_vehicle("b", "bus", 5.0),
            stub_vehicle("c", "truck", 0.05),
        ];
        let snapshot = assemble_snapshot(3, &vehicles, &[]);

        assert_eq!(snapshot.step_index, 3);
        assert_eq!(snapshot.vehicles.len(), 3);
        assert_eq!(snapshot.waiting_count, 1);
        // (36 + 18 + 0.18) / 3 = 18.06
        assert_eq!(snapshot.average_speed_kmh, 18.0);
    }

    #[test]
    fn empty_step_has_zero_average() {
        let snapshot = assemble_snapshot(0, &[], &[]);
        assert_eq!(snapshot.average_speed_kmh, 0.0);
        assert_eq!(snapshot.waiting_count, 0);
        assert!(snapshot.vehicles.is_empty());
    }

    #[test]
    fn categories_and_phases_are_classified() {
        let snapshot = assemble_snapshot(
            0,
            &[stub_vehicle("amb", "ambulance_bus", 1.0)],
            &[stub_signal("tl", "yrGG")],
        );
        assert_eq!(
            snapshot.vehicles.get("amb").map(|v| v.category),
            Some(VehicleCategory::Bus)
        );
        assert_eq!(
            snapshot.traffic_signals.get("tl").map(|s| s.phase),
            Some(SignalPhase::Green)
        );
    }

    #[test]
    fn repeated_vehicle_ids_keep_the_last_reading() {
        let vehicles = vec![
            stub_vehicle("a", "car", 0.0),
            stub_vehicle("a", "car", 10.0),
        ];
        let snapshot = assemble_snapshot(0, &vehicles, &[]);
        assert_eq!(snapshot.vehicles.len(), 1);
        assert_eq!(snapshot.waiting_count, 0);
        assert_eq!(snapshot.average_speed_kmh, 36.0);
    }

    async fn open_run(
        script: StubScript,
        budget: u64,
    ) -> (StreamRun, Arc<PlaybackState>, SnapshotBroadcaster) {
        let connector = StubConnector::new(script);
        let adapter = connector.connect(Path::new("city.sumocfg")).await.unwrap();
        let state = Arc::new(PlaybackState::new(INTERVAL));
        let broadcaster = SnapshotBroadcaster::new(16);
        state.begin_run();
        let run = StreamRun {
            run_id: Uuid::now_v7(),
            adapter,
            state: Arc::clone(&state),
            sink: Arc::new(broadcaster.clone()),
            step_budget: budget,
        };
        (run, state, broadcaster)
    }

    #[tokio::test(start_paused = true)]
    async fn budget_ends_the_run() {
        let (run, state, broadcaster) = open_run(StubScript::city(), 3).await;
        let mut viewer = broadcaster.subscribe();

        let outcome = run_stream(run).await;

        assert_eq!(outcome.end_reason, StreamEndReason::BudgetExhausted);
        assert_eq!(outcome.steps, 3);
        assert_eq!(state.phase(), Phase::Stopped);
        for expected in 0..3 {
            assert_eq!(viewer.recv().await.unwrap().step_index, expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_ends_the_run() {
        let (run, state, _broadcaster) =
            open_run(StubScript::city().disconnecting_after(2), 100).await;

        let outcome = run_stream(run).await;

        assert_eq!(outcome.end_reason, StreamEndReason::Disconnected);
        assert_eq!(outcome.steps, 2);
        assert_eq!(state.phase(), Phase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn flaky_entities_do_not_end_the_run() {
        let (run, _state, broadcaster) =
            open_run(StubScript::city().with_flaky("veh1"), 2).await;
        let mut viewer = broadcaster.subscribe();

        let outcome = run_stream(run).await;

        assert_eq!(outcome.end_reason, StreamEndReason::BudgetExhausted);
        let first = viewer.recv().await.unwrap();
        assert_eq!(first.vehicles.len(), 2);
        assert!(!first.vehicles.contains_key("veh1"));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_wakes_the_loop_promptly() {
        let (run, state, _broadcaster) = open_run(StubScript::city(), 100).await;
        state.set_speed(0.001).unwrap();
        let handle = tokio::spawn(run_stream(run));

        tokio::time::sleep(Duration::from_millis(10)).await;
        state.apply(&PlaybackCommand::Reset);

        let outcome = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.end_reason, StreamEndReason::Reset);
        assert_eq!(outcome.steps, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_run_does_not_step() {
        let (run, state, _broadcaster) = open_run(StubScript::city(), 1000).await;
        let handle = tokio::spawn(run_stream(run));

        tokio::time::sleep(Duration::from_millis(250)).await;
        state.apply(&PlaybackCommand::Pause);
        let paused_at = state.steps_completed();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(state.steps_completed(), paused_at);

        state.apply(&PlaybackCommand::Start);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(state.steps_completed() > paused_at);

        state.apply(&PlaybackCommand::Reset);
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.end_reason, StreamEndReason::Reset);
    }
}
