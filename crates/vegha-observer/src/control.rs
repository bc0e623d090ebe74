//! Playback control REST handlers.
//!
//! These mirror the commands a `WebSocket` viewer can send, for clients
//! that prefer plain HTTP.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/control/start` | Start a run or resume a paused one |
//! | `POST` | `/api/control/pause` | Pause stepping |
//! | `POST` | `/api/control/reset` | End the current run |
//! | `POST` | `/api/control/speed` | Set the speed multiplier |
//! | `GET` | `/api/status` | Current playback status |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use vegha_core::Transition;
use vegha_types::{Phase, SpeedRequest};

use crate::error::ObserverError;
use crate::state::AppState;

/// Response to a control command.
#[derive(Debug, serde::Serialize)]
struct ControlResponse {
    /// Whether the command was accepted.
    ok: bool,
    /// What happened.
    message: &'static str,
    /// Phase after the command.
    phase: Phase,
    /// Step counter after the command.
    step: u64,
}

/// Human-readable outcome of a transition.
pub const fn describe(transition: Transition) -> &'static str {
    match transition {
        Transition::Spawn => "Simulation started",
        Transition::Resume => "Simulation resumed",
        Transition::Pause => "Simulation paused",
        Transition::Stop => "Simulation reset",
        Transition::Retime => "Speed updated",
        Transition::Ignore => "No change in current phase",
    }
}

async fn respond(state: &AppState, transition: Transition) -> Json<ControlResponse> {
    let status = state.controller.status().await;
    Json(ControlResponse {
        ok: true,
        message: describe(transition),
        phase: status.phase,
        step: status.step,
    })
}

// ---------------------------------------------------------------------------
// POST /api/control/start
// ---------------------------------------------------------------------------

/// Start a fresh run (launching the simulator) or resume a paused one.
///
/// Responds `503` if the simulator cannot be started.
pub async fn start(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ObserverError> {
    let transition = state.controller.start().await?;
    Ok(respond(&state, transition).await)
}

// ---------------------------------------------------------------------------
// POST /api/control/pause
// ---------------------------------------------------------------------------

/// Pause a running run.
pub async fn pause(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let transition = state.controller.pause();
    respond(&state, transition).await
}

// ---------------------------------------------------------------------------
// POST /api/control/reset
// ---------------------------------------------------------------------------

/// End the current run. The simulator is closed by the streaming loop.
pub async fn reset(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let transition = state.controller.reset();
    respond(&state, transition).await
}

// ---------------------------------------------------------------------------
// POST /api/control/speed
// ---------------------------------------------------------------------------

/// Change the speed multiplier. Responds `400` for non-positive factors.
pub async fn set_speed(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SpeedRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    state.controller.set_speed(body.factor)?;
    let status = state.controller.status().await;
    Ok(Json(serde_json::json!({
        "ok": true,
        "message": describe(Transition::Retime),
        "phase": status.phase,
        "speed_factor": status.speed_factor,
        "step_interval_seconds": status.step_interval_seconds,
    })))
}

// ---------------------------------------------------------------------------
// GET /api/status
// ---------------------------------------------------------------------------

/// Current phase, step, cadence, run metadata and viewer count.
pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.status_report().await)
}
