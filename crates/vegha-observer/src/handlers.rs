//! Read-only REST handlers.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `GET` | `/api/bounds` | Geographic extent of the running network |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::{Html, IntoResponse};

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// GET / -- minimal HTML status page
// ---------------------------------------------------------------------------

/// Serve a minimal HTML page showing playback status and API links.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state.status_report().await;
    let phase = format!("{:?}", report.playback.phase).to_uppercase();
    let step = report.playback.step;
    let interval_ms = report.playback.step_interval_seconds * 1000.0;
    let speed = report.playback.speed_factor;
    let budget = report.playback.step_budget;
    let viewers = report.subscribers;

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Vegha Stream</title>
    <style>
        body {{
            background: #0d1117;
            color: #c9d1d9;
            font-family: 'Cascadia Code', 'Fira Code', 'Consolas', monospace;
            padding: 2rem;
            max-width: 800px;
            margin: 0 auto;
        }}
        h1 {{ color: #58a6ff; margin-bottom: 0.25rem; }}
        .subtitle {{ color: #8b949e; margin-top: 0; }}
        .metric {{
            display: inline-block;
            background: #161b22;
            border: 1px solid #30363d;
            border-radius: 6px;
            padding: 1rem 1.5rem;
            margin: 0.5rem 0.5rem 0.5rem 0;
            min-width: 120px;
        }}
        .metric .label {{ color: #8b949e; font-size: 0.85rem; }}
        .metric .value {{ color: #58a6ff; font-size: 1.5rem; font-weight: bold; }}
        a {{ color: #58a6ff; text-decoration: none; }}
        ul {{ list-style: none; padding: 0; }}
        li {{ padding: 0.3rem 0; }}
        .status {{ color: #3fb950; font-weight: bold; }}
        hr {{ border: none; border-top: 1px solid #30363d; margin: 1.5rem 0; }}
    </style>
</head>
<body>
    <h1>Vegha Stream</h1>
    <p class="subtitle">Live traffic simulation snapshots</p>

    <p>Phase: <span class="status">{phase}</span></p>

    <div>
        <div class="metric">
            <div class="label">Step</div>
            <div class="value">{step} / {budget}</div>
        </div>
        <div class="metric">
            <div class="label">Interval</div>
            <div class="value">{interval_ms:.0} ms</div>
        </div>
        <div class="metric">
            <div class="label">Speed</div>
            <div class="value">{speed}x</div>
        </div>
        <div class="metric">
            <div class="label">Viewers</div>
            <div class="value">{viewers}</div>
        </div>
    </div>

    <hr>

    <h2>API Endpoints</h2>
    <ul>
        <li>GET <a href="/api/status">/api/status</a> -- Playback status</li>
        <li>GET <a href="/api/bounds">/api/bounds</a> -- Network bounds (running only)</li>
        <li>POST /api/control/start -- Start or resume</li>
        <li>POST /api/control/pause -- Pause</li>
        <li>POST /api/control/reset -- Reset</li>
        <li>POST /api/control/speed -- Set speed (<code>{{"factor": 2}}</code>)</li>
    </ul>

    <h2>WebSocket</h2>
    <ul>
        <li><code>ws://host:port/ws</code> -- Snapshot stream and playback commands</li>
    </ul>
</body>
</html>"#
    ))
}

// ---------------------------------------------------------------------------
// GET /api/bounds
// ---------------------------------------------------------------------------

/// Return the network's south-west, north-east and center points as
/// `[latitude, longitude]` pairs.
///
/// Responds `409` when no run is active.
pub async fn get_bounds(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let bounds = state.controller.bounds().await?;
    Ok(Json(bounds))
}
