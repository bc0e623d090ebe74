//! Axum router construction for the observer API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled so a map dashboard on another origin can
//! connect.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{control, handlers, ws};

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /` -- minimal HTML status page
/// - `GET /ws` -- snapshot stream and command channel
/// - `GET /api/status` -- playback status
/// - `GET /api/bounds` -- network bounds of the active run
/// - `POST /api/control/{start,pause,reset,speed}` -- playback control
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::index))
        .route("/ws", get(ws::ws_stream))
        .route("/api/status", get(control::status))
        .route("/api/bounds", get(handlers::get_bounds))
        .route("/api/control/start", post(control::start))
        .route("/api/control/pause", post(control::pause))
        .route("/api/control/reset", post(control::reset))
        .route("/api/control/speed", post(control::set_speed))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
