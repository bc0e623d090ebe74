//! `WebSocket` handler: snapshot stream out, playback commands in.
//!
//! Clients connect to `GET /ws` and receive an `update` event for every
//! published snapshot:
//!
//! ```json
//! {"event": "update", "data": {"vehicles": {}, "traffic_lights": {}, "time": 0, "avg_speed": 0, "waiting": 0}}
//! ```
//!
//! The same socket accepts commands such as `{"event": "start"}` or
//! `{"event": "speed", "data": {"factor": 2}}`. Each command is answered
//! on that socket only, with a `status` event on success or an `error`
//! event otherwise.
//!
//! If a client falls behind, lagged snapshots are skipped and the client
//! resumes from the oldest one still buffered.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use serde::Serialize;
use tracing::{debug, info, warn};
use vegha_types::{PlaybackCommand, SimulationSnapshot};

use crate::control::describe;
use crate::error::ObserverError;
use crate::state::{AppState, StatusReport};

/// Body of an `error` event.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// What went wrong.
    pub error: String,
}

/// Messages the server sends over the socket.
#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ServerEvent<'a> {
    /// A simulation snapshot.
    Update(&'a SimulationSnapshot),
    /// Reply to an accepted command.
    Status(StatusReport),
    /// Reply to a rejected command.
    Error(ErrorBody),
}

/// Upgrade an HTTP request to a `WebSocket` connection.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_stream(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

/// Decode and apply one command, producing the reply for its sender.
pub(crate) async fn handle_command(state: &AppState, text: &str) -> ServerEvent<'static> {
    let command: PlaybackCommand = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => {
            debug!(error = %e, "Unparseable command from viewer");
            return ServerEvent::Error(ErrorBody {
                error: format!("invalid command: {e}"),
            });
        }
    };

    match state.controller.dispatch(command).await {
        Ok(transition) => {
            info!(?command, outcome = describe(transition), "Viewer command applied");
            ServerEvent::Status(state.status_report().await)
        }
        Err(e) => ServerEvent::Error(ErrorBody {
            error: ObserverError::from(e).to_string(),
        }),
    }
}

async fn send_event(socket: &mut WebSocket, event: &ServerEvent<'_>) -> Result<(), ()> {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(e) => {
            warn!("Failed to serialize server event: {e}");
            return Ok(());
        }
    };
    socket.send(Message::Text(json.into())).await.map_err(|e| {
        debug!("WebSocket client disconnected (send failed): {e}");
    })
}

/// Handle the `WebSocket` lifecycle: forward snapshots and answer commands
/// until either side goes away.
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    debug!("WebSocket client connected");

    let mut updates = state.subscribe();

    loop {
        tokio::select! {
            // Next snapshot from the streaming loop.
            snapshot = updates.recv() => {
                let Some(snapshot) = snapshot else {
                    debug!("Snapshot broadcast closed, shutting down WebSocket");
                    return;
                };
                if send_event(&mut socket, &ServerEvent::Update(&snapshot)).await.is_err() {
                    return;
                }
            }
            // Commands, pings and close frames from the client.
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_command(&state, text.as_str()).await;
                        if send_event(&mut socket, &reply).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!("WebSocket client disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {e}");
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use serde_json::Value;
    use vegha_core::config::PlaybackConfig;
    use vegha_core::stub::{StubConnector, StubScript};
    use vegha_core::{PlaybackController, SnapshotBroadcaster};
    use vegha_types::Phase;

    use super::*;

    fn app_state(connector: StubConnector) -> AppState {
        let broadcaster = SnapshotBroadcaster::new(8);
        let controller = PlaybackController::new(
            Arc::new(connector),
            Arc::new(broadcaster.clone()),
            &PlaybackConfig::default(),
            PathBuf::from("city.sumocfg"),
        );
        AppState::new(Arc::new(controller), broadcaster)
    }

    fn to_json(event: &ServerEvent<'_>) -> Value {
        serde_json::to_value(event).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn start_command_replies_with_status() {
        let state = app_state(StubConnector::new(StubScript::city()));

        let reply = to_json(&handle_command(&state, r#"{"event":"start"}"#).await);
        assert_eq!(reply["event"], "status");
        assert_eq!(reply["data"]["phase"], "running");
        assert_eq!(state.controller.phase(), Phase::Running);

        state.controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_json_is_an_error_event() {
        let state = app_state(StubConnector::new(StubScript::city()));

        let reply = to_json(&handle_command(&state, "not json").await);
        assert_eq!(reply["event"], "error");
        assert!(
            reply["data"]["error"]
                .as_str()
                .unwrap()
                .starts_with("invalid command")
        );

        let reply = to_json(&handle_command(&state, r#"{"event":"warp"}"#).await);
        assert_eq!(reply["event"], "error");
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_speed_is_an_error_event() {
        let state = app_state(StubConnector::new(StubScript::city()));

        let reply = to_json(
            &handle_command(&state, r#"{"event":"speed","data":{"factor":-1}}"#).await,
        );
        assert_eq!(reply["event"], "error");

        let reply =
            to_json(&handle_command(&state, r#"{"event":"speed","data":{"speed":2}}"#).await);
        assert_eq!(reply["event"], "status");
        assert_eq!(reply["data"]["speed_factor"], 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_simulator_is_an_error_event() {
        let connector = StubConnector::new(StubScript::city());
        connector.set_refusing(true);
        let state = app_state(connector);

        let reply = to_json(&handle_command(&state, r#"{"event":"start"}"#).await);
        assert_eq!(reply["event"], "error");
        assert_eq!(state.controller.phase(), Phase::Idle);
    }

    #[test]
    fn update_event_wraps_the_snapshot() {
        let snapshot = SimulationSnapshot::default();
        let json = to_json(&ServerEvent::Update(&snapshot));
        assert_eq!(json["event"], "update");
        assert_eq!(json["data"]["time"], 0);
        assert!(json["data"]["traffic_lights"].is_object());
    }
}
