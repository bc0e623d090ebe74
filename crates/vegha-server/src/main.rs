//! Stream server binary.
//!
//! Wires the SUMO adapter, the playback controller and the observer API
//! together, then waits for `Ctrl-C`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration (path from the first argument, default
//!    `vegha-config.yaml`; defaults when the file is absent)
//! 2. Initialize structured logging (tracing)
//! 3. Build the snapshot broadcaster and playback controller
//! 4. Start the observer API server
//! 5. Wait for `Ctrl-C`, end any active run, stop the server

mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vegha_core::config::LoggingConfig;
use vegha_core::{PlaybackController, SnapshotBroadcaster, StreamConfig};
use vegha_observer::{AppState, ServerConfig, spawn_observer};
use vegha_traci::SumoConnector;

use crate::error::AppError;

/// Config file used when no path is given on the command line.
const DEFAULT_CONFIG_PATH: &str = "vegha-config.yaml";

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Load configuration. Logging depends on it, so remember whether
    //    defaults were used and report it once the subscriber is up.
    let config_path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let (config, from_file) = load_config(&config_path)?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);

    info!("vegha-server starting");
    if !from_file {
        info!(path = %config_path.display(), "Config file not found, using defaults");
    }
    info!(
        binary = config.simulator.binary,
        scenario = %config.simulator.scenario.display(),
        base_step_interval_ms = config.playback.base_step_interval_ms,
        step_budget = config.playback.step_budget,
        "Configuration loaded"
    );

    // 3. Playback core. The controller publishes into the same
    //    broadcaster that viewers subscribe to.
    let broadcaster = SnapshotBroadcaster::new(config.broadcast.capacity);
    let controller = Arc::new(PlaybackController::new(
        Arc::new(SumoConnector::new(config.simulator.clone())),
        Arc::new(broadcaster.clone()),
        &config.playback,
        config.simulator.scenario.clone(),
    ));

    // 4. Observer API.
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let state = Arc::new(AppState::new(Arc::clone(&controller), broadcaster));
    let (server, addr) = spawn_observer(&ServerConfig::from(&config.server), state, async {
        // A dropped sender also means stop.
        let _ = stop_rx.await;
    })
    .await?;
    info!(%addr, "Observer API server started");

    // 5. Run until interrupted.
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    if let Some(outcome) = controller.shutdown().await {
        info!(
            run_id = %outcome.run_id,
            end_reason = ?outcome.end_reason,
            steps = outcome.steps,
            "Active run ended"
        );
    }

    if stop_tx.send(()).is_err() {
        warn!("Observer server already stopped");
    }
    if let Err(e) = server.await {
        warn!(error = %e, "Observer server task failed");
    }

    info!("vegha-server shutdown complete");
    Ok(())
}

/// Load configuration from `path`, falling back to defaults (plus
/// environment overrides) when the file does not exist.
fn load_config(path: &Path) -> Result<(StreamConfig, bool), AppError> {
    if path.exists() {
        return Ok((StreamConfig::from_file(path)?, true));
    }
    let mut config = StreamConfig::default();
    config.apply_overrides(|name| std::env::var(name).ok())?;
    config.validate()?;
    Ok((config, false))
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level; an unusable level falls
/// back to `info`.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
