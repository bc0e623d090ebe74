//! Background startup helper for the server binary.
//!
//! [`spawn_observer`] binds eagerly, then runs the HTTP + `WebSocket`
//! server on a background Tokio task. The binary awaits the returned
//! handle after triggering shutdown.
//!
//! ```rust,ignore
//! let (handle, addr) = spawn_observer(&config, state, shutdown_signal()).await?;
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::server::{self, ServerConfig, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Spawn the observer server on a background task.
///
/// Returns the task handle and the bound address (useful when the port
/// is `0`). Binding happens before the task is spawned, so a taken port
/// surfaces here as [`StartupError::Server`].
pub async fn spawn_observer<F>(
    config: &ServerConfig,
    state: Arc<AppState>,
    shutdown: F,
) -> Result<(JoinHandle<()>, SocketAddr), StartupError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = server::bind(config).await?;
    let addr = listener
        .local_addr()
        .map_err(|e| ServerError::Bind(format!("no local address: {e}")))?;

    let handle = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, state, shutdown).await {
            tracing::error!(error = %e, "Observer server exited with error");
        }
    });

    tracing::info!(%addr, "Observer server spawned on background task");

    Ok((handle, addr))
}
