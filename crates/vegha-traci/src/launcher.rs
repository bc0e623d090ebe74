//! Starting and stopping the SUMO process.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};
use vegha_core::config::SimulatorConfig;

use crate::connection::TraciConnection;
use crate::error::TraciError;

/// A running simulator process. It is killed if dropped while alive.
#[derive(Debug)]
pub struct SumoProcess {
    child: Child,
    port: u16,
}

impl SumoProcess {
    /// Remote-control port the process listens on.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Wait up to `grace` for the process to exit, then kill it.
    pub async fn shutdown(mut self, grace: Duration) {
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => debug!(%status, port = self.port, "Simulator exited"),
            Ok(Err(e)) => warn!(error = %e, port = self.port, "Failed to wait for simulator"),
            Err(elapsed) => {
                warn!(%elapsed, port = self.port, "Simulator did not exit, killing it");
                if let Err(e) = self.child.kill().await {
                    warn!(error = %e, "Failed to kill simulator");
                }
            }
        }
    }
}

/// Ask the OS for a free local port.
pub async fn free_port() -> Result<u16, TraciError> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
    Ok(listener.local_addr()?.port())
}

/// Start the simulator on `scenario` and connect to it.
///
/// Connection attempts are retried `config.connect_attempts` times. A
/// process that exits before accepting is reported straight away.
///
/// # Errors
///
/// [`TraciError::Launch`] if the binary cannot be started, exits early, or
/// never accepts a connection.
pub async fn launch(
    config: &SimulatorConfig,
    scenario: &Path,
) -> Result<(SumoProcess, TraciConnection), TraciError> {
    let port = match config.remote_port {
        Some(port) => port,
        None => free_port().await?,
    };

    let mut child = Command::new(&config.binary)
        .arg("-c")
        .arg(scenario)
        .arg("--remote-port")
        .arg(port.to_string())
        .args(&config.extra_args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| TraciError::Launch(format!("cannot run '{}': {e}", config.binary)))?;

    info!(
        binary = %config.binary,
        scenario = %scenario.display(),
        port,
        "Simulator process started"
    );

    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let mut attempt: u32 = 0;
    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                debug!(port, attempt, "Connected to simulator");
                return Ok((SumoProcess { child, port }, TraciConnection::new(stream)));
            }
            Err(e) => {
                if let Some(status) = child.try_wait()? {
                    return Err(TraciError::Launch(format!(
                        "simulator exited with {status} before accepting connections"
                    )));
                }
                attempt = attempt.saturating_add(1);
                if attempt >= config.connect_attempts {
                    if let Err(kill_error) = child.kill().await {
                        warn!(error = %kill_error, "Failed to kill unresponsive simulator");
                    }
                    return Err(TraciError::Launch(format!(
                        "no connection on port {port} after {attempt} attempts: {e}"
                    )));
                }
                debug!(attempt, port, error = %e, "Simulator not accepting yet");
                tokio::time::sleep(config.connect_retry_delay()).await;
            }
        }
    }
}
