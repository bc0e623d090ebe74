//! [`SimulatorAdapter`] backed by a SUMO process over TraCI.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use vegha_core::adapter::{
    AdapterConnector, AdapterError, EntityBatch, SignalReading, SimulatorAdapter, VehicleReading,
};
use vegha_core::config::SimulatorConfig;
use vegha_types::{GeoPoint, NetworkBounds};

use crate::codec::Position2D;
use crate::connection::TraciConnection;
use crate::error::TraciError;
use crate::launcher::{self, SumoProcess};
use crate::protocol::{command, variable};

/// Bearing of the last segment of a lane shape, in degrees.
///
/// Measured counter-clockwise from the x axis (`atan2(dy, dx)`). Shapes with
/// fewer than two points have heading 0.
pub fn lane_heading(shape: &[Position2D]) -> f64 {
    match shape {
        [.., from, to] => (to.y - from.y).atan2(to.x - from.x).to_degrees(),
        _ => 0.0,
    }
}

async fn to_geo(conn: &mut TraciConnection, position: Position2D) -> Result<GeoPoint, TraciError> {
    let (longitude, latitude) = conn.convert_geo(position).await?;
    Ok(GeoPoint::new(longitude, latitude))
}

async fn read_vehicle(conn: &mut TraciConnection, id: &str) -> Result<VehicleReading, TraciError> {
    let domain = command::GET_VEHICLE_VARIABLE;
    let position = conn.get_position(domain, variable::POSITION, id).await?;
    let location = to_geo(conn, position).await?;
    let heading_degrees = conn.get_f64(domain, variable::ANGLE, id).await?;
    let native_type = conn.get_string(domain, variable::TYPE, id).await?;
    let speed_mps = conn.get_f64(domain, variable::SPEED, id).await?;
    Ok(VehicleReading {
        id: id.to_owned(),
        location,
        heading_degrees,
        native_type,
        speed_mps,
    })
}

/// Read one traffic light. `None` if it controls no lane.
async fn read_signal(
    conn: &mut TraciConnection,
    id: &str,
) -> Result<Option<SignalReading>, TraciError> {
    let links = conn.controlled_links(id).await?;
    let Some(lane) = links
        .first()
        .and_then(|signal| signal.first())
        .map(|link| link.incoming_lane.as_str())
        .filter(|lane| !lane.is_empty())
    else {
        return Ok(None);
    };

    let shape = conn.lane_shape(lane).await?;
    let Some(&end) = shape.last() else {
        return Ok(None);
    };
    let location = to_geo(conn, end).await?;
    let state = conn
        .get_string(
            command::GET_TL_VARIABLE,
            variable::TL_RED_YELLOW_GREEN_STATE,
            id,
        )
        .await?;

    Ok(Some(SignalReading {
        id: id.to_owned(),
        location,
        heading_degrees: lane_heading(&shape),
        state,
    }))
}

/// Fold a per-entity result: recoverable errors (a rejected command or an
/// undecodable value) are omissions, anything else ends the listing.
fn absorb<T>(
    batch: &mut EntityBatch<T>,
    id: &str,
    result: Result<T, TraciError>,
) -> Result<(), AdapterError> {
    match result {
        Err(e) if e.is_fatal() => Err(e.into()),
        other => {
            batch.record(id, other);
            Ok(())
        }
    }
}

/// A TraCI session plus the process behind it.
#[derive(Debug)]
pub struct SumoAdapter {
    conn: Option<TraciConnection>,
    process: Option<SumoProcess>,
    close_grace: Duration,
}

impl SumoAdapter {
    /// Adapter over an existing connection, with no process to manage.
    pub const fn from_connection(conn: TraciConnection) -> Self {
        Self {
            conn: Some(conn),
            process: None,
            close_grace: Duration::ZERO,
        }
    }

    fn connection(&mut self) -> Result<&mut TraciConnection, AdapterError> {
        self.conn
            .as_mut()
            .ok_or_else(|| AdapterError::disconnected("traci session is closed"))
    }
}

#[async_trait]
impl SimulatorAdapter for SumoAdapter {
    async fn advance_step(&mut self) -> Result<(), AdapterError> {
        self.connection()?
            .simulation_step()
            .await
            .map_err(AdapterError::from)
    }

    async fn list_vehicles(&mut self) -> Result<EntityBatch<VehicleReading>, AdapterError> {
        let conn = self.connection()?;
        let ids = conn.id_list(command::GET_VEHICLE_VARIABLE).await?;
        let mut batch = EntityBatch::new();
        for id in &ids {
            let result = read_vehicle(conn, id).await;
            absorb(&mut batch, id, result)?;
        }
        Ok(batch)
    }

    async fn list_signals(&mut self) -> Result<EntityBatch<SignalReading>, AdapterError> {
        let conn = self.connection()?;
        let ids = conn.id_list(command::GET_TL_VARIABLE).await?;
        let mut batch = EntityBatch::new();
        for id in &ids {
            match read_signal(conn, id).await {
                Ok(None) => debug!(signal = %id, "Traffic light controls no lane, skipped"),
                Ok(Some(signal)) => batch.push(signal),
                Err(e) => absorb(&mut batch, id, Err(e))?,
            }
        }
        Ok(batch)
    }

    async fn network_bounds(&mut self) -> Result<NetworkBounds, AdapterError> {
        let conn = self.conn.as_mut().ok_or(AdapterError::BoundsUnavailable)?;
        let (lower_left, upper_right) = conn.net_boundary().await?;
        let southwest = to_geo(conn, lower_left).await?;
        let northeast = to_geo(conn, upper_right).await?;
        Ok(NetworkBounds::from_corners(southwest, northeast))
    }

    async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                debug!(error = %e, "Simulator close command failed");
            }
        }
        if let Some(process) = self.process.take() {
            process.shutdown(self.close_grace).await;
        }
    }
}

/// Launches a SUMO process per run.
#[derive(Debug, Clone)]
pub struct SumoConnector {
    config: SimulatorConfig,
}

impl SumoConnector {
    /// Connector using `config` for every launch.
    pub const fn new(config: SimulatorConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AdapterConnector for SumoConnector {
    async fn connect(&self, scenario: &Path) -> Result<Box<dyn SimulatorAdapter>, AdapterError> {
        let (process, mut conn) = launcher::launch(&self.config, scenario)
            .await
            .map_err(|e| AdapterError::unavailable(e.to_string()))?;

        match conn.version().await {
            Ok(version) => info!(
                api_version = version.api_version,
                simulator = %version.identifier,
                port = process.port(),
                "TraCI handshake complete"
            ),
            Err(e) => {
                warn!(error = %e, "TraCI handshake failed");
                process.shutdown(Duration::ZERO).await;
                return Err(AdapterError::unavailable(format!("handshake failed: {e}")));
            }
        }

        Ok(Box::new(SumoAdapter {
            conn: Some(conn),
            process: Some(process),
            close_grace: self.config.close_grace(),
        }))
    }
}
