//! One TraCI session over TCP.
//!
//! Every request is a single-command message followed by one response
//! message. [`TraciConnection::exchange`] checks the status part of the
//! response and hands back the remaining bytes; the typed query methods
//! decode those into values.

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::codec::{
    self, ControlledLink, Position2D, StorageReader, geo_conversion_params, variable_request,
};
use crate::error::TraciError;
use crate::protocol::{command, status, variable};

/// Upper bound on an accepted response, to reject garbage length prefixes.
const MAX_MESSAGE_LEN: usize = 67_108_864;

/// Simulator identification returned by the version handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerVersion {
    /// TraCI API level.
    pub api_version: i32,
    /// Free-form simulator identifier (e.g. `"SUMO 1.20.0"`).
    pub identifier: String,
}

/// An open TraCI session.
#[derive(Debug)]
pub struct TraciConnection {
    stream: TcpStream,
}

impl TraciConnection {
    /// Wrap a connected socket.
    pub fn new(stream: TcpStream) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Could not disable Nagle on traci socket");
        }
        Self { stream }
    }

    async fn send(&mut self, message: &Bytes) -> Result<(), TraciError> {
        self.stream.write_all(message).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<StorageReader, TraciError> {
        let total = self.stream.read_i32().await?;
        let body_len = codec::message_body_len(total)?;
        if body_len > MAX_MESSAGE_LEN {
            return Err(TraciError::malformed(format!(
                "response of {body_len} bytes exceeds limit"
            )));
        }
        let mut body = vec![0u8; body_len];
        self.stream.read_exact(&mut body).await?;
        Ok(StorageReader::new(Bytes::from(body)))
    }

    /// Send one command and return the response after its status part.
    ///
    /// # Errors
    ///
    /// [`TraciError::Command`] if the server rejected the command; the
    /// session stays usable. Any other error leaves it unusable.
    pub async fn exchange(
        &mut self,
        command_id: u8,
        payload: &[u8],
    ) -> Result<StorageReader, TraciError> {
        let frame = codec::encode_command(command_id, payload)?;
        self.send(&codec::encode_message(&[frame])?).await?;

        let mut response = self.receive().await?;
        let reply = response.read_status()?;
        if reply.command != command_id {
            return Err(TraciError::malformed(format!(
                "status for command 0x{:02x}, expected 0x{command_id:02x}",
                reply.command
            )));
        }
        match reply.result {
            status::OK => Ok(response),
            status::NOT_IMPLEMENTED | status::ERR => Err(TraciError::Command {
                command: command_id,
                description: reply.description,
            }),
            other => Err(TraciError::malformed(format!(
                "unknown status code 0x{other:02x}"
            ))),
        }
    }

    /// Handshake: ask for the API version.
    pub async fn version(&mut self) -> Result<ServerVersion, TraciError> {
        let mut response = self.exchange(command::GET_VERSION, &[]).await?;
        let (id, mut body) = response.read_command()?;
        if id != command::GET_VERSION {
            return Err(TraciError::malformed(format!(
                "version response has id 0x{id:02x}"
            )));
        }
        Ok(ServerVersion {
            api_version: body.read_i32()?,
            identifier: body.read_string()?,
        })
    }

    /// Advance the simulation by one step.
    ///
    /// Subscription results are not used and are discarded.
    pub async fn simulation_step(&mut self) -> Result<(), TraciError> {
        let target_time = 0.0f64.to_be_bytes();
        let mut response = self
            .exchange(command::SIMULATION_STEP, &target_time)
            .await?;
        let subscriptions = response.read_i32()?;
        if subscriptions != 0 {
            debug!(subscriptions, "Ignoring subscription results");
        }
        Ok(())
    }

    /// Query one variable and return the reader positioned at its typed
    /// value.
    ///
    /// The whole reply has been read off the socket by then, so a value
    /// that fails to decode leaves the session in sync; the typed getters
    /// below report that as [`TraciError::Decode`].
    pub async fn get_variable(
        &mut self,
        domain: u8,
        var: u8,
        object_id: &str,
        params: Option<&[u8]>,
    ) -> Result<StorageReader, TraciError> {
        let payload = variable_request(var, object_id, params)?;
        let mut response = self.exchange(domain, &payload).await?;

        let (id, mut body) = response.read_command()?;
        let expected = domain.wrapping_add(command::RESPONSE_OFFSET);
        if id != expected {
            return Err(TraciError::malformed(format!(
                "response id 0x{id:02x}, expected 0x{expected:02x}"
            )));
        }
        let echoed_var = body.read_u8()?;
        if echoed_var != var {
            return Err(TraciError::malformed(format!(
                "response for variable 0x{echoed_var:02x}, expected 0x{var:02x}"
            )));
        }
        let _object_id = body.read_string()?;
        Ok(body)
    }

    /// All object IDs in a domain.
    pub async fn id_list(&mut self, domain: u8) -> Result<Vec<String>, TraciError> {
        self.get_variable(domain, variable::ID_LIST, "", None)
            .await?
            .read_typed_string_list()
    }

    /// A double variable.
    pub async fn get_f64(&mut self, domain: u8, var: u8, id: &str) -> Result<f64, TraciError> {
        self.get_variable(domain, var, id, None)
            .await?
            .read_typed_f64()
            .map_err(TraciError::into_value_error)
    }

    /// A string variable.
    pub async fn get_string(
        &mut self,
        domain: u8,
        var: u8,
        id: &str,
    ) -> Result<String, TraciError> {
        self.get_variable(domain, var, id, None)
            .await?
            .read_typed_string()
            .map_err(TraciError::into_value_error)
    }

    /// A 2D position variable.
    pub async fn get_position(
        &mut self,
        domain: u8,
        var: u8,
        id: &str,
    ) -> Result<Position2D, TraciError> {
        self.get_variable(domain, var, id, None)
            .await?
            .read_typed_position()
            .map_err(TraciError::into_value_error)
    }

    /// Polyline of a lane.
    pub async fn lane_shape(&mut self, lane_id: &str) -> Result<Vec<Position2D>, TraciError> {
        self.get_variable(command::GET_LANE_VARIABLE, variable::SHAPE, lane_id, None)
            .await?
            .read_typed_shape()
            .map_err(TraciError::into_value_error)
    }

    /// Links controlled by each signal index of a traffic light.
    pub async fn controlled_links(
        &mut self,
        tl_id: &str,
    ) -> Result<Vec<Vec<ControlledLink>>, TraciError> {
        self.get_variable(
            command::GET_TL_VARIABLE,
            variable::TL_CONTROLLED_LINKS,
            tl_id,
            None,
        )
        .await?
        .read_controlled_links()
        .map_err(TraciError::into_value_error)
    }

    /// Network bounding box as (lower-left, upper-right).
    pub async fn net_boundary(&mut self) -> Result<(Position2D, Position2D), TraciError> {
        let shape = self
            .get_variable(
                command::GET_SIM_VARIABLE,
                variable::NET_BOUNDING_BOX,
                "",
                None,
            )
            .await?
            .read_typed_shape()?;
        match shape.as_slice() {
            [lower_left, upper_right] => Ok((*lower_left, *upper_right)),
            other => Err(TraciError::malformed(format!(
                "bounding box with {} points",
                other.len()
            ))),
        }
    }

    /// Convert a network position to `(longitude, latitude)`.
    pub async fn convert_geo(&mut self, position: Position2D) -> Result<(f64, f64), TraciError> {
        let params = geo_conversion_params(position);
        self.get_variable(
            command::GET_SIM_VARIABLE,
            variable::POSITION_CONVERSION,
            "",
            Some(&params),
        )
        .await?
        .read_typed_lon_lat()
        .map_err(TraciError::into_value_error)
    }

    /// Ask the server to end the session.
    pub async fn close(&mut self) -> Result<(), TraciError> {
        self.exchange(command::CLOSE, &[]).await?;
        self.stream.shutdown().await?;
        Ok(())
    }
}
