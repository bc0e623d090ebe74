//! Simulator adapter traits and the readings they produce.
//!
//! The streaming loop never talks to the simulator directly. It holds a
//! boxed [`SimulatorAdapter`] obtained from an [`AdapterConnector`] and pulls
//! raw [`VehicleReading`]s and [`SignalReading`]s from it once per step. The
//! production implementation speaks TraCI to a SUMO process; tests use
//! [`StubConnector`](crate::stub::StubConnector).
//!
//! # Partial results
//!
//! Listing entities is a batch of per-entity queries. A single entity can
//! vanish between the ID listing and its detail query, so the list
//! operations return an [`EntityBatch`]: every entity that could be read,
//! plus a record of the ones that could not. Only a failure of the session
//! itself is an `Err`.

use std::path::Path;

use async_trait::async_trait;
use vegha_types::{GeoPoint, NetworkBounds};

/// Errors surfaced by a simulator adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    /// The simulator could not be started or the handshake failed.
    #[error("simulator unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },

    /// The session was lost mid-run.
    #[error("simulator disconnected: {message}")]
    Disconnected {
        /// Description of the failure.
        message: String,
    },

    /// Network bounds were requested with no open session.
    #[error("network bounds unavailable: no open session")]
    BoundsUnavailable,
}

impl AdapterError {
    /// Convenience constructor for [`AdapterError::Unavailable`].
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Convenience constructor for [`AdapterError::Disconnected`].
    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::Disconnected {
            message: message.into(),
        }
    }
}

/// One vehicle as read from the simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleReading {
    /// Simulator vehicle ID.
    pub id: String,
    /// Position converted to longitude/latitude.
    pub location: GeoPoint,
    /// Heading in degrees.
    pub heading_degrees: f64,
    /// Native vehicle type ID (e.g. `"veh_passenger"`).
    pub native_type: String,
    /// Current speed in metres per second.
    pub speed_mps: f64,
}

/// One traffic signal as read from the simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalReading {
    /// Simulator traffic-light ID.
    pub id: String,
    /// End point of the first controlled lane.
    pub location: GeoPoint,
    /// Bearing of the final lane segment in degrees.
    pub heading_degrees: f64,
    /// Raw per-link state string (`"GGrryy"`).
    pub state: String,
}

/// An entity whose detail query failed and was left out of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityFailure {
    /// The entity ID from the listing.
    pub id: String,
    /// Why it could not be read.
    pub reason: String,
}

/// Result of listing one kind of entity: successes plus omissions.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityBatch<T> {
    /// Entities read successfully.
    pub items: Vec<T>,
    /// Entities omitted because their query failed.
    pub failures: Vec<EntityFailure>,
}

impl<T> EntityBatch<T> {
    /// An empty batch.
    pub const fn new() -> Self {
        Self {
            items: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Record a successfully read entity.
    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Record an omitted entity.
    pub fn omit(&mut self, id: impl Into<String>, reason: impl Into<String>) {
        self.failures.push(EntityFailure {
            id: id.into(),
            reason: reason.into(),
        });
    }

    /// Fold a per-entity query result into the batch.
    pub fn record<E: std::fmt::Display>(&mut self, id: &str, result: Result<T, E>) {
        match result {
            Ok(item) => self.push(item),
            Err(e) => self.omit(id, e.to_string()),
        }
    }

    /// Whether any entity was omitted.
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

impl<T> Default for EntityBatch<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for EntityBatch<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
            failures: Vec::new(),
        }
    }
}

/// An open session with the simulator.
///
/// A session is owned by exactly one streaming loop; implementations need
/// not support concurrent use.
#[async_trait]
pub trait SimulatorAdapter: Send {
    /// Advance the simulation by one step.
    async fn advance_step(&mut self) -> Result<(), AdapterError>;

    /// Read every live vehicle. Per-vehicle failures are omitted.
    async fn list_vehicles(&mut self) -> Result<EntityBatch<VehicleReading>, AdapterError>;

    /// Read every live traffic signal. Per-signal failures are omitted.
    async fn list_signals(&mut self) -> Result<EntityBatch<SignalReading>, AdapterError>;

    /// Geographic extent of the road network.
    ///
    /// Returns [`AdapterError::BoundsUnavailable`] once the session is closed.
    async fn network_bounds(&mut self) -> Result<NetworkBounds, AdapterError>;

    /// Release the session. Calling this more than once is harmless.
    async fn close(&mut self);
}

/// Opens simulator sessions.
#[async_trait]
pub trait AdapterConnector: Send + Sync {
    /// Start the simulator on `scenario` and open a session.
    ///
    /// Fails with [`AdapterError::Unavailable`] if the process cannot be
    /// started or the handshake fails.
    async fn connect(&self, scenario: &Path) -> Result<Box<dyn SimulatorAdapter>, AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_splits_successes_and_failures() {
        let mut batch: EntityBatch<u32> = EntityBatch::new();
        batch.record::<String>("a", Ok(1));
        batch.record("b", Err("vehicle 'b' is not known"));
        batch.record::<String>("c", Ok(3));

        assert_eq!(batch.items, vec![1, 3]);
        assert!(batch.is_partial());
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures.first().map(|f| f.id.as_str()), Some("b"));
    }

    #[test]
    fn collected_batch_is_complete() {
        let batch: EntityBatch<u32> = (0..4).collect();
        assert_eq!(batch.items.len(), 4);
        assert!(!batch.is_partial());
    }
}
