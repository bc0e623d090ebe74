//! Scripted in-memory simulator for tests and offline runs.
//!
//! [`StubConnector`] hands out [`StubAdapter`] sessions that replay a fixed
//! [`StubScript`]: the same vehicles and signals every step, optional
//! entities whose detail query always fails, and an optional step after
//! which the session drops. [`StubCounters`] let tests observe how the
//! streaming core used the simulator.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use vegha_types::{GeoPoint, NetworkBounds};

use crate::adapter::{
    AdapterConnector, AdapterError, EntityBatch, SignalReading, SimulatorAdapter, VehicleReading,
};

/// What a stub session reports.
#[derive(Debug, Clone)]
pub struct StubScript {
    /// Vehicles reported every step.
    pub vehicles: Vec<VehicleReading>,
    /// Signals reported every step.
    pub signals: Vec<SignalReading>,
    /// Entity IDs (vehicle or signal) whose detail query fails.
    pub flaky_ids: Vec<String>,
    /// Number of successful steps before the session drops.
    pub disconnect_after: Option<u64>,
    /// Network extent.
    pub bounds: NetworkBounds,
}

impl StubScript {
    /// A small scene: three vehicles (one stationary) and two signals.
    pub fn city() -> Self {
        Self {
            vehicles: vec![
                stub_vehicle("veh0", "veh_passenger", 10.0),
                stub_vehicle("veh1", "bus_city", 5.0),
                stub_vehicle("veh2", "truck", 0.0),
            ],
            signals: vec![stub_signal("tl0", "GGrr"), stub_signal("tl1", "ryry")],
            flaky_ids: Vec::new(),
            disconnect_after: None,
            bounds: NetworkBounds::from_corners(
                GeoPoint::new(13.38, 52.51),
                GeoPoint::new(13.42, 52.53),
            ),
        }
    }

    /// The same scene, dropping the session after `steps` steps.
    #[must_use]
    pub const fn disconnecting_after(mut self, steps: u64) -> Self {
        self.disconnect_after = Some(steps);
        self
    }

    /// The same scene, with `id` failing its detail query.
    #[must_use]
    pub fn with_flaky(mut self, id: &str) -> Self {
        self.flaky_ids.push(id.to_owned());
        self
    }
}

impl Default for StubScript {
    fn default() -> Self {
        Self::city()
    }
}

/// A vehicle reading at a fixed position near Berlin Mitte.
pub fn stub_vehicle(id: &str, native_type: &str, speed_mps: f64) -> VehicleReading {
    VehicleReading {
        id: id.to_owned(),
        location: GeoPoint::new(13.40, 52.52),
        heading_degrees: 90.0,
        native_type: native_type.to_owned(),
        speed_mps,
    }
}

/// A signal reading at a fixed position near Berlin Mitte.
pub fn stub_signal(id: &str, state: &str) -> SignalReading {
    SignalReading {
        id: id.to_owned(),
        location: GeoPoint::new(13.401, 52.521),
        heading_degrees: 0.0,
        state: state.to_owned(),
    }
}

/// Usage counters shared by a connector and all of its sessions.
#[derive(Debug, Default)]
pub struct StubCounters {
    connects: AtomicU64,
    steps: AtomicU64,
    closes: AtomicU64,
    live_sessions: AtomicU64,
    max_live_sessions: AtomicU64,
}

impl StubCounters {
    /// Sessions opened.
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::Acquire)
    }

    /// Successful steps across all sessions.
    pub fn steps(&self) -> u64 {
        self.steps.load(Ordering::Acquire)
    }

    /// Sessions closed.
    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::Acquire)
    }

    /// Sessions currently open.
    pub fn live_sessions(&self) -> u64 {
        self.live_sessions.load(Ordering::Acquire)
    }

    /// Highest number of sessions ever open at once.
    pub fn max_live_sessions(&self) -> u64 {
        self.max_live_sessions.load(Ordering::Acquire)
    }

    fn opened(&self) {
        self.connects.fetch_add(1, Ordering::AcqRel);
        let live = self.live_sessions.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        self.max_live_sessions.fetch_max(live, Ordering::AcqRel);
    }

    fn closed(&self) {
        self.closes.fetch_add(1, Ordering::AcqRel);
        self.live_sessions.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Connector producing [`StubAdapter`] sessions.
#[derive(Debug, Default)]
pub struct StubConnector {
    script: StubScript,
    refuse: AtomicBool,
    connect_delay_ms: AtomicU64,
    counters: Arc<StubCounters>,
}

impl StubConnector {
    /// A connector replaying `script`.
    pub fn new(script: StubScript) -> Self {
        Self {
            script,
            refuse: AtomicBool::new(false),
            connect_delay_ms: AtomicU64::new(0),
            counters: Arc::new(StubCounters::default()),
        }
    }

    /// Make subsequent connects fail (or succeed again).
    pub fn set_refusing(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::Release);
    }

    /// Make subsequent connects take `delay`, like a slow simulator start.
    pub fn set_connect_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.connect_delay_ms.store(millis, Ordering::Release);
    }

    /// Shared usage counters.
    pub fn counters(&self) -> Arc<StubCounters> {
        Arc::clone(&self.counters)
    }
}

#[async_trait]
impl AdapterConnector for StubConnector {
    async fn connect(&self, scenario: &Path) -> Result<Box<dyn SimulatorAdapter>, AdapterError> {
        let delay = self.connect_delay_ms.load(Ordering::Acquire);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.refuse.load(Ordering::Acquire) {
            return Err(AdapterError::unavailable(format!(
                "stub refused to load {}",
                scenario.display()
            )));
        }
        self.counters.opened();
        Ok(Box::new(StubAdapter {
            script: self.script.clone(),
            counters: Arc::clone(&self.counters),
            steps_taken: 0,
            closed: false,
        }))
    }
}

/// One scripted session.
#[derive(Debug)]
pub struct StubAdapter {
    script: StubScript,
    counters: Arc<StubCounters>,
    steps_taken: u64,
    closed: bool,
}

impl StubAdapter {
    fn ensure_open(&self) -> Result<(), AdapterError> {
        if self.closed {
            return Err(AdapterError::disconnected("stub session closed"));
        }
        Ok(())
    }

    fn is_flaky(&self, id: &str) -> bool {
        self.script.flaky_ids.iter().any(|flaky| flaky == id)
    }
}

#[async_trait]
impl SimulatorAdapter for StubAdapter {
    async fn advance_step(&mut self) -> Result<(), AdapterError> {
        self.ensure_open()?;
        if self
            .script
            .disconnect_after
            .is_some_and(|limit| self.steps_taken >= limit)
        {
            return Err(AdapterError::disconnected("stub connection reset by peer"));
        }
        self.steps_taken = self.steps_taken.saturating_add(1);
        self.counters.steps.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn list_vehicles(&mut self) -> Result<EntityBatch<VehicleReading>, AdapterError> {
        self.ensure_open()?;
        let mut batch = EntityBatch::new();
        for vehicle in &self.script.vehicles {
            if self.is_flaky(&vehicle.id) {
                batch.omit(&vehicle.id, format!("Vehicle '{}' is not known", vehicle.id));
            } else {
                batch.push(vehicle.clone());
            }
        }
        Ok(batch)
    }

    async fn list_signals(&mut self) -> Result<EntityBatch<SignalReading>, AdapterError> {
        self.ensure_open()?;
        let mut batch = EntityBatch::new();
        for signal in &self.script.signals {
            if self.is_flaky(&signal.id) {
                batch.omit(&signal.id, format!("Traffic light '{}' is not known", signal.id));
            } else {
                batch.push(signal.clone());
            }
        }
        Ok(batch)
    }

    async fn network_bounds(&mut self) -> Result<NetworkBounds, AdapterError> {
        if self.closed {
            return Err(AdapterError::BoundsUnavailable);
        }
        Ok(self.script.bounds)
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counters.closed();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flaky_entities_are_omitted() {
        let connector = StubConnector::new(StubScript::city().with_flaky("veh1").with_flaky("tl0"));
        let mut session = connector.connect(Path::new("city.sumocfg")).await.unwrap();

        let vehicles = session.list_vehicles().await.unwrap();
        assert_eq!(vehicles.items.len(), 2);
        assert_eq!(vehicles.failures.len(), 1);

        let signals = session.list_signals().await.unwrap();
        assert_eq!(signals.items.len(), 1);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let connector = StubConnector::new(StubScript::city());
        let counters = connector.counters();
        let mut session = connector.connect(Path::new("city.sumocfg")).await.unwrap();
        assert_eq!(counters.live_sessions(), 1);

        session.close().await;
        session.close().await;
        assert_eq!(counters.closes(), 1);
        assert_eq!(counters.live_sessions(), 0);
        assert_eq!(
            session.network_bounds().await,
            Err(AdapterError::BoundsUnavailable)
        );
    }

    #[tokio::test]
    async fn disconnects_after_scripted_steps() {
        let connector = StubConnector::new(StubScript::city().disconnecting_after(2));
        let mut session = connector.connect(Path::new("city.sumocfg")).await.unwrap();
        assert!(session.advance_step().await.is_ok());
        assert!(session.advance_step().await.is_ok());
        assert!(matches!(
            session.advance_step().await,
            Err(AdapterError::Disconnected { .. })
        ));
    }

    #[tokio::test]
    async fn refusing_connector_is_unavailable() {
        let connector = StubConnector::new(StubScript::city());
        connector.set_refusing(true);
        let result = connector.connect(Path::new("city.sumocfg")).await;
        assert!(matches!(result, Err(AdapterError::Unavailable { .. })));
        assert_eq!(connector.counters().connects(), 0);
    }
}
