//! The per-step snapshot pushed to every viewer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::signal::SignalState;
use crate::vehicle::VehiclePosition;

/// Complete state of the simulation after one step.
///
/// Snapshots are never deltas: `vehicles` and `traffic_signals` hold
/// exactly the entities the simulator reported live at `step_index`, so a
/// viewer removes anything it is drawing that is absent here.
///
/// Wire field names are `time`, `vehicles`, `traffic_lights`, `avg_speed`
/// and `waiting`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SimulationSnapshot {
    /// Zero-based step index within the current run.
    #[serde(rename = "time")]
    #[ts(type = "number")]
    pub step_index: u64,
    /// Live vehicles keyed by simulator vehicle ID.
    pub vehicles: BTreeMap<String, VehiclePosition>,
    /// Live signals keyed by simulator traffic-light ID.
    #[serde(rename = "traffic_lights")]
    pub traffic_signals: BTreeMap<String, SignalState>,
    /// Mean vehicle speed in whole km/h, 0 with no vehicles.
    #[serde(rename = "avg_speed")]
    pub average_speed_kmh: f64,
    /// Vehicles that are effectively stationary.
    #[serde(rename = "waiting")]
    pub waiting_count: usize,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;
    use crate::signal::SignalPhase;
    use crate::vehicle::VehicleCategory;

    #[test]
    fn wire_field_names() {
        let mut snapshot = SimulationSnapshot {
            step_index: 12,
            average_speed_kmh: 31.0,
            waiting_count: 1,
            ..SimulationSnapshot::default()
        };
        snapshot.vehicles.insert(
            String::from("veh0"),
            VehiclePosition {
                location: GeoPoint::new(13.4, 52.5),
                heading_degrees: 0.0,
                category: VehicleCategory::Passenger,
            },
        );
        snapshot.traffic_signals.insert(
            String::from("tl0"),
            SignalState {
                location: GeoPoint::new(13.41, 52.51),
                heading_degrees: 90.0,
                phase: SignalPhase::Red,
            },
        );

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["time"], 12);
        assert_eq!(json["avg_speed"], 31.0);
        assert_eq!(json["waiting"], 1);
        assert_eq!(json["vehicles"]["veh0"]["type"], "passenger");
        assert_eq!(json["traffic_lights"]["tl0"]["state"], "red");
        assert!(json.get("traffic_signals").is_none());
    }
}
