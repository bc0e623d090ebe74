//! Vehicle positions and category classification.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::geo::{GeoPoint, lon_lat};

/// Display category of a vehicle, used by the dashboard to pick an icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum VehicleCategory {
    /// Trucks and anything towing a trailer.
    Truck,
    /// Buses.
    Bus,
    /// Motorcycles, bicycles and mopeds.
    Motorcycle,
    /// Ambulances and other emergency vehicles.
    Ambulance,
    /// Everything else.
    Passenger,
}

/// Substrings checked against the lowercased native type, in priority order.
///
/// A type string may match more than one row; the first row wins.
const CLASSIFICATION_ORDER: [(VehicleCategory, &[&str]); 4] = [
    (VehicleCategory::Truck, &["truck", "trailer"]),
    (VehicleCategory::Bus, &["bus"]),
    (VehicleCategory::Motorcycle, &["motorcycle", "bike", "moped"]),
    (VehicleCategory::Ambulance, &["ambulance", "emergency"]),
];

impl VehicleCategory {
    /// Classify the simulator's native vehicle type string.
    ///
    /// Matching is case-insensitive and substring-based, checked in the
    /// order truck, bus, motorcycle, ambulance; anything unmatched is a
    /// passenger car.
    pub fn classify(native_type: &str) -> Self {
        let lowered = native_type.to_lowercase();
        CLASSIFICATION_ORDER
            .iter()
            .find(|(_, needles)| needles.iter().any(|needle| lowered.contains(needle)))
            .map_or(Self::Passenger, |(category, _)| *category)
    }
}

/// A live vehicle as drawn on the map.
///
/// Serialized as `{"pos": [lon, lat], "angle": deg, "type": "bus"}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct VehiclePosition {
    /// Geographic position.
    #[serde(rename = "pos", with = "lon_lat")]
    #[ts(type = "[number, number]")]
    pub location: GeoPoint,
    /// Heading in degrees as reported by the simulator (0 = north, clockwise).
    #[serde(rename = "angle")]
    pub heading_degrees: f64,
    /// Display category.
    #[serde(rename = "type")]
    pub category: VehicleCategory,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn classifies_each_category() {
        assert_eq!(VehicleCategory::classify("truck_heavy"), VehicleCategory::Truck);
        assert_eq!(VehicleCategory::classify("car_trailer"), VehicleCategory::Truck);
        assert_eq!(VehicleCategory::classify("city_bus"), VehicleCategory::Bus);
        assert_eq!(VehicleCategory::classify("moped"), VehicleCategory::Motorcycle);
        assert_eq!(VehicleCategory::classify("bike_bicycle"), VehicleCategory::Motorcycle);
        assert_eq!(VehicleCategory::classify("emergency"), VehicleCategory::Ambulance);
        assert_eq!(VehicleCategory::classify("veh_passenger"), VehicleCategory::Passenger);
        assert_eq!(VehicleCategory::classify(""), VehicleCategory::Passenger);
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(VehicleCategory::classify("DEFAULT_BUS"), VehicleCategory::Bus);
        assert_eq!(VehicleCategory::classify("Ambulance"), VehicleCategory::Ambulance);
    }

    #[test]
    fn earlier_category_wins_on_multiple_matches() {
        // bus is checked before ambulance
        assert_eq!(VehicleCategory::classify("ambulance_bus"), VehicleCategory::Bus);
        assert_eq!(VehicleCategory::classify("bus_truck"), VehicleCategory::Truck);
        assert_eq!(VehicleCategory::classify("emergency_moped"), VehicleCategory::Motorcycle);
    }

    #[test]
    fn wire_shape() {
        let vehicle = VehiclePosition {
            location: GeoPoint::new(13.4, 52.5),
            heading_degrees: 90.0,
            category: VehicleCategory::Motorcycle,
        };
        let json = serde_json::to_value(vehicle).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"pos": [13.4, 52.5], "angle": 90.0, "type": "motorcycle"})
        );
    }
}
