//! Geographic coordinates as they appear on the wire.
//!
//! The simulator works in a projected, metre-based coordinate system; the
//! adapter converts every position to WGS84 longitude/latitude before it
//! reaches this crate. Two array orders are in use on the wire:
//!
//! - entity positions are `[lon, lat]` ([`lon_lat`])
//! - the bounding box uses `[lat, lon]` ([`lat_lon`]), the order the map
//!   widget takes for `fitBounds`

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A WGS84 position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Longitude in degrees.
    pub longitude: f64,
    /// Latitude in degrees.
    pub latitude: f64,
}

impl GeoPoint {
    /// Create a point from longitude and latitude.
    pub const fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// The point halfway between `self` and `other`.
    pub fn midpoint(self, other: Self) -> Self {
        Self {
            longitude: (self.longitude + other.longitude) / 2.0,
            latitude: (self.latitude + other.latitude) / 2.0,
        }
    }
}

/// Geographic extent of the loaded road network.
///
/// Serialized as `{"southwest": [lat, lon], "northeast": [lat, lon],
/// "center": [lat, lon]}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct NetworkBounds {
    /// South-west corner.
    #[serde(with = "lat_lon")]
    #[ts(type = "[number, number]")]
    pub southwest: GeoPoint,
    /// North-east corner.
    #[serde(with = "lat_lon")]
    #[ts(type = "[number, number]")]
    pub northeast: GeoPoint,
    /// Midpoint of the two corners.
    #[serde(with = "lat_lon")]
    #[ts(type = "[number, number]")]
    pub center: GeoPoint,
}

impl NetworkBounds {
    /// Build bounds from the two corners, deriving the center.
    pub fn from_corners(southwest: GeoPoint, northeast: GeoPoint) -> Self {
        Self {
            southwest,
            northeast,
            center: southwest.midpoint(northeast),
        }
    }
}

/// Serde adapter writing a [`GeoPoint`] as `[lon, lat]`.
pub mod lon_lat {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::GeoPoint;

    /// Serialize as a two-element `[lon, lat]` array.
    pub fn serialize<S: Serializer>(point: &GeoPoint, serializer: S) -> Result<S::Ok, S::Error> {
        [point.longitude, point.latitude].serialize(serializer)
    }

    /// Deserialize from a two-element `[lon, lat]` array.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<GeoPoint, D::Error> {
        let [longitude, latitude] = <[f64; 2]>::deserialize(deserializer)?;
        Ok(GeoPoint::new(longitude, latitude))
    }
}

/// Serde adapter writing a [`GeoPoint`] as `[lat, lon]`.
pub mod lat_lon {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::GeoPoint;

    /// Serialize as a two-element `[lat, lon]` array.
    pub fn serialize<S: Serializer>(point: &GeoPoint, serializer: S) -> Result<S::Ok, S::Error> {
        [point.latitude, point.longitude].serialize(serializer)
    }

    /// Deserialize from a two-element `[lat, lon]` array.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<GeoPoint, D::Error> {
        let [latitude, longitude] = <[f64; 2]>::deserialize(deserializer)?;
        Ok(GeoPoint::new(longitude, latitude))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn center_is_midpoint_of_corners() {
        let bounds =
            NetworkBounds::from_corners(GeoPoint::new(13.0, 52.0), GeoPoint::new(14.0, 53.0));
        assert_eq!(bounds.center, GeoPoint::new(13.5, 52.5));
    }

    #[test]
    fn bounds_serialize_latitude_first() {
        let bounds =
            NetworkBounds::from_corners(GeoPoint::new(13.0, 52.0), GeoPoint::new(14.0, 53.0));
        let json = serde_json::to_value(bounds).unwrap();
        assert_eq!(json["southwest"], serde_json::json!([52.0, 13.0]));
        assert_eq!(json["northeast"], serde_json::json!([53.0, 14.0]));
        assert_eq!(json["center"], serde_json::json!([52.5, 13.5]));

        let back: NetworkBounds = serde_json::from_value(json).unwrap();
        assert_eq!(back, bounds);
    }
}
