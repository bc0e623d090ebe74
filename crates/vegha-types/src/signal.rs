//! Traffic signal state and phase classification.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::geo::{GeoPoint, lon_lat};

/// The single phase reported for a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum SignalPhase {
    /// At least one controlled link may proceed.
    Green,
    /// No link is green but at least one is amber.
    Yellow,
    /// Every link is stopped.
    Red,
}

impl SignalPhase {
    /// Collapse a per-link red/yellow/green state string into one phase.
    ///
    /// The simulator reports one character per controlled link (`G`, `g`,
    /// `y`, `r`, `o`, ...). The most permissive state present wins:
    /// green, then yellow, then red.
    pub fn classify(link_states: &str) -> Self {
        if link_states.chars().any(|c| c.eq_ignore_ascii_case(&'g')) {
            Self::Green
        } else if link_states.chars().any(|c| c.eq_ignore_ascii_case(&'y')) {
            Self::Yellow
        } else {
            Self::Red
        }
    }
}

/// A live traffic signal as drawn on the map.
///
/// Serialized as `{"pos": [lon, lat], "angle": deg, "state": "green"}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SignalState {
    /// Stop-line position (end of the first controlled lane).
    #[serde(rename = "pos", with = "lon_lat")]
    #[ts(type = "[number, number]")]
    pub location: GeoPoint,
    /// Bearing of the lane's final segment in degrees.
    #[serde(rename = "angle")]
    pub heading_degrees: f64,
    /// Collapsed phase.
    #[serde(rename = "state")]
    pub phase: SignalPhase,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn green_beats_yellow_and_red() {
        assert_eq!(SignalPhase::classify("ryg"), SignalPhase::Green);
        assert_eq!(SignalPhase::classify("rrrG"), SignalPhase::Green);
    }

    #[test]
    fn yellow_beats_red() {
        assert_eq!(SignalPhase::classify("ry"), SignalPhase::Yellow);
        assert_eq!(SignalPhase::classify("rYr"), SignalPhase::Yellow);
    }

    #[test]
    fn only_red_or_unknown_is_red() {
        assert_eq!(SignalPhase::classify("rr"), SignalPhase::Red);
        assert_eq!(SignalPhase::classify("ros"), SignalPhase::Red);
        assert_eq!(SignalPhase::classify(""), SignalPhase::Red);
    }

    #[test]
    fn wire_shape() {
        let signal = SignalState {
            location: GeoPoint::new(13.4, 52.5),
            heading_degrees: -45.0,
            phase: SignalPhase::Yellow,
        };
        let json = serde_json::to_value(signal).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"pos": [13.4, 52.5], "angle": -45.0, "state": "yellow"})
        );
    }
}
