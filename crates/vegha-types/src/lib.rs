//! Wire model shared between the Vegha streaming core and the map dashboard.
//!
//! Everything a viewer receives or sends crosses the wire as one of the
//! types in this crate. Types flow downstream to `TypeScript` via `ts-rs`
//! for the dashboard.
//!
//! # Modules
//!
//! - [`geo`] -- Geographic points and the network bounding box
//! - [`vehicle`] -- Vehicle positions and category classification
//! - [`signal`] -- Traffic signal state and phase classification
//! - [`snapshot`] -- The per-step [`SimulationSnapshot`]
//! - [`control`] -- Playback phase and operator commands

pub mod control;
pub mod geo;
pub mod signal;
pub mod snapshot;
pub mod vehicle;

// Re-export all public types at crate root for convenience.
pub use control::{Phase, PlaybackCommand, SpeedRequest};
pub use geo::{GeoPoint, NetworkBounds};
pub use signal::{SignalPhase, SignalState};
pub use snapshot::SimulationSnapshot;
pub use vehicle::{VehicleCategory, VehiclePosition};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation for the dashboard.

    #[test]
    fn export_bindings() {
        // The files are written to the `bindings/` directory relative to
        // the crate root.
        use ts_rs::TS;

        let _ = crate::geo::NetworkBounds::export_all();
        let _ = crate::vehicle::VehicleCategory::export_all();
        let _ = crate::vehicle::VehiclePosition::export_all();
        let _ = crate::signal::SignalPhase::export_all();
        let _ = crate::signal::SignalState::export_all();
        let _ = crate::snapshot::SimulationSnapshot::export_all();
        let _ = crate::control::Phase::export_all();
        let _ = crate::control::PlaybackCommand::export_all();
        let _ = crate::control::SpeedRequest::export_all();
    }
}
