//! TraCI client for the Vegha streaming core.
//!
//! Implements the small part of SUMO's TraCI remote-control protocol needed
//! to step a simulation and read vehicle and traffic-light state, and wraps
//! it as a [`vegha_core::SimulatorAdapter`].
//!
//! # Modules
//!
//! - [`protocol`] -- Command, variable and type constants
//! - [`codec`] -- Framing and the typed storage format
//! - [`connection`] -- One request/response session over TCP
//! - [`launcher`] -- Spawning and reaping the SUMO process
//! - [`adapter`] -- [`SumoAdapter`] and [`SumoConnector`]
//! - [`error`] -- [`TraciError`]

pub mod adapter;
pub mod codec;
pub mod connection;
pub mod error;
pub mod launcher;
pub mod protocol;

pub use adapter::{SumoAdapter, SumoConnector, lane_heading};
pub use connection::{ServerVersion, TraciConnection};
pub use error::TraciError;
