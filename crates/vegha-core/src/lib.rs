//! Streaming core of the Vegha traffic dashboard.
//!
//! This crate turns a stepped traffic simulation into a live stream of
//! [`SimulationSnapshot`]s. It knows nothing about TraCI or HTTP: the
//! simulator sits behind the [`SimulatorAdapter`] trait and viewers sit
//! behind the [`SnapshotSink`] trait.
//!
//! # Modules
//!
//! - [`config`] -- YAML configuration with environment overrides
//! - [`adapter`] -- Simulator adapter traits and raw readings
//! - [`playback`] -- Phase state machine and shared run state
//! - [`streaming`] -- The step/collect/publish loop and snapshot assembly
//! - [`broadcast`] -- Fan-out of snapshots to viewers
//! - [`controller`] -- Run lifecycle behind the command surfaces
//! - [`stub`] -- Scripted in-memory simulator
//!
//! [`SimulationSnapshot`]: vegha_types::SimulationSnapshot
//! [`SimulatorAdapter`]: adapter::SimulatorAdapter
//! [`SnapshotSink`]: broadcast::SnapshotSink

pub mod adapter;
pub mod broadcast;
pub mod config;
pub mod controller;
pub mod playback;
pub mod streaming;
pub mod stub;

pub use adapter::{
    AdapterConnector, AdapterError, EntityBatch, EntityFailure, SignalReading, SimulatorAdapter,
    VehicleReading,
};
pub use broadcast::{SnapshotBroadcaster, SnapshotSink, SnapshotSubscription};
pub use config::{ConfigError, StreamConfig};
pub use controller::{PlaybackController, PlaybackStatus};
pub use playback::{PlaybackError, PlaybackState, RunState, Transition};
pub use streaming::{StreamEndReason, StreamOutcome};
