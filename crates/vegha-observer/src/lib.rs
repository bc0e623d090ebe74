//! Observer API server for Vegha simulation streams.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`WebSocket` endpoint** (`/ws`) pushing every snapshot to each
//!   connected viewer and accepting playback commands on the same socket
//! - **Control REST endpoints** (`/api/control/*`, `/api/status`) for
//!   clients that prefer HTTP
//! - **Bounds endpoint** (`/api/bounds`) so a map can fit the network
//! - **Minimal HTML page** (`GET /`) showing the current phase and step
//!
//! # Architecture
//!
//! Handlers never touch the simulator. Commands go through the shared
//! [`PlaybackController`](vegha_core::PlaybackController) and snapshots
//! arrive via the [`SnapshotBroadcaster`](vegha_core::SnapshotBroadcaster),
//! so a slow viewer can only lag itself.

pub mod control;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

pub use error::ObserverError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError};
pub use startup::{StartupError, spawn_observer};
pub use state::{AppState, StatusReport};
