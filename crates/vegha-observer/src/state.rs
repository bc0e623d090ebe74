//! Shared application state for the observer API.
//!
//! [`AppState`] pairs the [`PlaybackController`] that every command goes
//! through with the [`SnapshotBroadcaster`] that every `WebSocket` viewer
//! subscribes to. The controller publishes into the same broadcaster, so
//! the state needs no locking of its own.

use std::sync::Arc;

use serde::Serialize;
use vegha_core::{PlaybackController, PlaybackStatus, SnapshotBroadcaster, SnapshotSubscription};

/// Playback status plus the number of connected viewers.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Controller status.
    #[serde(flatten)]
    pub playback: PlaybackStatus,
    /// Connected `WebSocket` viewers.
    pub subscribers: usize,
}

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Playback lifecycle.
    pub controller: Arc<PlaybackController>,
    /// Snapshot fan-out. Must be the sink the controller publishes to.
    pub broadcaster: SnapshotBroadcaster,
}

impl AppState {
    /// Create the state from a controller and the broadcaster it publishes to.
    pub const fn new(controller: Arc<PlaybackController>, broadcaster: SnapshotBroadcaster) -> Self {
        Self {
            controller,
            broadcaster,
        }
    }

    /// Subscribe a new viewer to the snapshot stream.
    pub fn subscribe(&self) -> SnapshotSubscription {
        self.broadcaster.subscribe()
    }

    /// Current status including the viewer count.
    pub async fn status_report(&self) -> StatusReport {
        StatusReport {
            playback: self.controller.status().await,
            subscribers: self.broadcaster.subscriber_count(),
        }
    }
}
