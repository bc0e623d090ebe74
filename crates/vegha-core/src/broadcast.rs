//! Snapshot fan-out to connected viewers.
//!
//! [`SnapshotBroadcaster`] wraps a [`tokio::sync::broadcast`] channel.
//! Publishing never waits on a viewer: each subscriber has its own cursor
//! into a bounded ring, a viewer that falls more than `capacity` snapshots
//! behind skips to the newest one, and a dropped subscriber simply stops
//! counting. Snapshots are shared behind an [`Arc`] so the maps are not
//! cloned per viewer.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;
use vegha_types::SimulationSnapshot;

/// Destination for snapshots produced by the streaming loop.
pub trait SnapshotSink: Send + Sync {
    /// Deliver a snapshot to every current viewer.
    ///
    /// Returns the number of viewers it was queued for. Delivery problems
    /// with individual viewers are never reported back.
    fn publish(&self, snapshot: SimulationSnapshot) -> usize;
}

/// Broadcast channel for simulation snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotBroadcaster {
    tx: broadcast::Sender<Arc<SimulationSnapshot>>,
}

impl SnapshotBroadcaster {
    /// Create a broadcaster buffering up to `capacity` snapshots per viewer.
    ///
    /// `capacity` must be positive; configuration validation guarantees it.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Register a new viewer. It receives snapshots published from now on.
    pub fn subscribe(&self) -> SnapshotSubscription {
        SnapshotSubscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of currently connected viewers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl SnapshotSink for SnapshotBroadcaster {
    fn publish(&self, snapshot: SimulationSnapshot) -> usize {
        // send only fails when nobody is subscribed, which is normal
        // before any dashboard connects.
        self.tx.send(Arc::new(snapshot)).unwrap_or(0)
    }
}

/// One viewer's view of the snapshot stream.
///
/// Dropping the subscription (or calling [`unsubscribe`](Self::unsubscribe))
/// removes the viewer.
#[derive(Debug)]
pub struct SnapshotSubscription {
    rx: broadcast::Receiver<Arc<SimulationSnapshot>>,
}

impl SnapshotSubscription {
    /// Wait for the next snapshot.
    ///
    /// If this viewer lagged behind, the missed snapshots are skipped and
    /// the oldest retained one is returned. Since every snapshot is
    /// complete, nothing is lost by skipping. Returns `None` once the
    /// broadcaster is gone.
    pub async fn recv(&mut self) -> Option<Arc<SimulationSnapshot>> {
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Snapshot subscriber lagged, skipping ahead");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Leave the broadcast.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn snapshot(step_index: u64) -> SimulationSnapshot {
        SimulationSnapshot {
            step_index,
            ..SimulationSnapshot::default()
        }
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let broadcaster = SnapshotBroadcaster::new(4);
        assert_eq!(broadcaster.publish(snapshot(0)), 0);
    }

    #[tokio::test]
    async fn every_subscriber_receives_the_snapshot() {
        let broadcaster = SnapshotBroadcaster::new(4);
        let mut a = broadcaster.subscribe();
        let mut b = broadcaster.subscribe();

        assert_eq!(broadcaster.publish(snapshot(7)), 2);
        assert_eq!(a.recv().await.unwrap().step_index, 7);
        assert_eq!(b.recv().await.unwrap().step_index, 7);
    }

    #[tokio::test]
    async fn departed_subscriber_does_not_block_the_others() {
        let broadcaster = SnapshotBroadcaster::new(4);
        let mut first = broadcaster.subscribe();
        let leaving = broadcaster.subscribe();
        let mut last = broadcaster.subscribe();

        broadcaster.publish(snapshot(0));
        leaving.unsubscribe();
        assert_eq!(broadcaster.subscriber_count(), 2);

        assert_eq!(broadcaster.publish(snapshot(1)), 2);
        assert_eq!(first.recv().await.unwrap().step_index, 0);
        assert_eq!(first.recv().await.unwrap().step_index, 1);
        assert_eq!(last.recv().await.unwrap().step_index, 0);
        assert_eq!(last.recv().await.unwrap().step_index, 1);
    }

    #[tokio::test]
    async fn slow_subscriber_skips_ahead_without_blocking_publish() {
        let broadcaster = SnapshotBroadcaster::new(2);
        let mut slow = broadcaster.subscribe();
        let mut fast = broadcaster.subscribe();

        for step in 0..10 {
            broadcaster.publish(snapshot(step));
            assert_eq!(fast.recv().await.unwrap().step_index, step);
        }

        // only the last `capacity` snapshots are retained for the slow one
        assert_eq!(slow.recv().await.unwrap().step_index, 8);
        assert_eq!(slow.recv().await.unwrap().step_index, 9);
    }

    #[tokio::test]
    async fn recv_ends_when_broadcaster_is_dropped() {
        let broadcaster = SnapshotBroadcaster::new(2);
        let mut sub = broadcaster.subscribe();
        drop(broadcaster);
        assert!(sub.recv().await.is_none());
    }
}
