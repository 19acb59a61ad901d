use crate::normalize::PointValue;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::watch;

/// The latest consistent set of all data point values. The poller replaces it
/// atomically at the end of each cycle; counter-kind keys always carry the
/// reconciled lifetime total.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub values: BTreeMap<&'static str, PointValue>,
    /// Set after the gateway has been unreachable for the configured number
    /// of consecutive cycles; cleared by the next successful cycle
    pub stale: bool,
    /// When the values were last refreshed; None until the first successful
    /// cycle
    pub updated_at: Option<DateTime<Utc>>,
}

/// Single-writer store distributing the current snapshot to any number of
/// consumers. Publication is one atomic replace, so readers never observe a
/// half-updated snapshot.
#[derive(Debug)]
pub struct SnapshotStore {
    tx: watch::Sender<Snapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Snapshot::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    pub fn publish(&self, snapshot: Snapshot) {
        self.tx.send_replace(snapshot);
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
