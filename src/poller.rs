use crate::config::PollConfig;
use crate::extract;
use crate::gateway::IsgClient;
use crate::normalize::{self, PointValue};
use crate::reconcile::Reconciler;
use crate::schema::{Page, PointKind};
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::state;
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

/// Drives one full acquisition pass (fetch, extract, normalize, reconcile)
/// per tick on a fixed interval. Cycles are strictly serialized: a tick fires
/// only after the previous cycle finished, so an in-flight fetch is never
/// raced.
pub struct Poller {
    client: IsgClient,
    reconciler: Reconciler,
    store: SnapshotStore,
    interval: Duration,
    stale_after: u32,
    state_path: Option<PathBuf>,
    consecutive_failures: u32,
}

impl Poller {
    pub fn new(
        client: IsgClient,
        reconciler: Reconciler,
        poll: &PollConfig,
        state_path: Option<PathBuf>,
    ) -> Self {
        Self {
            client,
            reconciler,
            store: SnapshotStore::new(),
            interval: Duration::from_secs(poll.interval_secs),
            stale_after: poll.stale_after_cycles,
            state_path,
            consecutive_failures: 0,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.store.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.store.current()
    }

    /// Poll until the task is dropped. Missed ticks are delayed, not stacked,
    /// so a slow gateway cannot cause overlapping cycles.
    pub async fn run(mut self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.run_cycle().await;
        }
    }

    /// Run a single acquisition cycle.
    pub async fn run_cycle(&mut self) {
        let mut fetched: Vec<(Page, String)> = Vec::new();
        for page in Page::DATA_PAGES {
            match self.client.fetch(page).await {
                Ok(html) => fetched.push((page, html)),
                Err(e) => warn!(page = page.name(), error = %e, "page fetch failed"),
            }
        }

        if fetched.is_empty() {
            // whole-gateway outage: keep the last snapshot and its counter
            // state untouched, escalate staleness after the threshold
            self.consecutive_failures += 1;
            warn!(
                consecutive = self.consecutive_failures,
                "gateway gave no data this cycle, keeping last snapshot"
            );
            if self.consecutive_failures >= self.stale_after {
                let mut snapshot = self.store.current();
                if !snapshot.stale {
                    warn!(
                        cycles = self.consecutive_failures,
                        "marking snapshot stale"
                    );
                    snapshot.stale = true;
                    self.store.publish(snapshot);
                }
            }
            return;
        }
        self.consecutive_failures = 0;

        // fields that fail this cycle keep the previous snapshot's value
        let mut values: BTreeMap<&'static str, PointValue> = self.store.current().values;
        let today = Utc::now().date_naive();
        let mut refreshed = 0usize;

        for (page, html) in &fetched {
            for (point, extracted) in extract::extract_page(*page, html) {
                let token = match extracted {
                    Ok(token) => token,
                    Err(e) => {
                        warn!(field = point.key, error = %e, "extraction failed, keeping previous value");
                        continue;
                    }
                };
                match normalize::normalize(point, &token) {
                    Ok(PointValue::Number(v)) if point.kind == PointKind::DailyCounter => {
                        let total = self.reconciler.observe(point.key, v, today);
                        values.insert(point.key, PointValue::Number(total));
                        refreshed += 1;
                    }
                    Ok(value) => {
                        values.insert(point.key, value);
                        refreshed += 1;
                    }
                    Err(e) => {
                        warn!(field = point.key, error = %e, "normalization failed, keeping previous value");
                    }
                }
            }
        }

        if self.reconciler.take_dirty() {
            if let Some(path) = &self.state_path {
                if let Err(e) = state::save(path, self.reconciler.states()) {
                    warn!(error = %e, "failed to persist counter state");
                }
            }
        }

        self.store.publish(Snapshot {
            values,
            stale: false,
            updated_at: Some(Utc::now()),
        });
        debug!(fields = refreshed, "cycle complete");
    }
}
