use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Running reconciliation state for one daily-reset counter. This is the only
/// place the lifetime total lives, so it is persisted across restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterState {
    /// Most recent raw daily reading, in kWh
    pub last_daily: f64,
    /// Lifetime total, non-decreasing across days and resets
    pub total: f64,
    /// Reset epoch the daily reading belongs to
    pub day: NaiveDate,
}

/// Folds successive daily counter readings into monotonic lifetime totals,
/// detecting the upstream's day-boundary resets.
#[derive(Debug)]
pub struct Reconciler {
    states: BTreeMap<String, CounterState>,
    /// A drop larger than this (kWh) is still treated as a reset but logged
    /// as a possible counter wrap or manual device reset
    anomaly_threshold: f64,
    dirty: bool,
}

impl Reconciler {
    pub fn new(anomaly_threshold: f64) -> Self {
        Self::with_states(BTreeMap::new(), anomaly_threshold)
    }

    /// Resume from persisted state, continuing accumulation without
    /// regressing or double-counting the next observed delta.
    pub fn with_states(states: BTreeMap<String, CounterState>, anomaly_threshold: f64) -> Self {
        Self {
            states,
            anomaly_threshold,
            dirty: false,
        }
    }

    pub fn states(&self) -> &BTreeMap<String, CounterState> {
        &self.states
    }

    /// True if any counter changed since the last call; used to decide when
    /// the state file needs rewriting.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Feed one raw daily reading and return the updated lifetime total.
    ///
    /// Readings are assumed non-negative; the normalizer rejects negative
    /// counter values before they get here.
    pub fn observe(&mut self, key: &str, value: f64, today: NaiveDate) -> f64 {
        let state = match self.states.entry(key.to_string()) {
            Entry::Vacant(entry) => {
                info!(counter = key, value, "initializing counter state");
                self.dirty = true;
                entry.insert(CounterState {
                    last_daily: value,
                    total: value,
                    day: today,
                });
                return value;
            }
            Entry::Occupied(entry) => entry.into_mut(),
        };

        if value >= state.last_daily {
            // normal progression within the current day
            let delta = value - state.last_daily;
            if delta > 0.0 || state.day != today {
                self.dirty = true;
            }
            state.total += delta;
            state.last_daily = value;
            state.day = today;
        } else {
            // the daily counter rolled over to a new day; the previous day's
            // increments are already folded in, so the new reading is added
            // wholesale
            let drop = state.last_daily - value;
            if drop > self.anomaly_threshold {
                warn!(
                    counter = key,
                    previous = state.last_daily,
                    value,
                    drop,
                    "counter dropped by an implausible margin; treating as reset \
                     (possible counter wrap or manual device reset)"
                );
            } else {
                debug!(counter = key, value, "daily counter reset detected");
            }
            state.total += value;
            state.last_daily = value;
            state.day = today;
            self.dirty = true;
        }

        state.total
    }
}
