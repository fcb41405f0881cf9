//! Rolling live-time window over measurements.
//!
//! The window keeps its entries in arrival order together with running
//! per-channel sums and a running live time, so queries are O(1) in the
//! number of retained entries. Eviction always happens after insertion.

use std::collections::VecDeque;
use std::iter;

use serde::{Deserialize, Serialize};

use crate::invariants::{InvariantChecker, MIN_EVICTIONS_BETWEEN_RESYNC};
use crate::measurement::{accumulate, deplete, Measurement, MeasurementId};

/// How a window decides which old entries to drop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictionPolicy {
    /// Drop the oldest entry only while the rest still cover the duration.
    ///
    /// Once full, the window stays full; its live time stays below
    /// `duration + newest entry's live time`, and it never drops its last entry.
    Covering,
    /// Drop the oldest entries until the live time is at or below the
    /// duration. The window may end up empty.
    Capped,
}

impl EvictionPolicy {
    fn should_evict(self, live_time: f64, oldest_live_time: f64, remaining: usize, duration: f64) -> bool {
        match self {
            Self::Covering => {
                remaining > 1 && InvariantChecker::reaches(live_time - oldest_live_time, duration)
            }
            Self::Capped => remaining > 0 && !InvariantChecker::within(live_time, duration),
        }
    }
}

/// A bounded-duration window of measurements with running sums.
#[derive(Clone, Debug)]
pub struct RollingWindow {
    duration: f64,
    policy: EvictionPolicy,
    entries: VecDeque<Measurement>,
    spectrum: Vec<f64>,
    live_time: f64,
    evictions_since_resync: usize,
}

impl RollingWindow {
    /// Create an empty window over `n_channels` channels.
    pub fn new(n_channels: usize, duration: f64, policy: EvictionPolicy) -> Self {
        Self {
            duration,
            policy,
            entries: VecDeque::new(),
            spectrum: vec![0.0; n_channels],
            live_time: 0.0,
            evictions_since_resync: 0,
        }
    }

    /// A window that stays full once it has covered `duration`.
    pub fn covering(n_channels: usize, duration: f64) -> Self {
        Self::new(n_channels, duration, EvictionPolicy::Covering)
    }

    /// A window that never holds more than `duration` of live time.
    pub fn capped(n_channels: usize, duration: f64) -> Self {
        Self::new(n_channels, duration, EvictionPolicy::Capped)
    }

    /// Append a measurement, then evict per the window's policy.
    ///
    /// Returns the evicted measurements, oldest first.
    pub fn push(&mut self, measurement: Measurement) -> Vec<Measurement> {
        accumulate(&mut self.spectrum, &measurement.counts);
        self.live_time += measurement.live_time;
        self.entries.push_back(measurement);
        self.evict()
    }

    /// Spectrum and live time the window would hold after pushing `candidate`.
    ///
    /// Nothing is mutated; the result matches what `push` would leave behind.
    pub fn preview(&self, candidate: &Measurement) -> (Vec<f64>, f64) {
        let mut spectrum = self.spectrum.clone();
        accumulate(&mut spectrum, &candidate.counts);
        let mut live_time = self.live_time + candidate.live_time;
        let mut remaining = self.entries.len() + 1;

        for oldest in self.entries.iter().chain(iter::once(candidate)) {
            if !self
                .policy
                .should_evict(live_time, oldest.live_time, remaining, self.duration)
            {
                break;
            }
            deplete(&mut spectrum, &oldest.counts);
            live_time -= oldest.live_time;
            remaining -= 1;
        }

        if remaining == 0 {
            spectrum.iter_mut().for_each(|c| *c = 0.0);
            live_time = 0.0;
        }
        (spectrum, live_time.max(0.0))
    }

    /// Remove and return every entry, oldest first.
    pub fn drain(&mut self) -> Vec<Measurement> {
        let drained: Vec<Measurement> = self.entries.drain(..).collect();
        self.reset_sums();
        drained
    }

    /// Per-channel counts summed over the retained entries.
    pub fn spectrum(&self) -> &[f64] {
        &self.spectrum
    }

    /// Live time summed over the retained entries.
    pub fn live_time(&self) -> f64 {
        self.live_time
    }

    /// Per-channel count rate (counts per second); zero while empty.
    pub fn rate(&self) -> Vec<f64> {
        if self.live_time <= 0.0 {
            return vec![0.0; self.spectrum.len()];
        }
        self.spectrum.iter().map(|c| c / self.live_time).collect()
    }

    /// Accumulated live time over configured duration, in `[0, 1]`.
    pub fn fill_fraction(&self) -> f64 {
        InvariantChecker::fill_fraction(self.live_time, self.duration)
    }

    /// Whether the window has covered its configured duration.
    pub fn is_full(&self) -> bool {
        InvariantChecker::reaches(self.live_time, self.duration)
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over retained entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Measurement> {
        self.entries.iter()
    }

    /// Id of the most recently pushed entry still retained.
    pub fn newest_id(&self) -> Option<MeasurementId> {
        self.entries.back().map(|m| m.id)
    }

    // ── Private helpers ─────────────────────────────────────────────

    fn evict(&mut self) -> Vec<Measurement> {
        let mut evicted = Vec::new();
        while let Some(oldest) = self.entries.front() {
            if !self.policy.should_evict(
                self.live_time,
                oldest.live_time,
                self.entries.len(),
                self.duration,
            ) {
                break;
            }
            if let Some(oldest) = self.entries.pop_front() {
                deplete(&mut self.spectrum, &oldest.counts);
                self.live_time -= oldest.live_time;
                evicted.push(oldest);
            }
        }

        if self.entries.is_empty() {
            self.reset_sums();
        } else if !evicted.is_empty() {
            self.evictions_since_resync += evicted.len();
            if self.evictions_since_resync >= self.entries.len().max(MIN_EVICTIONS_BETWEEN_RESYNC) {
                self.resync();
            }
        }
        evicted
    }

    /// Re-derive the running sums from the retained entries.
    fn resync(&mut self) {
        self.spectrum.iter_mut().for_each(|c| *c = 0.0);
        for m in &self.entries {
            accumulate(&mut self.spectrum, &m.counts);
        }
        self.live_time = self.entries.iter().map(|m| m.live_time).sum();
        self.evictions_since_resync = 0;
    }

    fn reset_sums(&mut self) {
        self.spectrum.iter_mut().for_each(|c| *c = 0.0);
        self.live_time = 0.0;
        self.evictions_since_resync = 0;
    }
}
