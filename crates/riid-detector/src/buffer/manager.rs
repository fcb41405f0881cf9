//! Owner of the long-term background window and the short-term foreground window.

use tracing::trace;

use crate::measurement::Measurement;

use super::window::RollingWindow;

/// Maintains the long-term (background) and short-term (foreground) windows.
///
/// The detector decides which window a measurement enters; the manager only
/// keeps the running sums and the retention rules.
#[derive(Clone, Debug)]
pub struct BufferManager {
    long_term: RollingWindow,
    short_term: RollingWindow,
}

impl BufferManager {
    /// Create empty windows of the given durations.
    pub fn new(n_channels: usize, long_term_duration: f64, short_term_duration: f64) -> Self {
        Self {
            long_term: RollingWindow::covering(n_channels, long_term_duration),
            short_term: RollingWindow::covering(n_channels, short_term_duration),
        }
    }

    /// Append a measurement to both windows.
    pub fn push(&mut self, measurement: Measurement) {
        self.push_short_term(measurement.clone());
        self.push_long_term(measurement);
    }

    /// Append a measurement to the long-term window only.
    pub fn push_long_term(&mut self, measurement: Measurement) {
        let evicted = self.long_term.push(measurement);
        if !evicted.is_empty() {
            trace!(
                evicted = evicted.len(),
                retained = self.long_term.len(),
                "long-term window evicted"
            );
        }
    }

    /// Append a measurement to the short-term window only.
    pub fn push_short_term(&mut self, measurement: Measurement) {
        self.short_term.push(measurement);
    }

    /// Fraction of the long-term duration accumulated so far, in `[0, 1]`.
    pub fn long_term_fill_fraction(&self) -> f64 {
        self.long_term.fill_fraction()
    }

    /// Whether the long-term window has covered its configured duration.
    pub fn long_term_is_full(&self) -> bool {
        self.long_term.is_full()
    }

    pub fn long_term_spectrum(&self) -> &[f64] {
        self.long_term.spectrum()
    }

    pub fn long_term_live_time(&self) -> f64 {
        self.long_term.live_time()
    }

    /// Background count rate per channel (counts per second).
    pub fn long_term_rate(&self) -> Vec<f64> {
        self.long_term.rate()
    }

    pub fn short_term_spectrum(&self) -> &[f64] {
        self.short_term.spectrum()
    }

    pub fn short_term_live_time(&self) -> f64 {
        self.short_term.live_time()
    }

    /// Short-term spectrum and live time as they would be after `candidate`
    /// is pushed, without mutating anything.
    pub fn short_term_preview(&self, candidate: &Measurement) -> (Vec<f64>, f64) {
        self.short_term.preview(candidate)
    }

    pub fn long_term(&self) -> &RollingWindow {
        &self.long_term
    }

    pub fn short_term(&self) -> &RollingWindow {
        &self.short_term
    }
}
