//! Detector constants and the live-time comparisons every component shares.
//!
//! Window fill, hysteresis and the event cap are all decided by comparing sums
//! of floating-point live times against configured durations. Those sums carry
//! rounding error (ten 0.1 s measurements do not add up to exactly 1.0 s), so
//! every such comparison goes through [`InvariantChecker`] with the same
//! relative tolerance.

/// Seconds in a day, used to turn a daily false-alarm rate into a budget.
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Relative tolerance applied when comparing accumulated live time to a duration.
pub const LIVE_TIME_TOLERANCE: f64 = 1e-9;

/// Floor on any false-alarm probability budget.
pub const MIN_FALSE_ALARM_PROBABILITY: f64 = 1e-30;

/// Pseudo-count assumed for a channel with no background counts at all.
pub const ZERO_COUNT_PSEUDO_COUNTS: f64 = 0.5;

/// Expected count above which the Gaussian tail replaces the exact Poisson tail.
pub const GAUSSIAN_APPROXIMATION_MIN_EXPECTED: f64 = 1_000.0;

/// Running window sums are re-derived at most once per this many evictions
/// (or once per window turnover, whichever is rarer).
pub const MIN_EVICTIONS_BETWEEN_RESYNC: usize = 4_096;

/// Live-time comparisons shared by windows, calibrator and lifecycle.
pub struct InvariantChecker;

impl InvariantChecker {
    /// Whether `live_time` has reached `duration`, within tolerance.
    pub fn reaches(live_time: f64, duration: f64) -> bool {
        live_time >= duration - duration.abs() * LIVE_TIME_TOLERANCE
    }

    /// Whether `live_time` is at or below `duration`, within tolerance.
    pub fn within(live_time: f64, duration: f64) -> bool {
        live_time <= duration + duration.abs() * LIVE_TIME_TOLERANCE
    }

    /// `live_time / duration` clamped to `[0, 1]`, snapping to exactly 1.0 once
    /// the duration is reached.
    pub fn fill_fraction(live_time: f64, duration: f64) -> f64 {
        if duration <= 0.0 || Self::reaches(live_time, duration) {
            1.0
        } else {
            (live_time / duration).clamp(0.0, 1.0)
        }
    }
}
