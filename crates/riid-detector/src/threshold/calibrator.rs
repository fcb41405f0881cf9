//! Turns long-term background statistics and a daily false-alarm budget into
//! per-channel and aggregate count thresholds.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::invariants::{
    InvariantChecker, MIN_FALSE_ALARM_PROBABILITY, SECONDS_PER_DAY, ZERO_COUNT_PSEUDO_COUNTS,
};

use super::poisson::upper_tail_threshold;

/// Count thresholds calibrated for one reference live time.
///
/// A short-term observation spanning `reference_live_time` is anomalous in
/// channel `c` when its raw count is at least `per_channel[c]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub per_channel: Vec<u64>,
    /// Threshold on the total count over all channels.
    pub aggregate: u64,
    pub reference_live_time: f64,
    /// Expected background counts per channel at `reference_live_time`.
    pub expected_counts: Vec<f64>,
    pub per_channel_budget: f64,
    pub aggregate_budget: f64,
}

impl ThresholdSet {
    /// Sum of the expected background counts over all channels.
    pub fn expected_total(&self) -> f64 {
        self.expected_counts.iter().sum()
    }

    /// Whether these thresholds were computed for `live_time`.
    pub fn applies_to(&self, live_time: f64) -> bool {
        InvariantChecker::reaches(live_time, self.reference_live_time)
            && InvariantChecker::within(live_time, self.reference_live_time)
    }

    /// The same background rates and budgets, re-quantiled for `live_time`.
    /// Compare raw counts against the result; Poisson counts do not scale
    /// like their mean.
    pub fn rescaled(&self, live_time: f64) -> ThresholdSet {
        let factor = if self.reference_live_time > 0.0 {
            live_time / self.reference_live_time
        } else {
            0.0
        };
        let expected_counts: Vec<f64> = self.expected_counts.iter().map(|&c| c * factor).collect();
        let per_channel = expected_counts
            .iter()
            .map(|&lambda| upper_tail_threshold(lambda, self.per_channel_budget))
            .collect();
        let aggregate = upper_tail_threshold(expected_counts.iter().sum(), self.aggregate_budget);

        ThresholdSet {
            per_channel,
            aggregate,
            reference_live_time: live_time,
            expected_counts,
            per_channel_budget: self.per_channel_budget,
            aggregate_budget: self.aggregate_budget,
        }
    }
}

/// False-alarm probability budgets for a single short-term measurement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FalseAlarmBudget {
    /// Budget for the total-count test.
    pub aggregate: f64,
    /// Budget for each individual channel test.
    pub per_channel: f64,
}

impl FalseAlarmBudget {
    /// Spread `tolerable_per_day` false alarms over every short-term
    /// measurement in a day, then over the channels.
    pub fn new(tolerable_per_day: f64, short_term_duration: f64, n_channels: usize) -> Self {
        let measurements_per_day = SECONDS_PER_DAY / short_term_duration;
        let aggregate = tolerable_per_day / measurements_per_day;
        let per_channel = aggregate / n_channels.max(1) as f64;
        Self {
            aggregate: clamp_probability(aggregate),
            per_channel: clamp_probability(per_channel),
        }
    }
}

fn clamp_probability(p: f64) -> f64 {
    if p.is_nan() {
        return MIN_FALSE_ALARM_PROBABILITY;
    }
    p.clamp(MIN_FALSE_ALARM_PROBABILITY, 1.0)
}

/// Periodically recomputes the threshold set from the long-term window.
#[derive(Clone, Debug)]
pub struct ThresholdCalibrator {
    n_channels: usize,
    reference_live_time: f64,
    update_interval: f64,
    budget: FalseAlarmBudget,
    thresholds: Option<ThresholdSet>,
    /// Last set re-quantiled for a live time other than the reference.
    rescaled: Option<ThresholdSet>,
    recalibrations: u64,
}

impl ThresholdCalibrator {
    /// `short_term_duration` doubles as the reference live time of every
    /// threshold set this calibrator produces.
    pub fn new(
        n_channels: usize,
        short_term_duration: f64,
        tolerable_false_alarms_per_day: f64,
        update_interval: f64,
    ) -> Self {
        Self {
            n_channels,
            reference_live_time: short_term_duration,
            update_interval,
            budget: FalseAlarmBudget::new(
                tolerable_false_alarms_per_day,
                short_term_duration,
                n_channels,
            ),
            thresholds: None,
            rescaled: None,
            recalibrations: 0,
        }
    }

    /// Recalibrate only if at least one update interval of live time has
    /// elapsed since the last calibration. Returns whether it recalibrated.
    pub fn maybe_recalibrate(
        &mut self,
        elapsed_since_last_update: f64,
        long_spectrum: &[f64],
        long_live_time: f64,
    ) -> bool {
        if !InvariantChecker::reaches(elapsed_since_last_update, self.update_interval) {
            return false;
        }
        self.calibrate(long_spectrum, long_live_time);
        true
    }

    /// Recompute every threshold from the given background statistics.
    pub fn calibrate(&mut self, long_spectrum: &[f64], long_live_time: f64) -> &ThresholdSet {
        let expected_counts: Vec<f64> = long_spectrum
            .iter()
            .take(self.n_channels)
            .map(|&counts| {
                let counts = if counts > 0.0 {
                    counts
                } else {
                    ZERO_COUNT_PSEUDO_COUNTS
                };
                if long_live_time > 0.0 {
                    counts / long_live_time * self.reference_live_time
                } else {
                    0.0
                }
            })
            .collect();

        let per_channel: Vec<u64> = expected_counts
            .iter()
            .map(|&lambda| upper_tail_threshold(lambda, self.budget.per_channel))
            .collect();
        let expected_total: f64 = expected_counts.iter().sum();
        let aggregate = upper_tail_threshold(expected_total, self.budget.aggregate);

        self.recalibrations += 1;
        self.rescaled = None;
        debug!(
            recalibration = self.recalibrations,
            background_live_time = long_live_time,
            expected_total,
            aggregate_threshold = aggregate,
            min_channel_threshold = per_channel.iter().min().copied().unwrap_or(0),
            max_channel_threshold = per_channel.iter().max().copied().unwrap_or(0),
            "thresholds recalibrated"
        );

        self.thresholds.insert(ThresholdSet {
            per_channel,
            aggregate,
            reference_live_time: self.reference_live_time,
            expected_counts,
            per_channel_budget: self.budget.per_channel,
            aggregate_budget: self.budget.aggregate,
        })
    }

    /// The current thresholds; `None` until the first calibration.
    pub fn thresholds(&self) -> Option<&ThresholdSet> {
        self.thresholds.as_ref()
    }

    /// The current thresholds re-quantiled for a short-term window holding
    /// `live_time` seconds. The last non-reference set is cached until the
    /// next calibration.
    pub fn thresholds_for(&mut self, live_time: f64) -> Option<&ThresholdSet> {
        let base = self.thresholds.as_ref()?;
        if base.applies_to(live_time) {
            return self.thresholds.as_ref();
        }
        let cached = self
            .rescaled
            .as_ref()
            .is_some_and(|set| set.applies_to(live_time));
        if !cached {
            self.rescaled = Some(base.rescaled(live_time));
        }
        self.rescaled.as_ref()
    }

    /// Number of calibrations performed so far.
    pub fn recalibrations(&self) -> u64 {
        self.recalibrations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_spreads_over_measurements_and_channels() {
        let budget = FalseAlarmBudget::new(1.0, 1.0, 4);
        assert!((budget.aggregate - 1.0 / 86_400.0).abs() < 1e-18);
        assert!((budget.per_channel - 1.0 / 86_400.0 / 4.0).abs() < 1e-18);

        let budget = FalseAlarmBudget::new(1e6, 1.0, 1);
        assert_eq!(budget.aggregate, 1.0);

        let budget = FalseAlarmBudget::new(1e-40, 1.0, 1024);
        assert_eq!(budget.per_channel, MIN_FALSE_ALARM_PROBABILITY);
    }

    #[test]
    fn calibrates_flat_background() {
        let mut calibrator = ThresholdCalibrator::new(4, 1.0, 1.0, 60.0);
        assert!(calibrator.thresholds().is_none());

        let set = calibrator.calibrate(&[100.0; 4], 10.0).clone();
        assert_eq!(set.per_channel, vec![28; 4]);
        assert_eq!(set.aggregate, 70);
        assert_eq!(set.reference_live_time, 1.0);
        assert!((set.expected_total() - 40.0).abs() < 1e-12);
        assert_eq!(calibrator.recalibrations(), 1);
    }

    #[test]
    fn zero_count_channel_uses_pseudo_count() {
        let mut calibrator = ThresholdCalibrator::new(2, 1.0, 1.0, 60.0);
        let set = calibrator.calibrate(&[0.0, 10.0], 1.0);
        assert!((set.expected_counts[0] - ZERO_COUNT_PSEUDO_COUNTS).abs() < 1e-12);
        // One stray count is never enough.
        assert!(set.per_channel[0] > 1);
    }

    #[test]
    fn expected_counts_scale_to_reference_live_time() {
        let mut calibrator = ThresholdCalibrator::new(1, 2.0, 1.0, 60.0);
        let set = calibrator.calibrate(&[50.0], 10.0);
        assert!((set.expected_counts[0] - 10.0).abs() < 1e-12);
        assert_eq!(set.reference_live_time, 2.0);
    }

    #[test]
    fn partial_window_gets_its_own_quantiles() {
        let mut calibrator = ThresholdCalibrator::new(4, 1.0, 1.0, 60.0);
        assert!(calibrator.thresholds_for(0.5).is_none());
        calibrator.calibrate(&[100.0; 4], 10.0);

        let half = calibrator.thresholds_for(0.5).cloned().unwrap();
        assert_eq!(half.per_channel, vec![19; 4]);
        assert_eq!(half.reference_live_time, 0.5);
        assert!((half.expected_counts[0] - 5.0).abs() < 1e-12);
        assert_eq!(half.per_channel_budget, 1.0 / 86_400.0 / 4.0);

        let double = calibrator.thresholds_for(2.0).cloned().unwrap();
        assert_eq!(double.per_channel, vec![44; 4]);
        assert_eq!(double.aggregate, 122);

        let summed: f64 = (0..10).map(|_| 0.1).sum();
        assert_eq!(calibrator.thresholds_for(summed).map(|t| t.per_channel[0]), Some(28));
    }

    #[test]
    fn rescaled_cache_is_dropped_on_calibration() {
        let mut calibrator = ThresholdCalibrator::new(1, 1.0, 1.0, 60.0);
        calibrator.calibrate(&[10.0], 1.0);
        assert_eq!(calibrator.thresholds_for(2.0).map(|t| t.expected_counts[0]), Some(20.0));
        calibrator.calibrate(&[20.0], 1.0);
        assert_eq!(calibrator.thresholds_for(2.0).map(|t| t.expected_counts[0]), Some(40.0));
    }

    #[test]
    fn recalibrates_only_after_interval() {
        let mut calibrator = ThresholdCalibrator::new(1, 1.0, 1.0, 60.0);
        calibrator.calibrate(&[10.0], 1.0);
        assert!(!calibrator.maybe_recalibrate(59.0, &[20.0], 1.0));
        assert_eq!(calibrator.thresholds().map(|t| t.expected_counts[0]), Some(10.0));

        let summed: f64 = (0..600).map(|_| 0.1).sum();
        assert!(calibrator.maybe_recalibrate(summed, &[20.0], 1.0));
        assert_eq!(calibrator.thresholds().map(|t| t.expected_counts[0]), Some(20.0));
        assert_eq!(calibrator.recalibrations(), 2);
    }

    #[test]
    fn lower_tolerance_never_lowers_thresholds() {
        let background = [3.0, 0.0, 120.0, 4_000.0, 27.5];
        let mut loose = ThresholdCalibrator::new(5, 1.0, 100.0, 60.0);
        let mut strict = ThresholdCalibrator::new(5, 1.0, 0.01, 60.0);
        let loose = loose.calibrate(&background, 2.0).clone();
        let strict = strict.calibrate(&background, 2.0).clone();
        for (l, s) in loose.per_channel.iter().zip(&strict.per_channel) {
            assert!(s >= l);
        }
        assert!(strict.aggregate >= loose.aggregate);
    }
}
