//! Anomaly statistics and the classifier that applies the configured one.

use std::borrow::Cow;

use crate::threshold::ThresholdSet;

use super::types::{AggregationPolicy, AnomalyVerdict};

// ── Trait ────────────────────────────────────────────────────────────────

/// A rule that decides whether a short-term observation departs from background.
///
/// Raw short-term counts are compared against thresholds quantiled for
/// `short_live_time`. Implementations must be pure: identical inputs give
/// identical verdicts.
pub trait AnomalyStatistic {
    fn evaluate(
        &self,
        short_spectrum: &[f64],
        short_live_time: f64,
        long_spectrum: &[f64],
        long_live_time: f64,
        thresholds: &ThresholdSet,
    ) -> AnomalyVerdict;

    /// Name of this statistic (for logs).
    fn name(&self) -> &str;
}

// ── Helpers ─────────────────────────────────────────────────────────────

/// Thresholds matching the short-term live time, re-quantiling only when the
/// given set was calibrated for a different one.
fn thresholds_at(
    short_live_time: f64,
    thresholds: &ThresholdSet,
) -> Option<Cow<'_, ThresholdSet>> {
    if !(short_live_time > 0.0 && short_live_time.is_finite()) {
        return None;
    }
    if thresholds.applies_to(short_live_time) {
        Some(Cow::Borrowed(thresholds))
    } else {
        Some(Cow::Owned(thresholds.rescaled(short_live_time)))
    }
}

fn expected_total(long_spectrum: &[f64], long_live_time: f64, short_live_time: f64) -> f64 {
    if long_live_time <= 0.0 {
        return 0.0;
    }
    long_spectrum.iter().sum::<f64>() / long_live_time * short_live_time
}

fn excess_ratio(observed: f64, threshold: u64) -> f64 {
    if threshold == 0 {
        if observed > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    } else {
        observed / threshold as f64
    }
}

// ── Per-channel ─────────────────────────────────────────────────────────

/// Anomalous when any channel's count reaches its threshold.
#[derive(Clone, Copy, Debug, Default)]
pub struct PerChannelExcess;

impl AnomalyStatistic for PerChannelExcess {
    fn evaluate(
        &self,
        short_spectrum: &[f64],
        short_live_time: f64,
        long_spectrum: &[f64],
        long_live_time: f64,
        thresholds: &ThresholdSet,
    ) -> AnomalyVerdict {
        let Some(thresholds) = thresholds_at(short_live_time, thresholds) else {
            return AnomalyVerdict::quiet();
        };

        let mut triggering_channels = Vec::new();
        let mut max_excess_ratio = 0.0_f64;
        for (channel, (&counts, &threshold)) in
            short_spectrum.iter().zip(&thresholds.per_channel).enumerate()
        {
            if counts >= threshold as f64 {
                triggering_channels.push(channel);
            }
            max_excess_ratio = max_excess_ratio.max(excess_ratio(counts, threshold));
        }

        AnomalyVerdict {
            is_anomalous: !triggering_channels.is_empty(),
            triggering_channels,
            max_excess_ratio,
            observed_total: short_spectrum.iter().sum(),
            expected_total: expected_total(long_spectrum, long_live_time, short_live_time),
        }
    }

    fn name(&self) -> &str {
        "per_channel_any"
    }
}

// ── Aggregate ───────────────────────────────────────────────────────────

/// Anomalous when the total count reaches the aggregate threshold.
#[derive(Clone, Copy, Debug, Default)]
pub struct AggregateExcess;

impl AnomalyStatistic for AggregateExcess {
    fn evaluate(
        &self,
        short_spectrum: &[f64],
        short_live_time: f64,
        long_spectrum: &[f64],
        long_live_time: f64,
        thresholds: &ThresholdSet,
    ) -> AnomalyVerdict {
        let Some(thresholds) = thresholds_at(short_live_time, thresholds) else {
            return AnomalyVerdict::quiet();
        };

        let observed_total: f64 = short_spectrum.iter().sum();
        let is_anomalous = observed_total >= thresholds.aggregate as f64;

        AnomalyVerdict {
            is_anomalous,
            triggering_channels: Vec::new(),
            max_excess_ratio: excess_ratio(observed_total, thresholds.aggregate),
            observed_total,
            expected_total: expected_total(long_spectrum, long_live_time, short_live_time),
        }
    }

    fn name(&self) -> &str {
        "aggregate_sum"
    }
}

// ── Classifier ──────────────────────────────────────────────────────────

/// Applies the statistic selected by an [`AggregationPolicy`].
#[derive(Clone, Copy, Debug)]
pub struct AnomalyClassifier {
    policy: AggregationPolicy,
}

impl AnomalyClassifier {
    pub fn new(policy: AggregationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> AggregationPolicy {
        self.policy
    }

    /// The statistic backing the configured policy.
    pub fn statistic(&self) -> &'static dyn AnomalyStatistic {
        match self.policy {
            AggregationPolicy::PerChannelAny => &PerChannelExcess,
            AggregationPolicy::AggregateSum => &AggregateExcess,
        }
    }

    /// Whether the observation is anomalous.
    pub fn score(
        &self,
        short_spectrum: &[f64],
        short_live_time: f64,
        long_spectrum: &[f64],
        long_live_time: f64,
        thresholds: &ThresholdSet,
    ) -> bool {
        self.evaluate(
            short_spectrum,
            short_live_time,
            long_spectrum,
            long_live_time,
            thresholds,
        )
        .is_anomalous
    }

    /// Full verdict with diagnostics.
    pub fn evaluate(
        &self,
        short_spectrum: &[f64],
        short_live_time: f64,
        long_spectrum: &[f64],
        long_live_time: f64,
        thresholds: &ThresholdSet,
    ) -> AnomalyVerdict {
        self.statistic().evaluate(
            short_spectrum,
            short_live_time,
            long_spectrum,
            long_live_time,
            thresholds,
        )
    }
}

impl Default for AnomalyClassifier {
    fn default() -> Self {
        Self::new(AggregationPolicy::default())
    }
}
