//! Measurement types handed to the detector by the caller.

use serde::{Deserialize, Serialize};

use crate::error::{DetectorError, DetectorResult};

/// Identifies a measurement within the caller's stream.
///
/// Ids are opaque to the detector apart from their ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MeasurementId(pub u64);

impl std::fmt::Display for MeasurementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MeasurementId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A single spectrum: per-channel counts accumulated over `live_time` seconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: MeasurementId,
    pub counts: Vec<f64>,
    pub live_time: f64,
}

impl Measurement {
    pub fn new(id: impl Into<MeasurementId>, counts: Vec<f64>, live_time: f64) -> Self {
        Self {
            id: id.into(),
            counts,
            live_time,
        }
    }

    /// Sum of counts over all channels.
    pub fn total_counts(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Number of channels in this spectrum.
    pub fn n_channels(&self) -> usize {
        self.counts.len()
    }

    /// Check shape, live time and counts against the detector's channel count.
    pub fn validate(&self, n_channels: usize) -> DetectorResult<()> {
        if self.counts.len() != n_channels {
            return Err(DetectorError::ShapeMismatch {
                expected: n_channels,
                actual: self.counts.len(),
            });
        }
        if !self.live_time.is_finite() || self.live_time <= 0.0 {
            return Err(DetectorError::InvalidLiveTime(self.live_time));
        }
        if let Some((channel, &value)) = self
            .counts
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || **v < 0.0)
        {
            return Err(DetectorError::InvalidCounts { channel, value });
        }
        Ok(())
    }
}

/// Add `counts` into `acc` channel by channel.
pub(crate) fn accumulate(acc: &mut [f64], counts: &[f64]) {
    for (a, c) in acc.iter_mut().zip(counts) {
        *a += c;
    }
}

/// Subtract `counts` from `acc`, never going below zero.
pub(crate) fn deplete(acc: &mut [f64], counts: &[f64]) {
    for (a, c) in acc.iter_mut().zip(counts) {
        *a = (*a - c).max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_measurement_passes() {
        let m = Measurement::new(1, vec![1.0, 0.0, 3.5], 1.0);
        assert!(m.validate(3).is_ok());
        assert!((m.total_counts() - 4.5).abs() < f64::EPSILON);
    }

    #[test]
    fn shape_mismatch_rejected() {
        let m = Measurement::new(1, vec![1.0, 2.0], 1.0);
        assert_eq!(
            m.validate(4),
            Err(DetectorError::ShapeMismatch {
                expected: 4,
                actual: 2
            })
        );
    }

    #[test]
    fn bad_live_time_rejected() {
        for lt in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let m = Measurement::new(1, vec![1.0], lt);
            assert!(matches!(
                m.validate(1),
                Err(DetectorError::InvalidLiveTime(_))
            ));
        }
    }

    #[test]
    fn negative_or_nan_counts_rejected() {
        let m = Measurement::new(1, vec![1.0, -2.0], 1.0);
        assert!(matches!(
            m.validate(2),
            Err(DetectorError::InvalidCounts { channel: 1, .. })
        ));

        let m = Measurement::new(1, vec![f64::NAN, 2.0], 1.0);
        assert!(matches!(
            m.validate(2),
            Err(DetectorError::InvalidCounts { channel: 0, .. })
        ));
    }

    #[test]
    fn deplete_clamps_at_zero() {
        let mut acc = vec![1.0, 5.0];
        deplete(&mut acc, &[2.0, 1.0]);
        assert_eq!(acc, vec![0.0, 4.0]);
    }

    #[test]
    fn measurement_id_ordering_and_display() {
        assert!(MeasurementId(3) < MeasurementId(4));
        assert_eq!(MeasurementId(42).to_string(), "42");
    }
}
