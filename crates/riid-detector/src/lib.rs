//! # riid-detector
//!
//! Streaming Poisson N-channel event detection for gamma-ray spectra.
//!
//! The detector learns a background spectrum from a rolling long-term window,
//! calibrates per-channel count thresholds from a daily false-alarm budget,
//! scores every short-term observation against them, and delimits events with
//! hysteresis and a maximum-duration cap.
//!
//! ## Architecture
//!
//! ```text
//!   ingest(id, counts, live_time)
//!       │ validate (atomic, before any mutation)
//!       ▼
//!   ┌──────────────────┐  spectrum / live time  ┌────────────────────┐
//!   │  BufferManager   │───────────────────────►│ ThresholdCalibrator│
//!   │  long  │  short  │                        │  (every update     │
//!   └────────┴────┬────┘                        │   interval)        │
//!                 │ short-term preview          └─────────┬──────────┘
//!                 ▼                                       │ ThresholdSet
//!          ┌──────────────────┐◄──────────────────────────┘
//!          │ AnomalyClassifier│
//!          └────────┬─────────┘
//!                   │ verdict
//!                   ▼
//!          ┌──────────────────┐
//!          │ event lifecycle  │──► Option<EventRecord>
//!          │ WarmingUp → Idle │
//!          │   ⇄ InEvent      │
//!          └──────────────────┘
//! ```
//!
//! ## Invariants
//!
//! - Only quiet measurements seen while idle feed the background window.
//! - Thresholds are never recalibrated while an event is open.
//! - `background_spectrum` equals the background rate frozen at event start
//!   times the event live time.
//! - Every transition is driven by accumulated live time, so replays are
//!   deterministic.
//!
//! ## Quick Start
//!
//! ```rust
//! use riid_detector::{DetectorConfig, PoissonEventDetector};
//!
//! let config = DetectorConfig {
//!     long_term_duration: 10.0,
//!     pre_event_duration: 0.0,
//!     ..Default::default()
//! };
//! let mut detector = PoissonEventDetector::new(4, config).unwrap();
//!
//! for id in 0..10u64 {
//!     detector.ingest(id, vec![10.0; 4], 1.0).unwrap();
//! }
//! assert!(!detector.is_warming_up());
//!
//! detector.ingest(10u64, vec![50.0, 10.0, 10.0, 10.0], 1.0).unwrap();
//! assert!(detector.event_in_progress());
//!
//! let event = detector.flush().unwrap();
//! assert_eq!(event.gross_spectrum[0], 50.0);
//! ```

#![deny(unsafe_code)]

pub mod anomaly;
pub mod buffer;
pub mod config;
pub mod detector;
pub mod error;
pub mod event;
pub mod invariants;
pub mod measurement;
pub mod threshold;

// ── Re-exports ──────────────────────────────────────────────────────────

pub use anomaly::{
    AggregateExcess, AggregationPolicy, AnomalyClassifier, AnomalyStatistic, AnomalyVerdict,
    PerChannelExcess,
};
pub use buffer::{BufferManager, EvictionPolicy, RollingWindow};
pub use config::DetectorConfig;
pub use detector::{DetectorStats, PoissonEventDetector};
pub use error::{DetectorError, DetectorResult};
pub use event::{ClosureReason, DetectorPhase, EventAccumulator, EventRecord};
pub use invariants::InvariantChecker;
pub use measurement::{Measurement, MeasurementId};
pub use threshold::{
    poisson_survival, upper_tail_threshold, FalseAlarmBudget, ThresholdCalibrator, ThresholdSet,
};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::{Distribution, Poisson};

    fn noisy(rng: &mut StdRng, rates: &[f64], live_time: f64) -> Vec<f64> {
        rates
            .iter()
            .map(|&rate| {
                match Poisson::new(rate * live_time) {
                    Ok(dist) => dist.sample(&mut *rng),
                    Err(_) => 0.0,
                }
            })
            .collect()
    }

    fn scenario_config(aggregation: AggregationPolicy) -> DetectorConfig {
        DetectorConfig {
            long_term_duration: 10.0,
            short_term_duration: 1.0,
            pre_event_duration: 0.0,
            post_event_duration: 1.5,
            aggregation,
            ..Default::default()
        }
    }

    #[test]
    fn integration_single_spike_under_both_policies() {
        for policy in [AggregationPolicy::PerChannelAny, AggregationPolicy::AggregateSum] {
            let mut det = PoissonEventDetector::new(4, scenario_config(policy)).unwrap();
            let mut records = Vec::new();
            let mut id = 0u64;
            let mut feed = |det: &mut PoissonEventDetector, counts: [f64; 4]| {
                let out = det.ingest(id, counts.to_vec(), 1.0).unwrap();
                id += 1;
                out
            };

            for _ in 0..10 {
                records.extend(feed(&mut det, [10.0; 4]));
            }
            records.extend(feed(&mut det, [50.0, 10.0, 10.0, 10.0]));
            records.extend(feed(&mut det, [10.0; 4]));
            records.extend(feed(&mut det, [10.0; 4]));

            assert_eq!(records.len(), 1, "policy {policy}");
            let record = &records[0];
            assert_eq!(record.measurement_ids, vec![MeasurementId(10)]);
            assert_eq!(record.gross_spectrum, vec![50.0, 10.0, 10.0, 10.0]);
            assert_eq!(record.event_live_time, 1.0);
            assert_eq!(record.background_spectrum, vec![10.0; 4]);
            assert_eq!(record.closure, ClosureReason::Hysteresis);
        }
    }

    #[test]
    fn integration_stationary_background_raises_no_event() {
        for policy in [AggregationPolicy::PerChannelAny, AggregationPolicy::AggregateSum] {
            let mut rng = StdRng::seed_from_u64(42);
            let rates = vec![20.0; 16];
            let config = DetectorConfig {
                long_term_duration: 60.0,
                tolerable_false_alarms_per_day: 0.01,
                aggregation: policy,
                ..Default::default()
            };
            let mut det = PoissonEventDetector::new(16, config).unwrap();

            for id in 0..2_000u64 {
                let counts = noisy(&mut rng, &rates, 1.0);
                assert!(det.ingest(id, counts, 1.0).unwrap().is_none(), "id {id}");
            }
            assert!(det.flush().is_none());
            assert_eq!(det.stats().events, 0);
            assert_eq!(det.stats().anomalous_measurements, 0);
            assert!(det.stats().recalibrations > 10);
        }
    }

    #[test]
    fn integration_partial_short_window_raises_no_event() {
        // A 5 s short-term window starts empty after warm-up and fills over
        // the first four idle measurements.
        let rates = vec![10.0; 64];
        for seed in 0..20u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let config = DetectorConfig {
                long_term_duration: 60.0,
                short_term_duration: 5.0,
                tolerable_false_alarms_per_day: 0.01,
                ..Default::default()
            };
            let mut det = PoissonEventDetector::new(64, config).unwrap();
            for id in 0..400u64 {
                let counts = noisy(&mut rng, &rates, 1.0);
                assert!(det.ingest(id, counts, 1.0).unwrap().is_none(), "seed {seed} id {id}");
            }
            assert!(det.flush().is_none());
            assert_eq!(det.stats().anomalous_measurements, 0, "seed {seed}");
        }
    }

    #[test]
    fn integration_uneven_live_times_raise_no_event() {
        // 0.7 s entries never tile a 1 s window, which settles at 1.4 s.
        let rates = vec![10.0; 64];
        for seed in 0..5u64 {
            let mut rng = StdRng::seed_from_u64(100 + seed);
            let config = DetectorConfig {
                long_term_duration: 30.0,
                tolerable_false_alarms_per_day: 0.01,
                ..Default::default()
            };
            let mut det = PoissonEventDetector::new(64, config).unwrap();
            for id in 0..600u64 {
                let counts = noisy(&mut rng, &rates, 0.7);
                assert!(det.ingest(id, counts, 0.7).unwrap().is_none(), "seed {seed} id {id}");
            }
            assert_eq!(det.stats().events, 0);
        }
    }

    #[test]
    fn integration_step_increase_yields_one_event() {
        let mut rng = StdRng::seed_from_u64(7);
        let background = vec![20.0; 16];
        let mut elevated = background.clone();
        elevated[5] *= 10.0;

        let config = DetectorConfig {
            long_term_duration: 60.0,
            pre_event_duration: 2.0,
            tolerable_false_alarms_per_day: 0.01,
            ..Default::default()
        };
        let mut det = PoissonEventDetector::new(16, config).unwrap();

        let step = 200u64..210;
        let mut records = Vec::new();
        for id in 0..300u64 {
            let rates = if step.contains(&id) { &elevated } else { &background };
            let counts = noisy(&mut rng, rates, 1.0);
            records.extend(det.ingest(id, counts, 1.0).unwrap());
        }
        records.extend(det.flush());

        assert_eq!(records.len(), 1);
        let ids: Vec<u64> = records[0].measurement_ids.iter().map(|m| m.0).collect();
        assert_eq!(ids, (198..210).collect::<Vec<_>>());
        assert!(records[0].gross_spectrum[5] > 1_500.0);
    }

    #[test]
    fn integration_max_duration_bounds_event_live_time() {
        let mut rng = StdRng::seed_from_u64(11);
        let background = vec![15.0; 8];
        let source = vec![150.0; 8];
        let config = DetectorConfig {
            long_term_duration: 30.0,
            pre_event_duration: 1.0,
            max_event_duration: 10.0,
            ..Default::default()
        };
        let max = config.max_event_duration;
        let mut det = PoissonEventDetector::new(8, config).unwrap();

        let mut records = Vec::new();
        for id in 0..200u64 {
            let live_time = rng.gen_range(0.5..1.0);
            let rates = if (60..160).contains(&id) { &source } else { &background };
            let counts = noisy(&mut rng, rates, live_time);
            records.extend(det.ingest(id, counts, live_time).unwrap());
        }
        records.extend(det.flush());

        let capped: Vec<_> = records
            .iter()
            .filter(|r| r.closure == ClosureReason::MaxDuration)
            .collect();
        assert!(capped.len() >= 5);
        for record in &records {
            assert!(record.event_live_time < max + 1.0, "{}", record.event_live_time);
        }
    }

    #[test]
    fn integration_background_spectrum_round_trip() {
        let mut rng = StdRng::seed_from_u64(3);
        let rates = [5.0, 40.0, 0.0, 12.5];
        let config = DetectorConfig {
            long_term_duration: 20.0,
            pre_event_duration: 0.0,
            ..Default::default()
        };
        let mut det = PoissonEventDetector::new(4, config).unwrap();
        for id in 0..40u64 {
            let lt = rng.gen_range(0.2..1.0);
            det.ingest(id, noisy(&mut rng, &rates, lt), lt).unwrap();
        }
        let frozen = det.background_rate();
        det.ingest(40u64, vec![300.0, 40.0, 5.0, 12.0], 1.0).unwrap();
        assert!(det.event_in_progress());
        let record = det.flush().unwrap();
        let expected: Vec<f64> = frozen.iter().map(|r| r * record.event_live_time).collect();
        assert_eq!(record.background_spectrum, expected);
    }

    proptest! {
        /// Fill fraction never decreases during warm-up and is exactly 1.0
        /// once the detector leaves it.
        #[test]
        fn warm_up_fill_is_monotone(live_times in prop::collection::vec(0.05f64..3.0, 1..200)) {
            let config = DetectorConfig {
                long_term_duration: 10.0,
                ..Default::default()
            };
            let mut det = PoissonEventDetector::new(2, config).unwrap();
            let mut last = 0.0;
            for (id, lt) in live_times.iter().enumerate() {
                if !det.is_warming_up() {
                    break;
                }
                det.ingest(id as u64, vec![3.0 * lt, 1.0], *lt).unwrap();
                let fill = det.background_fill_fraction();
                prop_assert!(fill >= last);
                prop_assert!((0.0..=1.0).contains(&fill));
                if det.is_warming_up() {
                    prop_assert!(fill < 1.0);
                } else {
                    prop_assert_eq!(fill, 1.0);
                }
                last = fill;
            }
        }

        /// Lowering the false-alarm tolerance never lowers a threshold.
        #[test]
        fn thresholds_monotone_in_tolerance(
            background in prop::collection::vec(0.0f64..5_000.0, 1..8),
            live_time in 1.0f64..100.0,
            loose in 1e-3f64..100.0,
            factor in 1.0f64..1e4,
        ) {
            let strict = loose / factor;
            let n = background.len();
            let a = ThresholdCalibrator::new(n, 1.0, loose, 60.0)
                .calibrate(&background, live_time)
                .clone();
            let b = ThresholdCalibrator::new(n, 1.0, strict, 60.0)
                .calibrate(&background, live_time)
                .clone();
            for (l, s) in a.per_channel.iter().zip(&b.per_channel) {
                prop_assert!(s >= l);
            }
            prop_assert!(b.aggregate >= a.aggregate);
        }

        /// The exact quantile is the smallest count inside the budget.
        #[test]
        fn quantile_is_minimal(lambda in 0.01f64..200.0, exponent in 1.0f64..15.0) {
            let p = 10f64.powf(-exponent);
            let k = upper_tail_threshold(lambda, p);
            prop_assert!(k >= 1);
            prop_assert!(poisson_survival(lambda, k) <= p * (1.0 + 1e-9));
            prop_assert!(poisson_survival(lambda, k - 1) > p * (1.0 - 1e-9));
        }
    }
}
