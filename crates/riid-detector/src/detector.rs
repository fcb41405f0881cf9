//! The streaming event detector: warm-up, scoring and the event lifecycle.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::anomaly::{AnomalyClassifier, AnomalyVerdict};
use crate::buffer::{BufferManager, RollingWindow};
use crate::config::DetectorConfig;
use crate::error::{DetectorError, DetectorResult};
use crate::event::{ClosureReason, DetectorPhase, EventAccumulator, EventRecord};
use crate::invariants::InvariantChecker;
use crate::measurement::{Measurement, MeasurementId};
use crate::threshold::{ThresholdCalibrator, ThresholdSet};

/// Running counters over the lifetime of a detector.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorStats {
    /// Accepted measurements, warm-up included.
    pub measurements: u64,
    /// Measurements scored as anomalous.
    pub anomalous_measurements: u64,
    /// Events emitted.
    pub events: u64,
    /// Threshold calibrations, the initial one included.
    pub recalibrations: u64,
}

/// Poisson N-channel event detector.
///
/// Feed measurements in order with [`ingest`](Self::ingest); each call returns
/// at most one completed [`EventRecord`]. All duration-based transitions are
/// driven by accumulated live time, never by wall-clock time.
#[derive(Clone, Debug)]
pub struct PoissonEventDetector {
    n_channels: usize,
    config: DetectorConfig,
    phase: DetectorPhase,
    buffers: BufferManager,
    /// Quiet measurements most recently seen, prepended to the next event.
    pre_event: RollingWindow,
    calibrator: ThresholdCalibrator,
    classifier: AnomalyClassifier,
    event: Option<EventAccumulator>,
    /// Live time since the last calibration.
    live_since_calibration: f64,
    last_id: Option<MeasurementId>,
    last_verdict: Option<AnomalyVerdict>,
    stats: DetectorStats,
}

impl PoissonEventDetector {
    /// Create a detector for spectra of `n_channels` channels.
    pub fn new(n_channels: usize, config: DetectorConfig) -> DetectorResult<Self> {
        if n_channels == 0 {
            return Err(DetectorError::config("n_channels", "must be >= 1"));
        }
        config.validate()?;

        Ok(Self {
            n_channels,
            phase: DetectorPhase::WarmingUp,
            buffers: BufferManager::new(
                n_channels,
                config.long_term_duration,
                config.short_term_duration,
            ),
            pre_event: RollingWindow::capped(n_channels, config.pre_event_duration),
            calibrator: ThresholdCalibrator::new(
                n_channels,
                config.short_term_duration,
                config.tolerable_false_alarms_per_day,
                config.anomaly_threshold_update_interval,
            ),
            classifier: AnomalyClassifier::new(config.aggregation),
            event: None,
            live_since_calibration: 0.0,
            last_id: None,
            last_verdict: None,
            stats: DetectorStats::default(),
            config,
        })
    }

    /// Create a detector with the default configuration.
    pub fn with_defaults(n_channels: usize) -> DetectorResult<Self> {
        Self::new(n_channels, DetectorConfig::default())
    }

    /// Process one measurement.
    ///
    /// Returns the completed event, if this measurement closed one. A rejected
    /// measurement leaves the detector untouched.
    pub fn ingest(
        &mut self,
        id: impl Into<MeasurementId>,
        counts: Vec<f64>,
        live_time: f64,
    ) -> DetectorResult<Option<EventRecord>> {
        self.ingest_measurement(Measurement::new(id, counts, live_time))
    }

    /// Process one already-built measurement. See [`ingest`](Self::ingest).
    pub fn ingest_measurement(
        &mut self,
        measurement: Measurement,
    ) -> DetectorResult<Option<EventRecord>> {
        measurement.validate(self.n_channels)?;
        if self.config.enforce_ordering {
            if let Some(last) = self.last_id {
                if measurement.id <= last {
                    return Err(DetectorError::OutOfOrderMeasurement {
                        last,
                        received: measurement.id,
                    });
                }
            }
        }

        self.last_id = Some(measurement.id);
        self.stats.measurements += 1;

        let record = match self.phase {
            DetectorPhase::WarmingUp => {
                self.warm_up(measurement);
                None
            }
            DetectorPhase::Idle => self.monitor(measurement),
            DetectorPhase::InEvent => self.track(measurement),
        };
        Ok(record)
    }

    /// Close an in-progress event at end of stream.
    pub fn flush(&mut self) -> Option<EventRecord> {
        if self.phase != DetectorPhase::InEvent {
            return None;
        }
        self.close_event(ClosureReason::Flushed)
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn is_warming_up(&self) -> bool {
        self.phase == DetectorPhase::WarmingUp
    }

    /// Fraction of the long-term window accumulated, in `[0, 1]`.
    pub fn background_fill_fraction(&self) -> f64 {
        self.buffers.long_term_fill_fraction()
    }

    pub fn event_in_progress(&self) -> bool {
        self.phase == DetectorPhase::InEvent
    }

    pub fn phase(&self) -> DetectorPhase {
        self.phase
    }

    /// Current thresholds; `None` while warming up.
    pub fn thresholds(&self) -> Option<&ThresholdSet> {
        self.calibrator.thresholds()
    }

    /// Background count rate per channel (counts per second).
    ///
    /// While an event is open this is the rate frozen at event start.
    pub fn background_rate(&self) -> Vec<f64> {
        self.buffers.long_term_rate()
    }

    /// Verdict for the most recently scored measurement.
    pub fn last_verdict(&self) -> Option<&AnomalyVerdict> {
        self.last_verdict.as_ref()
    }

    pub fn stats(&self) -> DetectorStats {
        DetectorStats {
            recalibrations: self.calibrator.recalibrations(),
            ..self.stats.clone()
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    // ── Private: lifecycle ──────────────────────────────────────────

    fn warm_up(&mut self, measurement: Measurement) {
        self.buffers.push_long_term(measurement.clone());
        self.pre_event.push(measurement);

        if self.buffers.long_term_is_full() {
            self.calibrator.calibrate(
                self.buffers.long_term_spectrum(),
                self.buffers.long_term_live_time(),
            );
            self.live_since_calibration = 0.0;
            self.phase = DetectorPhase::Idle;
            info!(
                background_live_time = self.buffers.long_term_live_time(),
                measurements = self.stats.measurements,
                "background warm-up complete"
            );
        }
    }

    fn monitor(&mut self, measurement: Measurement) -> Option<EventRecord> {
        let verdict = self.score(&measurement);
        self.buffers.push_short_term(measurement.clone());
        let is_anomalous = verdict.is_anomalous;
        self.last_verdict = Some(verdict);

        if !is_anomalous {
            self.live_since_calibration += measurement.live_time;
            self.buffers.push_long_term(measurement.clone());
            self.pre_event.push(measurement);
            if self.calibrator.maybe_recalibrate(
                self.live_since_calibration,
                self.buffers.long_term_spectrum(),
                self.buffers.long_term_live_time(),
            ) {
                self.live_since_calibration = 0.0;
            }
            return None;
        }

        self.stats.anomalous_measurements += 1;
        self.live_since_calibration += measurement.live_time;
        let trigger_id = measurement.id;
        let accumulator = EventAccumulator::open(
            self.buffers.long_term_rate(),
            self.pre_event.drain(),
            measurement,
        );
        info!(
            trigger = %trigger_id,
            first = ?accumulator.measurement_ids().first(),
            pre_event_live_time = accumulator.live_time(),
            triggering_channels = ?self.last_verdict.as_ref().map(|v| &v.triggering_channels),
            "event opened"
        );
        let reaches_cap =
            InvariantChecker::reaches(accumulator.duration(), self.config.max_event_duration);
        self.event = Some(accumulator);
        self.phase = DetectorPhase::InEvent;

        if reaches_cap {
            return self.close_event(ClosureReason::MaxDuration);
        }
        None
    }

    fn track(&mut self, measurement: Measurement) -> Option<EventRecord> {
        let verdict = self.score(&measurement);
        self.buffers.push_short_term(measurement.clone());
        let is_anomalous = verdict.is_anomalous;
        self.last_verdict = Some(verdict);
        self.live_since_calibration += measurement.live_time;

        let accumulator = self.event.as_mut()?;
        if is_anomalous {
            self.stats.anomalous_measurements += 1;
            accumulator.extend(&measurement);
        } else {
            accumulator.hold(measurement);
        }

        let quiet_long_enough = !is_anomalous
            && InvariantChecker::reaches(
                accumulator.quiet_live_time(),
                self.config.post_event_duration,
            );
        let reaches_cap =
            InvariantChecker::reaches(accumulator.duration(), self.config.max_event_duration);

        if quiet_long_enough {
            self.close_event(ClosureReason::Hysteresis)
        } else if reaches_cap {
            self.close_event(ClosureReason::MaxDuration)
        } else {
            None
        }
    }

    fn close_event(&mut self, closure: ClosureReason) -> Option<EventRecord> {
        let accumulator = self.event.take()?;
        let (record, trailing) = accumulator.close(closure);
        for measurement in trailing {
            self.pre_event.push(measurement);
        }
        self.phase = DetectorPhase::Idle;
        self.stats.events += 1;
        info!(
            closure = %record.closure,
            first = ?record.first_measurement_id(),
            last = ?record.last_measurement_id(),
            live_time = record.event_live_time,
            gross_total = record.gross_total(),
            background_total = record.background_total(),
            "event closed"
        );
        Some(record)
    }

    /// Score a candidate against the short-term window it would produce,
    /// with thresholds quantiled for that window's live time.
    fn score(&mut self, candidate: &Measurement) -> AnomalyVerdict {
        let (short_spectrum, short_live_time) = self.buffers.short_term_preview(candidate);
        let Some(thresholds) = self.calibrator.thresholds_for(short_live_time) else {
            return AnomalyVerdict::quiet();
        };
        let verdict = self.classifier.evaluate(
            &short_spectrum,
            short_live_time,
            self.buffers.long_term_spectrum(),
            self.buffers.long_term_live_time(),
            thresholds,
        );
        debug!(
            id = %candidate.id,
            anomalous = verdict.is_anomalous,
            max_excess_ratio = verdict.max_excess_ratio,
            observed_total = verdict.observed_total,
            expected_total = verdict.expected_total,
            "measurement scored"
        );
        verdict
    }
}
