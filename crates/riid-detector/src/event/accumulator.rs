//! Running state of one open event.

use crate::measurement::{accumulate, Measurement, MeasurementId};

use super::types::{ClosureReason, EventRecord};

/// Accumulates an open event and its hysteresis grace buffer.
///
/// Measurements in the event proper are reduced to running sums plus ids.
/// Quiet measurements are held whole in the grace buffer, since they either
/// join the event (if the anomaly resumes) or go back to the caller on close.
#[derive(Clone, Debug)]
pub struct EventAccumulator {
    gross_spectrum: Vec<f64>,
    live_time: f64,
    measurement_ids: Vec<MeasurementId>,
    frozen_rate: Vec<f64>,
    held: Vec<Measurement>,
    held_live_time: f64,
}

impl EventAccumulator {
    /// Open an event from the pre-event history followed by the trigger.
    ///
    /// `frozen_rate` is the background rate per channel at the moment the
    /// event opened.
    pub fn open(
        frozen_rate: Vec<f64>,
        history: impl IntoIterator<Item = Measurement>,
        trigger: Measurement,
    ) -> Self {
        let mut acc = Self {
            gross_spectrum: vec![0.0; frozen_rate.len()],
            live_time: 0.0,
            measurement_ids: Vec::new(),
            frozen_rate,
            held: Vec::new(),
            held_live_time: 0.0,
        };
        for m in history {
            acc.fold(&m);
        }
        acc.fold(&trigger);
        acc
    }

    /// Add an anomalous measurement, first folding in any held quiet ones.
    pub fn extend(&mut self, measurement: &Measurement) {
        for held in std::mem::take(&mut self.held) {
            self.fold(&held);
        }
        self.held_live_time = 0.0;
        self.fold(measurement);
    }

    /// Hold a quiet measurement in the grace buffer.
    pub fn hold(&mut self, measurement: Measurement) {
        self.held_live_time += measurement.live_time;
        self.held.push(measurement);
    }

    /// Event live time plus held live time.
    pub fn duration(&self) -> f64 {
        self.live_time + self.held_live_time
    }

    /// Live time of the event proper.
    pub fn live_time(&self) -> f64 {
        self.live_time
    }

    /// Live time spent quiet since the last anomalous measurement.
    pub fn quiet_live_time(&self) -> f64 {
        self.held_live_time
    }

    pub fn measurement_ids(&self) -> &[MeasurementId] {
        &self.measurement_ids
    }

    pub fn frozen_rate(&self) -> &[f64] {
        &self.frozen_rate
    }

    /// Close the event. Returns the record and the held trailing measurements.
    pub fn close(self, closure: ClosureReason) -> (EventRecord, Vec<Measurement>) {
        let background_spectrum = self
            .frozen_rate
            .iter()
            .map(|rate| rate * self.live_time)
            .collect();
        let record = EventRecord {
            gross_spectrum: self.gross_spectrum,
            background_spectrum,
            event_live_time: self.live_time,
            measurement_ids: self.measurement_ids,
            closure,
        };
        (record, self.held)
    }

    fn fold(&mut self, measurement: &Measurement) {
        accumulate(&mut self.gross_spectrum, &measurement.counts);
        self.live_time += measurement.live_time;
        self.measurement_ids.push(measurement.id);
    }
}
