use std::fmt;

use serde::{Deserialize, Serialize};

use crate::measurement::MeasurementId;

/// Lifecycle phase of the detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectorPhase {
    /// Accumulating the initial background; nothing is scored.
    WarmingUp,
    /// Background established, no event open.
    Idle,
    /// An event is open and accumulating.
    InEvent,
}

impl fmt::Display for DetectorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WarmingUp => write!(f, "warming-up"),
            Self::Idle => write!(f, "idle"),
            Self::InEvent => write!(f, "in-event"),
        }
    }
}

/// Why an event was closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClosureReason {
    /// Quiet for at least the post-event duration.
    Hysteresis,
    /// Reached the maximum event duration.
    MaxDuration,
    /// Closed by the caller at end of stream.
    Flushed,
}

impl fmt::Display for ClosureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hysteresis => write!(f, "hysteresis"),
            Self::MaxDuration => write!(f, "max-duration"),
            Self::Flushed => write!(f, "flushed"),
        }
    }
}

/// A completed event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Per-channel counts summed over every measurement in the event.
    pub gross_spectrum: Vec<f64>,
    /// Background rate frozen at event start times `event_live_time`.
    pub background_spectrum: Vec<f64>,
    pub event_live_time: f64,
    /// Ids of the measurements in the event, in arrival order.
    pub measurement_ids: Vec<MeasurementId>,
    pub closure: ClosureReason,
}

impl EventRecord {
    pub fn first_measurement_id(&self) -> Option<MeasurementId> {
        self.measurement_ids.first().copied()
    }

    pub fn last_measurement_id(&self) -> Option<MeasurementId> {
        self.measurement_ids.last().copied()
    }

    pub fn gross_total(&self) -> f64 {
        self.gross_spectrum.iter().sum()
    }

    pub fn background_total(&self) -> f64 {
        self.background_spectrum.iter().sum()
    }
}
