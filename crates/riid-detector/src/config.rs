//! Detector configuration and its JSON file form.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::anomaly::AggregationPolicy;
use crate::error::{DetectorError, DetectorResult};

/// Default background window (seconds).
pub const DEFAULT_LONG_TERM_DURATION: f64 = 120.0;
/// Default observation window (seconds).
pub const DEFAULT_SHORT_TERM_DURATION: f64 = 1.0;
/// Default pre-anomaly history prepended to events (seconds).
pub const DEFAULT_PRE_EVENT_DURATION: f64 = 5.0;
/// Default hard cap on event duration (seconds).
pub const DEFAULT_MAX_EVENT_DURATION: f64 = 120.0;
/// Default quiet live time needed to close an event (seconds).
pub const DEFAULT_POST_EVENT_DURATION: f64 = 1.5;
/// Default false-positive budget.
pub const DEFAULT_TOLERABLE_FALSE_ALARMS_PER_DAY: f64 = 1.0;
/// Default minimum live time between recalibrations (seconds).
pub const DEFAULT_THRESHOLD_UPDATE_INTERVAL: f64 = 60.0;

/// Configuration for [`PoissonEventDetector`](crate::PoissonEventDetector).
///
/// Every duration is in seconds of accumulated live time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub long_term_duration: f64,
    pub short_term_duration: f64,
    /// May be zero.
    pub pre_event_duration: f64,
    pub max_event_duration: f64,
    pub post_event_duration: f64,
    pub tolerable_false_alarms_per_day: f64,
    pub anomaly_threshold_update_interval: f64,
    pub aggregation: AggregationPolicy,
    /// Reject measurement ids that do not strictly increase.
    pub enforce_ordering: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            long_term_duration: DEFAULT_LONG_TERM_DURATION,
            short_term_duration: DEFAULT_SHORT_TERM_DURATION,
            pre_event_duration: DEFAULT_PRE_EVENT_DURATION,
            max_event_duration: DEFAULT_MAX_EVENT_DURATION,
            post_event_duration: DEFAULT_POST_EVENT_DURATION,
            tolerable_false_alarms_per_day: DEFAULT_TOLERABLE_FALSE_ALARMS_PER_DAY,
            anomaly_threshold_update_interval: DEFAULT_THRESHOLD_UPDATE_INTERVAL,
            aggregation: AggregationPolicy::default(),
            enforce_ordering: true,
        }
    }
}

impl DetectorConfig {
    /// Check every field and the relations between them.
    pub fn validate(&self) -> DetectorResult<()> {
        positive("long_term_duration", self.long_term_duration)?;
        positive("short_term_duration", self.short_term_duration)?;
        positive("max_event_duration", self.max_event_duration)?;
        positive("post_event_duration", self.post_event_duration)?;
        positive(
            "tolerable_false_alarms_per_day",
            self.tolerable_false_alarms_per_day,
        )?;
        positive(
            "anomaly_threshold_update_interval",
            self.anomaly_threshold_update_interval,
        )?;
        if !self.pre_event_duration.is_finite() || self.pre_event_duration < 0.0 {
            return Err(DetectorError::config(
                "pre_event_duration",
                format!("must be finite and >= 0, got {}", self.pre_event_duration),
            ));
        }

        if self.post_event_duration >= self.max_event_duration {
            return Err(DetectorError::config(
                "post_event_duration",
                format!(
                    "must be < max_event_duration ({} >= {})",
                    self.post_event_duration, self.max_event_duration
                ),
            ));
        }
        if self.pre_event_duration >= self.max_event_duration {
            return Err(DetectorError::config(
                "pre_event_duration",
                format!(
                    "must be < max_event_duration ({} >= {})",
                    self.pre_event_duration, self.max_event_duration
                ),
            ));
        }
        if self.short_term_duration > self.long_term_duration {
            return Err(DetectorError::config(
                "short_term_duration",
                format!(
                    "must be <= long_term_duration ({} > {})",
                    self.short_term_duration, self.long_term_duration
                ),
            ));
        }
        Ok(())
    }

    /// Load and validate a configuration from a JSON file.
    ///
    /// Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> DetectorResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON.
    ///
    /// Writes are atomic (write to `.tmp`, then rename).
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> DetectorResult<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

fn positive(field: &str, value: f64) -> DetectorResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(DetectorError::config(
            field,
            format!("must be finite and > 0, got {value}"),
        ))
    }
}
