//! Adaptive anomaly thresholds.
//!
//! The calibrator converts `tolerable_false_alarms_per_day` into a
//! per-measurement false-alarm probability, then finds the smallest count
//! whose Poisson upper tail fits inside that budget for every channel and for
//! the channel total.

pub mod calibrator;
pub mod poisson;

pub use calibrator::{FalseAlarmBudget, ThresholdCalibrator, ThresholdSet};
pub use poisson::{poisson_survival, upper_tail_threshold};
