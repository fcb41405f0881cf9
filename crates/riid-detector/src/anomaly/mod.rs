//! Per-measurement anomaly scoring.
//!
//! ```text
//!   short-term spectrum ──┐
//!                         ├──► AnomalyStatistic ──► AnomalyVerdict
//!   ThresholdSet ─────────┘     ├─ PerChannelExcess (any channel)
//!                               └─ AggregateExcess  (channel total)
//! ```

pub mod classifier;
pub mod types;

pub use classifier::{AggregateExcess, AnomalyClassifier, AnomalyStatistic, PerChannelExcess};
pub use types::{AggregationPolicy, AnomalyVerdict};
