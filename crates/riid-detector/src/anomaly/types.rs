use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How per-channel evidence is combined into one verdict.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    /// Anomalous if any single channel reaches its threshold.
    #[default]
    PerChannelAny,
    /// Anomalous if the total count reaches the aggregate threshold.
    AggregateSum,
}

impl AggregationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerChannelAny => "per_channel_any",
            Self::AggregateSum => "aggregate_sum",
        }
    }
}

impl fmt::Display for AggregationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('-', "_").to_ascii_lowercase().as_str() {
            "per_channel_any" | "per_channel" => Ok(Self::PerChannelAny),
            "aggregate_sum" | "aggregate" => Ok(Self::AggregateSum),
            other => Err(format!(
                "unknown aggregation policy '{other}' (expected per_channel_any or aggregate_sum)"
            )),
        }
    }
}

/// Outcome of scoring one short-term observation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnomalyVerdict {
    pub is_anomalous: bool,
    /// Channels whose count reached their threshold.
    pub triggering_channels: Vec<usize>,
    /// Largest observed/threshold ratio considered by the statistic.
    pub max_excess_ratio: f64,
    /// Raw short-term total count.
    pub observed_total: f64,
    /// Long-term rate times short-term live time, summed over channels.
    pub expected_total: f64,
}

impl AnomalyVerdict {
    /// A verdict for an observation that cannot be scored (no live time).
    pub fn quiet() -> Self {
        Self {
            is_anomalous: false,
            triggering_channels: Vec::new(),
            max_excess_ratio: 0.0,
            observed_total: 0.0,
            expected_total: 0.0,
        }
    }
}
