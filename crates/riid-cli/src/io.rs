//! JSON spectrum files.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use riid_detector::EventRecord;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, CliResult};

/// File extensions the CLI reads and writes.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["json"];

/// A series of spectra with their live times.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpectrumSet {
    pub spectra: Vec<Vec<f64>>,
    pub live_times: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_measurement_ids: Option<Vec<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_measurement_ids: Option<Vec<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
}

/// Which spectrum of an event record to export.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventSpectrum {
    Gross,
    Background,
}

impl SpectrumSet {
    pub fn new(spectra: Vec<Vec<f64>>, live_times: Vec<f64>) -> Self {
        Self {
            spectra,
            live_times,
            first_measurement_ids: None,
            last_measurement_ids: None,
            generated_at: None,
        }
    }

    /// Build a set from event records, one spectrum per event.
    pub fn from_events(events: &[EventRecord], which: EventSpectrum) -> Self {
        let spectra = events
            .iter()
            .map(|e| match which {
                EventSpectrum::Gross => e.gross_spectrum.clone(),
                EventSpectrum::Background => e.background_spectrum.clone(),
            })
            .collect();
        Self {
            spectra,
            live_times: events.iter().map(|e| e.event_live_time).collect(),
            first_measurement_ids: Some(
                events
                    .iter()
                    .filter_map(|e| e.first_measurement_id().map(|id| id.0))
                    .collect(),
            ),
            last_measurement_ids: Some(
                events
                    .iter()
                    .filter_map(|e| e.last_measurement_id().map(|id| id.0))
                    .collect(),
            ),
            generated_at: Some(Utc::now()),
        }
    }

    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    /// Channel count shared by every spectrum.
    pub fn n_channels(&self) -> usize {
        self.spectra.first().map_or(0, Vec::len)
    }

    /// Read and check a spectrum file.
    pub fn read(path: &Path) -> CliResult<Self> {
        require_supported_extension(path)?;
        let contents = std::fs::read_to_string(path)?;
        let set: Self = serde_json::from_str(&contents)?;
        set.validate(path)?;
        Ok(set)
    }

    /// Write as pretty JSON (write to `.tmp`, then rename).
    pub fn write(&self, path: &Path) -> CliResult<()> {
        require_supported_extension(path)?;
        let json = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    fn validate(&self, path: &Path) -> CliResult<()> {
        let invalid = |detail: String| CliError::InvalidSpectra {
            path: path.display().to_string(),
            detail,
        };
        if self.spectra.is_empty() {
            return Err(invalid("no spectra".into()));
        }
        if self.spectra.len() != self.live_times.len() {
            return Err(invalid(format!(
                "{} spectra but {} live times",
                self.spectra.len(),
                self.live_times.len()
            )));
        }
        let n_channels = self.n_channels();
        if n_channels == 0 {
            return Err(invalid("spectra have no channels".into()));
        }
        if let Some(i) = self.spectra.iter().position(|s| s.len() != n_channels) {
            return Err(invalid(format!(
                "spectrum {i} has {} channels, expected {n_channels}",
                self.spectra[i].len()
            )));
        }
        if let Some(i) = self
            .live_times
            .iter()
            .position(|lt| !lt.is_finite() || *lt <= 0.0)
        {
            return Err(invalid(format!(
                "live time {i} is {} (must be finite and > 0)",
                self.live_times[i]
            )));
        }
        Ok(())
    }
}

/// Reject paths whose extension is not a supported format.
pub fn require_supported_extension(path: &Path) -> CliResult<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    if SUPPORTED_EXTENSIONS.contains(&ext) {
        Ok(())
    } else {
        Err(CliError::UnsupportedFormat(format!(".{ext}")))
    }
}

/// `<dir>/<stem>_events.<ext>` next to `input`.
pub fn default_events_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "json".to_string());
    input.with_file_name(format!("{stem}_events.{ext}"))
}
