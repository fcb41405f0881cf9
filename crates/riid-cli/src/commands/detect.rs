//! `riid detect`: replay a gross spectrum series against a background measurement.

use std::path::PathBuf;

use clap::Args;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Poisson};
use riid_detector::{
    AggregationPolicy, DetectorConfig, DetectorStats, EventRecord, PoissonEventDetector,
};
use tracing::{debug, info};

use crate::error::{CliError, CliResult};
use crate::io::{default_events_path, require_supported_extension, EventSpectrum, SpectrumSet};

/// Arguments for `riid detect`
#[derive(Args, Debug, Clone)]
pub struct DetectArgs {
    /// Gross spectrum series (.json)
    pub gross_path: PathBuf,

    /// Background measurement (.json); its first spectrum is used
    pub bg_path: PathBuf,

    /// Detector configuration file (.json); flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Duration (s) of the long-term background buffer [default: 120]
    #[arg(long)]
    pub long_term_duration: Option<f64>,

    /// Duration (s) of the short-term buffer [default: 1]
    #[arg(long)]
    pub short_term_duration: Option<f64>,

    /// Pre-event background (s) to include in each event [default: 5]
    #[arg(long)]
    pub pre_event_duration: Option<f64>,

    /// Maximum duration (s) of an event [default: 120]
    #[arg(long)]
    pub max_event_duration: Option<f64>,

    /// Quiet live time (s) needed to end an event [default: 1.5]
    #[arg(long)]
    pub post_event_duration: Option<f64>,

    /// Desired maximum false alarms per day over all channels [default: 1]
    #[arg(long)]
    pub tolerable_false_alarms_per_day: Option<f64>,

    /// Live time (s) between threshold updates [default: 60]
    #[arg(long)]
    pub anomaly_threshold_update_interval: Option<f64>,

    /// Channel aggregation: per_channel_any or aggregate_sum
    #[arg(long)]
    pub aggregation: Option<AggregationPolicy>,

    /// Seed for the background noise generator
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Where to save gross event spectra [default: <gross stem>_events.json]
    #[arg(long)]
    pub event_gross_file_path: Option<PathBuf>,

    /// Where to save event backgrounds [default: <bg stem>_events.json]
    #[arg(long)]
    pub event_bg_file_path: Option<PathBuf>,
}

impl DetectArgs {
    /// Config file (or defaults) with command-line overrides applied.
    pub fn detector_config(&self) -> CliResult<DetectorConfig> {
        let mut config = match &self.config {
            Some(path) => DetectorConfig::from_json_file(path)?,
            None => DetectorConfig::default(),
        };
        let overrides = [
            (self.long_term_duration, &mut config.long_term_duration),
            (self.short_term_duration, &mut config.short_term_duration),
            (self.pre_event_duration, &mut config.pre_event_duration),
            (self.max_event_duration, &mut config.max_event_duration),
            (self.post_event_duration, &mut config.post_event_duration),
            (
                self.tolerable_false_alarms_per_day,
                &mut config.tolerable_false_alarms_per_day,
            ),
            (
                self.anomaly_threshold_update_interval,
                &mut config.anomaly_threshold_update_interval,
            ),
        ];
        for (value, field) in overrides {
            if let Some(value) = value {
                *field = value;
            }
        }
        if let Some(aggregation) = self.aggregation {
            config.aggregation = aggregation;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Result of a replay.
#[derive(Debug)]
pub struct Replay {
    pub events: Vec<EventRecord>,
    pub stats: DetectorStats,
    /// Synthetic background measurements fed before the gross series.
    pub fill_measurements: u64,
    /// Synthetic background measurements fed after it to close an open event.
    pub drain_measurements: u64,
}

/// Poisson-noised copies of an expected background measurement.
struct BackgroundNoise {
    channels: Vec<Option<Poisson<f64>>>,
    rng: StdRng,
}

impl BackgroundNoise {
    fn new(expected: &[f64], seed: u64) -> Self {
        Self {
            channels: expected.iter().map(|&l| Poisson::new(l).ok()).collect(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn sample(&mut self) -> Vec<f64> {
        let mut counts = Vec::with_capacity(self.channels.len());
        for dist in &self.channels {
            counts.push(match dist {
                Some(d) => d.sample(&mut self.rng),
                None => 0.0,
            });
        }
        counts
    }
}

/// Expected background counts for one gross measurement.
///
/// The background spectrum is normalized to unit sum, then scaled by its
/// count rate times `gross_live_time`.
pub fn expected_background(background: &SpectrumSet, gross_live_time: f64) -> CliResult<Vec<f64>> {
    let (Some(spectrum), Some(&bg_live_time)) =
        (background.spectra.first(), background.live_times.first())
    else {
        return Err(CliError::InvalidArgument("background set is empty".into()));
    };
    let total: f64 = spectrum.iter().sum();
    if !(total > 0.0) {
        return Err(CliError::InvalidArgument(
            "background spectrum has no counts".into(),
        ));
    }
    let cps = total / bg_live_time;
    let expected_counts = cps * gross_live_time;
    Ok(spectrum.iter().map(|c| c / total * expected_counts).collect())
}

/// Fill, detect, then drain, exactly as `riid detect` does.
pub fn replay(
    gross: &SpectrumSet,
    background: &SpectrumSet,
    config: DetectorConfig,
    seed: u64,
) -> CliResult<Replay> {
    let n_channels = gross.n_channels();
    if background.n_channels() != n_channels {
        return Err(CliError::InvalidArgument(format!(
            "gross spectra have {n_channels} channels but the background has {}",
            background.n_channels()
        )));
    }
    let Some(&gross_live_time) = gross.live_times.first() else {
        return Err(CliError::InvalidArgument("gross set is empty".into()));
    };

    let post = config.post_event_duration;
    let max = config.max_event_duration;
    let mut detector = PoissonEventDetector::new(n_channels, config)?;
    let mut noise = BackgroundNoise::new(&expected_background(background, gross_live_time)?, seed);
    let mut events = Vec::new();
    let mut id = 0u64;

    info!("filling background");
    let mut fill_measurements = 0u64;
    while detector.is_warming_up() {
        detector.ingest(id, noise.sample(), gross_live_time)?;
        id += 1;
        fill_measurements += 1;
    }
    debug!(fill_measurements, "background filled");

    info!(measurements = gross.len(), "detecting events");
    for (spectrum, &live_time) in gross.spectra.iter().zip(&gross.live_times) {
        events.extend(detector.ingest(id, spectrum.clone(), live_time)?);
        id += 1;
    }

    let mut drain_measurements = 0u64;
    if detector.event_in_progress() {
        info!("event still in progress, adding more backgrounds");
        let limit = ((max + post) / gross_live_time).ceil() as u64 + 1;
        while detector.event_in_progress() && drain_measurements < limit {
            events.extend(detector.ingest(id, noise.sample(), gross_live_time)?);
            id += 1;
            drain_measurements += 1;
        }
        events.extend(detector.flush());
    }

    Ok(Replay {
        events,
        stats: detector.stats(),
        fill_measurements,
        drain_measurements,
    })
}

/// `N event(s) detected.` followed by one line per event.
pub fn summary_lines(events: &[EventRecord]) -> Vec<String> {
    let suffix = if events.len() == 1 { "" } else { "s" };
    let mut lines = vec![format!("{} event{suffix} detected.", events.len())];
    for event in events {
        let first = event
            .first_measurement_id()
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        let last = event
            .last_measurement_id()
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        lines.push(format!(
            "  > {:.2}s from {first} to {last}",
            event.event_live_time
        ));
    }
    lines
}

/// Execute `riid detect`
pub fn execute(args: DetectArgs) -> CliResult<()> {
    require_supported_extension(&args.gross_path)?;
    require_supported_extension(&args.bg_path)?;
    let gross_out = args
        .event_gross_file_path
        .clone()
        .unwrap_or_else(|| default_events_path(&args.gross_path));
    let bg_out = args
        .event_bg_file_path
        .clone()
        .unwrap_or_else(|| default_events_path(&args.bg_path));
    require_supported_extension(&gross_out)?;
    require_supported_extension(&bg_out)?;

    let config = args.detector_config()?;

    println!(
        "Detecting events with gross measurements:       {}",
        args.gross_path.display()
    );
    println!(
        "                 background measurements:       {}",
        args.bg_path.display()
    );

    let gross = SpectrumSet::read(&args.gross_path)?;
    let background = SpectrumSet::read(&args.bg_path)?;
    let replay = replay(&gross, &background, config, args.seed)?;

    for line in summary_lines(&replay.events) {
        println!("{line}");
    }

    SpectrumSet::from_events(&replay.events, EventSpectrum::Gross).write(&gross_out)?;
    SpectrumSet::from_events(&replay.events, EventSpectrum::Background).write(&bg_out)?;

    info!(
        measurements = replay.stats.measurements,
        anomalous = replay.stats.anomalous_measurements,
        events = replay.stats.events,
        recalibrations = replay.stats.recalibrations,
        fill = replay.fill_measurements,
        drain = replay.drain_measurements,
        gross_events = %gross_out.display(),
        bg_events = %bg_out.display(),
        "detection complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DetectorConfig {
        DetectorConfig {
            long_term_duration: 10.0,
            pre_event_duration: 0.0,
            ..Default::default()
        }
    }

    fn background() -> SpectrumSet {
        SpectrumSet::new(vec![vec![50.0; 4]], vec![2.0])
    }

    fn gross_with_spike_at(n: usize, spike: usize) -> SpectrumSet {
        let spectra = (0..n)
            .map(|i| {
                if i == spike {
                    vec![250.0, 25.0, 25.0, 25.0]
                } else {
                    vec![25.0; 4]
                }
            })
            .collect();
        SpectrumSet::new(spectra, vec![1.0; n])
    }

    #[test]
    fn expected_background_scales_shape_by_rate() {
        let bg = SpectrumSet::new(vec![vec![10.0, 30.0]], vec![4.0]);
        let expected = expected_background(&bg, 2.0).unwrap();
        assert_eq!(expected, vec![5.0, 15.0]);

        let empty = SpectrumSet::new(vec![vec![0.0, 0.0]], vec![1.0]);
        assert!(expected_background(&empty, 1.0).is_err());
    }

    #[test]
    fn replay_finds_single_spike() {
        let replay = replay(&gross_with_spike_at(30, 15), &background(), config(), 1).unwrap();
        assert_eq!(replay.fill_measurements, 10);
        assert_eq!(replay.drain_measurements, 0);
        assert_eq!(replay.events.len(), 1);
        let ids: Vec<u64> = replay.events[0].measurement_ids.iter().map(|m| m.0).collect();
        assert_eq!(ids, vec![25]);
        assert_eq!(replay.stats.events, 1);
    }

    #[test]
    fn replay_drains_open_event() {
        let replay = replay(&gross_with_spike_at(20, 19), &background(), config(), 2).unwrap();
        assert_eq!(replay.events.len(), 1);
        assert_eq!(replay.drain_measurements, 2);
        assert_eq!(replay.events[0].last_measurement_id().map(|m| m.0), Some(29));
    }

    #[test]
    fn replay_is_deterministic_for_a_seed() {
        let gross = gross_with_spike_at(30, 15);
        let a = replay(&gross, &background(), config(), 9).unwrap();
        let b = replay(&gross, &background(), config(), 9).unwrap();
        assert_eq!(a.events, b.events);
    }

    #[test]
    fn replay_rejects_channel_mismatch() {
        let bg = SpectrumSet::new(vec![vec![1.0; 3]], vec![1.0]);
        assert!(matches!(
            replay(&gross_with_spike_at(5, 0), &bg, config(), 0),
            Err(CliError::InvalidArgument(_))
        ));
    }

    #[test]
    fn summary_pluralizes() {
        assert_eq!(summary_lines(&[]), vec!["0 events detected.".to_string()]);
        let replay = replay(&gross_with_spike_at(30, 15), &background(), config(), 1).unwrap();
        let lines = summary_lines(&replay.events);
        assert_eq!(lines[0], "1 event detected.");
        assert_eq!(lines[1], "  > 1.00s from 25 to 25");
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detector.json");
        DetectorConfig {
            long_term_duration: 30.0,
            post_event_duration: 3.0,
            ..Default::default()
        }
        .to_json_file(&path)
        .unwrap();

        let args = DetectArgs {
            gross_path: "g.json".into(),
            bg_path: "b.json".into(),
            config: Some(path),
            long_term_duration: None,
            short_term_duration: None,
            pre_event_duration: Some(0.0),
            max_event_duration: None,
            post_event_duration: Some(2.0),
            tolerable_false_alarms_per_day: None,
            anomaly_threshold_update_interval: None,
            aggregation: Some(AggregationPolicy::AggregateSum),
            seed: 0,
            event_gross_file_path: None,
            event_bg_file_path: None,
        };
        let config = args.detector_config().unwrap();
        assert_eq!(config.long_term_duration, 30.0);
        assert_eq!(config.post_event_duration, 2.0);
        assert_eq!(config.pre_event_duration, 0.0);
        assert_eq!(config.aggregation, AggregationPolicy::AggregateSum);
    }
}
