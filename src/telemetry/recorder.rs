//! Sampling of writing counts and derivation of the words-per-minute series

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use thiserror::Error;

use crate::core::book::Counts;
use crate::core::config::TelemetryConfig;
use crate::telemetry::plot::PlotSurface;

/// Normalizes the reference sampling cadence into a per-minute rate
const CADENCE_DIVISOR: f64 = 5.0;

/// Fixed vertical axis of the rate plot, for visual stability across sessions
const RATE_AXIS: (f64, f64) = (0.0, 120.0);

/// Telemetry persistence errors; never fatal to the session
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to append telemetry record to {path}: {source}")]
    LogWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One timestamped snapshot of the book's aggregate counts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    pub chars: usize,
    pub words: usize,
}

/// Records count samples to an append-only log and derives rate series
#[derive(Debug)]
pub struct TelemetryRecorder {
    log_path: PathBuf,
    smoothing_window: usize,
    samples: Vec<Sample>,
}

impl TelemetryRecorder {
    /// Open the telemetry log, writing a blank separator line so a new
    /// session is distinguishable from the previous one
    pub fn open(config: &TelemetryConfig) -> Result<Self> {
        let recorder = Self {
            log_path: config.log_path.clone(),
            smoothing_window: config.smoothing_window,
            samples: Vec::new(),
        };
        recorder
            .append("\n")
            .with_context(|| format!("Failed to open telemetry log: {}", config.log_path.display()))?;
        Ok(recorder)
    }

    /// Record the current counts at the present wall-clock time
    pub fn sample(&mut self, counts: Counts) -> Result<(), TelemetryError> {
        let now = Utc::now().timestamp_millis() as f64 / 1000.0;
        self.record_at(now, counts)
    }

    /// Record counts at an explicit timestamp
    ///
    /// The in-memory series is updated even when the log write fails, so
    /// plotting keeps working while persistence is broken.
    pub fn record_at(&mut self, timestamp: f64, counts: Counts) -> Result<(), TelemetryError> {
        self.samples.push(Sample {
            timestamp,
            chars: counts.chars,
            words: counts.words,
        });
        let record = format!("{},{},{};", timestamp, counts.chars, counts.words);
        self.append(&record).map_err(|source| TelemetryError::LogWrite {
            path: self.log_path.clone(),
            source,
        })
    }

    /// Samples recorded this session, in time order
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Words-per-minute points derived from consecutive sample deltas
    ///
    /// Recomputed from the full in-memory history on every call; empty when
    /// fewer than two samples exist, else one point per consecutive pair.
    pub fn rate_series(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.samples.windows(2).map(|pair| {
            let dt = pair[1].timestamp - pair[0].timestamp;
            let dw = pair[1].words as f64 - pair[0].words as f64;
            let rate = if dt > 0.0 {
                dw / dt * 60.0 / CADENCE_DIVISOR
            } else {
                0.0
            };
            (pair[1].timestamp, rate)
        })
    }

    /// Mean of the raw rate series
    pub fn mean_rate(&self) -> f64 {
        let rates: Vec<f64> = self.rate_series().map(|(_, r)| r).collect();
        if rates.is_empty() {
            return 0.0;
        }
        rates.iter().sum::<f64>() / rates.len() as f64
    }

    /// Rate series smoothed by a double moving average
    ///
    /// Empty until at least `smoothing_window` samples exist; otherwise the
    /// output is `2 * (window - 1)` points shorter than the raw series, each
    /// paired with the matching timestamp from the start of the session.
    pub fn smoothed_rates(&self) -> Vec<(f64, f64)> {
        if self.samples.len() < self.smoothing_window {
            return Vec::new();
        }
        let rates: Vec<f64> = self.rate_series().map(|(_, r)| r).collect();
        let once = moving_average(&rates, self.smoothing_window);
        let twice = moving_average(&once, self.smoothing_window);
        self.samples
            .iter()
            .map(|s| s.timestamp)
            .zip(twice)
            .collect()
    }

    /// Clear and redraw the rate plot once enough data exists
    pub fn draw(&self, surface: &mut dyn PlotSurface) {
        let smoothed = self.smoothed_rates();
        if smoothed.is_empty() {
            return;
        }
        let mean = self.mean_rate();
        let mean_line: Vec<(f64, f64)> = smoothed.iter().map(|&(t, _)| (t, mean)).collect();

        surface.clear();
        surface.set_y_bounds(RATE_AXIS.0, RATE_AXIS.1);
        surface.polyline(&smoothed);
        surface.polyline(&mean_line);
        surface.present();
    }

    fn append(&self, record: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.log_path)?;
        file.write_all(record.as_bytes())
    }
}

/// Moving average over a sliding window, emitting only full windows
fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || values.len() < window {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(values.len() - window + 1);
    let mut sum: f64 = values[..window].iter().sum();
    out.push(sum / window as f64);
    for i in window..values.len() {
        sum += values[i] - values[i - window];
        out.push(sum / window as f64);
    }
    out
}
