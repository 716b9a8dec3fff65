//! Configuration for one pipeline run
//!
//! Every stage receives the same immutable `PipelineConfig` by reference,
//! so concurrent runs never share configuration state. Defaults can be
//! overridden from a JSON file for fast iteration without recompilation.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::PipelineError;

/// Complete application configuration as stored on disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
}

/// Parameters for one signal-to-script run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Analysis sample rate in Hz; input is resampled to this rate
    pub sample_rate: u32,
    /// Onset peak-picking sensitivity (0..1, higher = fewer onsets)
    pub onset_threshold: f32,
    /// Beat trimming sensitivity (0..1, higher = more weak edge beats dropped)
    pub beat_threshold: f32,
    /// Use every detected onset instead of tracked beats
    pub use_onset: bool,
    /// Minimum spacing between two accepted actions
    pub min_interval_ms: u32,
    /// Maximum excursion between low and high strokes (1..100)
    pub range: u8,
    /// Swap low/high extremes for the whole script
    pub inverted: bool,
    pub detector: DetectorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22_050,
            onset_threshold: 0.5,
            beat_threshold: 0.5,
            use_onset: false,
            min_interval_ms: 50,
            range: 100,
            inverted: false,
            detector: DetectorConfig::default(),
        }
    }
}

/// Spectral-flux detector parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// FFT window size in samples
    pub window_size: usize,
    /// Hop between analysis frames in samples
    pub hop_length: usize,
    /// Half-size of median filter window for onset peak picking
    pub median_window_halfsize: usize,
    /// Centered moving-average width applied to the envelope (1 = off)
    pub smoothing_frames: usize,
    pub min_bpm: f32,
    pub max_bpm: f32,
    /// Center of the tempo prior
    pub start_bpm: f32,
    /// How strongly the beat tracker sticks to the estimated period
    pub tightness: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_size: 2048,
            hop_length: 512,
            median_window_halfsize: 8,
            smoothing_frames: 3,
            min_bpm: 40.0,
            max_bpm: 240.0,
            start_bpm: 120.0,
            tightness: 100.0,
        }
    }
}

impl PipelineConfig {
    /// Reject out-of-bounds parameters before any stage runs
    pub fn validate(&self) -> Result<(), PipelineError> {
        check_unit("onset_threshold", self.onset_threshold)?;
        check_unit("beat_threshold", self.beat_threshold)?;

        if self.range == 0 || self.range > 100 {
            return Err(PipelineError::invalid_config(
                "range",
                format!("must be within 1..100 (got {})", self.range),
            ));
        }
        if self.sample_rate == 0 {
            return Err(PipelineError::invalid_config(
                "sample_rate",
                "must be greater than 0",
            ));
        }

        self.detector.validate()
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.window_size < 2 {
            return Err(PipelineError::invalid_config(
                "detector.window_size",
                format!("must be at least 2 (got {})", self.window_size),
            ));
        }
        if self.hop_length == 0 || self.hop_length > self.window_size {
            return Err(PipelineError::invalid_config(
                "detector.hop_length",
                format!(
                    "must be within 1..={} (got {})",
                    self.window_size, self.hop_length
                ),
            ));
        }
        if self.smoothing_frames == 0 {
            return Err(PipelineError::invalid_config(
                "detector.smoothing_frames",
                "must be at least 1",
            ));
        }
        if !(self.min_bpm > 0.0 && self.min_bpm < self.max_bpm) {
            return Err(PipelineError::invalid_config(
                "detector.min_bpm",
                format!(
                    "must be positive and below max_bpm ({} >= {})",
                    self.min_bpm, self.max_bpm
                ),
            ));
        }
        if !(self.start_bpm > 0.0) || !(self.tightness >= 0.0) {
            return Err(PipelineError::invalid_config(
                "detector.start_bpm",
                "start_bpm must be positive and tightness non-negative",
            ));
        }
        Ok(())
    }
}

fn check_unit(field: &str, value: f32) -> Result<(), PipelineError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PipelineError::invalid_config(
            field,
            format!("must be within 0..1 (got {})", value),
        ))
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or defaults when the file is missing or
    /// its JSON is invalid.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }
}
