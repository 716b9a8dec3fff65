// Analysis module - feature extraction and event strength mapping
//
// This module turns a waveform into a time-ordered list of pulse events
// plus the onset-strength envelope they were taken from.
//
// Architecture:
// - PulseDetector: narrow seam to the onset/beat detection algorithm
// - FeatureExtractor: runs the detector, smooths the envelope, converts
//   frame indices to seconds
// - StrengthMapper: per-event local energy, min-max normalized per run

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::media::Waveform;

pub mod beat;
pub mod detector;
pub mod onset;
pub mod strength;

pub use detector::{Detection, DetectionMode, PulseDetector};
pub use onset::SpectralFluxDetector;
pub use strength::{normalize_strengths, StrengthMapper};

/// One detected pulse
///
/// `strength` is raw envelope energy when produced by the extractor and a
/// normalized value in `[0, 1]` once it has passed through the mapper.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Event {
    /// Seconds from the start of the input
    pub timestamp: f64,
    pub strength: f32,
}

impl Event {
    pub fn new(timestamp: f64, strength: f32) -> Self {
        Self {
            timestamp,
            strength,
        }
    }
}

/// Per-frame onset strength with its frame-to-time factor
#[derive(Debug, Clone, PartialEq)]
pub struct OnsetEnvelope {
    values: Vec<f32>,
    hop_length: usize,
    sample_rate: u32,
}

impl OnsetEnvelope {
    pub fn new(values: Vec<f32>, hop_length: usize, sample_rate: u32) -> Self {
        Self {
            values,
            hop_length: hop_length.max(1),
            sample_rate: sample_rate.max(1),
        }
    }

    /// Build an envelope directly from the seconds-per-frame factor
    ///
    /// Handy for synthetic fixtures where there is no real sample rate.
    pub fn with_hop_seconds(values: Vec<f32>, hop_seconds: f64) -> Self {
        // 1 MHz pseudo rate keeps microsecond resolution on the time axis
        let sample_rate = 1_000_000u32;
        let hop_length = (hop_seconds * sample_rate as f64).round().max(1.0) as usize;
        Self::new(values, hop_length, sample_rate)
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Seconds between two consecutive frames
    pub fn hop_seconds(&self) -> f64 {
        self.hop_length as f64 / self.sample_rate as f64
    }

    pub fn frame_to_time(&self, frame: usize) -> f64 {
        frame as f64 * self.hop_seconds()
    }

    /// Fractional frame position of `seconds`
    pub fn time_to_frame(&self, seconds: f64) -> f64 {
        seconds / self.hop_seconds()
    }

    pub fn min(&self) -> f32 {
        self.values.iter().copied().fold(f32::INFINITY, f32::min)
    }

    pub fn max(&self) -> f32 {
        self.values.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }
}

/// Runs the pulse detector and packages its output as events + envelope
pub struct FeatureExtractor {
    detector: Box<dyn PulseDetector>,
}

impl FeatureExtractor {
    pub fn new(detector: Box<dyn PulseDetector>) -> Self {
        Self { detector }
    }

    /// Extract beat or onset events from `waveform`
    ///
    /// # Errors
    /// `EmptyAudio` when the waveform or the resulting envelope carries no
    /// energy. Detector errors are passed through untouched.
    pub fn extract(
        &self,
        waveform: &Waveform,
        config: &PipelineConfig,
    ) -> Result<(Vec<Event>, OnsetEnvelope), PipelineError> {
        if waveform.is_silent() {
            return Err(PipelineError::EmptyAudio);
        }

        let (mode, sensitivity) = if config.use_onset {
            (DetectionMode::Onsets, config.onset_threshold)
        } else {
            (DetectionMode::Beats, config.beat_threshold)
        };

        let detection = self
            .detector
            .detect(waveform, mode, sensitivity, &config.detector)?;

        let values = smooth_envelope(&detection.envelope, config.detector.smoothing_frames);
        if !values.iter().any(|v| *v > 0.0) {
            return Err(PipelineError::EmptyAudio);
        }
        let envelope = OnsetEnvelope::new(values, detection.hop_length, waveform.sample_rate());

        let mut frames = detection.frames;
        frames.retain(|frame| *frame < envelope.len());
        frames.sort_unstable();
        frames.dedup();

        let events: Vec<Event> = frames
            .into_iter()
            .map(|frame| Event::new(envelope.frame_to_time(frame), envelope.values()[frame]))
            .collect();

        tracing::info!(
            "[FeatureExtractor] {:?} mode produced {} events over {} frames{}",
            mode,
            events.len(),
            envelope.len(),
            detection
                .tempo_bpm
                .map(|bpm| format!(" (tempo {:.1} BPM)", bpm))
                .unwrap_or_default()
        );

        Ok((events, envelope))
    }
}

/// Centered moving average over `width` frames; `width <= 1` is a no-op
pub fn smooth_envelope(values: &[f32], width: usize) -> Vec<f32> {
    if width <= 1 || values.len() < 2 {
        return values.to_vec();
    }

    let before = width / 2;
    let after = (width - 1) / 2;
    (0..values.len())
        .map(|i| {
            let start = i.saturating_sub(before);
            let end = (i + after + 1).min(values.len());
            let window = &values[start..end];
            window.iter().sum::<f32>() / window.len() as f32
        })
        .collect()
}

#[cfg(test)]
mod tests;
