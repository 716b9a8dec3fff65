// SpectralFluxDetector - spectral flux onset envelope and peak picking
//
// Default PulseDetector. It computes an onset-strength envelope with the
// spectral flux algorithm and either peak-picks it (onset mode) or hands it
// to the dynamic-programming beat tracker (beat mode).
//
// Algorithm:
// 1. Pad the signal by window/2 on both sides so frame t is centered on t * hop
// 2. Hann-windowed FFT per hop, magnitude spectrum |FFT[k]|
// 3. Positive difference from previous frame: SF[k] = max(0, |FFT_t[k]| - |FFT_(t-1)[k]|)
// 4. Sum across frequency bins: flux_t = Σ SF[k]
// 5. Onsets: normalize to [0, 1], threshold_t = median(flux[t-N:t+N]) + delta
// 6. Peak pick: local maxima where flux_t > threshold_t

use rustfft::{num_complex::Complex, FftPlanner};
use std::sync::Mutex;

use crate::analysis::beat;
use crate::analysis::detector::{Detection, DetectionMode, PulseDetector};
use crate::config::DetectorConfig;
use crate::error::PipelineError;
use crate::media::Waveform;

/// Peak-picking delta at sensitivity 1.0 (0.5 gives the common 0.07 delta)
const ONSET_DELTA_SCALE: f32 = 0.14;

/// Spectral flux based onset and beat detector
pub struct SpectralFluxDetector {
    fft_planner: Mutex<FftPlanner<f32>>,
}

impl SpectralFluxDetector {
    pub fn new() -> Self {
        Self {
            fft_planner: Mutex::new(FftPlanner::new()),
        }
    }

    /// Compute the onset-strength envelope for `samples`
    ///
    /// # Returns
    /// One non-negative flux value per hop frame; the first frame is 0.
    pub fn onset_envelope(&self, samples: &[f32], params: &DetectorConfig) -> Vec<f32> {
        let window_size = params.window_size.max(2);
        let hop = params.hop_length.max(1);

        // Pre-compute Hann window to reduce spectral leakage
        let window: Vec<f32> = (0..window_size)
            .map(|i| {
                0.5 * (1.0
                    - ((2.0 * std::f32::consts::PI * i as f32) / (window_size as f32 - 1.0)).cos())
            })
            .collect();

        let pad = window_size / 2;
        let mut padded = vec![0.0f32; samples.len() + 2 * pad];
        padded[pad..pad + samples.len()].copy_from_slice(samples);

        let fft = {
            let mut planner = self
                .fft_planner
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            planner.plan_fft_forward(window_size)
        };

        let mut envelope = Vec::with_capacity(padded.len() / hop + 1);
        let mut prev_spectrum: Option<Vec<f32>> = None;
        let mut buffer = vec![Complex::new(0.0f32, 0.0); window_size];

        let mut pos = 0;
        while pos + window_size <= padded.len() {
            for ((slot, sample), w) in buffer
                .iter_mut()
                .zip(&padded[pos..pos + window_size])
                .zip(&window)
            {
                *slot = Complex::new(sample * w, 0.0);
            }
            fft.process(&mut buffer);

            // Magnitude spectrum (only positive frequencies)
            let spectrum: Vec<f32> = buffer[..window_size / 2 + 1]
                .iter()
                .map(|c| c.norm())
                .collect();

            let flux = match &prev_spectrum {
                Some(prev) => spectral_flux(&spectrum, prev),
                None => 0.0,
            };
            envelope.push(flux);
            prev_spectrum = Some(spectrum);
            pos += hop;
        }

        envelope
    }
}

impl Default for SpectralFluxDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseDetector for SpectralFluxDetector {
    fn detect(
        &self,
        waveform: &Waveform,
        mode: DetectionMode,
        sensitivity: f32,
        params: &DetectorConfig,
    ) -> Result<Detection, PipelineError> {
        let envelope = self.onset_envelope(waveform.samples(), params);
        let frame_rate = waveform.sample_rate() as f32 / params.hop_length.max(1) as f32;

        let (frames, tempo_bpm) = match mode {
            DetectionMode::Onsets => (
                pick_onsets(
                    &envelope,
                    params.median_window_halfsize,
                    sensitivity * ONSET_DELTA_SCALE,
                ),
                None,
            ),
            DetectionMode::Beats => {
                let tracked = beat::track_beats(&envelope, frame_rate, sensitivity, params);
                (tracked.frames, tracked.tempo_bpm)
            }
        };

        Ok(Detection {
            frames,
            envelope,
            hop_length: params.hop_length.max(1),
            tempo_bpm,
        })
    }
}

/// Compute spectral flux as sum of positive differences
///
/// SF(t) = Σ max(0, |FFT(t)| - |FFT(t-1)|)
fn spectral_flux(spectrum: &[f32], prev_spectrum: &[f32]) -> f32 {
    spectrum
        .iter()
        .zip(prev_spectrum.iter())
        .map(|(curr, prev)| (curr - prev).max(0.0))
        .sum()
}

/// Calculate adaptive threshold using median + delta
///
/// threshold(t) = median(flux[t-N:t+N]) + delta
fn adaptive_threshold(flux: &[f32], index: usize, halfsize: usize, delta: f32) -> f32 {
    let start = index.saturating_sub(halfsize);
    let end = (index + halfsize + 1).min(flux.len());

    if start >= end {
        return delta;
    }

    let mut window: Vec<f32> = flux[start..end].to_vec();
    window.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let median = if window.len() % 2 == 0 {
        let mid = window.len() / 2;
        (window[mid - 1] + window[mid]) / 2.0
    } else {
        window[window.len() / 2]
    };

    median + delta
}

/// Peak-pick onset frames from a raw envelope
///
/// The envelope is scaled to [0, 1] first so `delta` means the same thing
/// for quiet and loud recordings.
pub fn pick_onsets(envelope: &[f32], halfsize: usize, delta: f32) -> Vec<usize> {
    let max = envelope.iter().copied().fold(0.0f32, f32::max);
    if envelope.len() < 3 || max <= 0.0 {
        return Vec::new();
    }
    let normalized: Vec<f32> = envelope.iter().map(|v| v / max).collect();

    let mut peaks = Vec::new();
    for i in 1..normalized.len() - 1 {
        let prev = normalized[i - 1];
        let curr = normalized[i];
        let next = normalized[i + 1];

        if curr > prev && curr >= next && curr > adaptive_threshold(&normalized, i, halfsize, delta)
        {
            peaks.push(i);
        }
    }
    peaks
}
