//! Beat tracking on an onset-strength envelope
//!
//! Two steps, both operating on hop frames:
//! - Tempo: autocorrelation of the envelope over the allowed BPM range,
//!   weighted by a log-Gaussian prior (one octave wide) around `start_bpm`.
//! - Beats: dynamic programming over a Gaussian-smoothed local score. Each
//!   frame links back to the best earlier frame between half and twice the
//!   beat period, penalized by `tightness * ln(gap / period)^2`. The chain is
//!   backtracked from the last strong cumulative-score peak, then weak
//!   leading/trailing beats are trimmed.

use crate::config::DetectorConfig;

/// Beat frames plus the tempo they were tracked at
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedBeats {
    pub frames: Vec<usize>,
    pub tempo_bpm: Option<f32>,
}

/// Track beats in `envelope`
///
/// # Arguments
/// * `frame_rate` - envelope frames per second
/// * `trim_threshold` - edge beats with local score below
///   `trim_threshold * rms(beat scores)` are dropped
pub fn track_beats(
    envelope: &[f32],
    frame_rate: f32,
    trim_threshold: f32,
    params: &DetectorConfig,
) -> TrackedBeats {
    if envelope.len() < 2 || !envelope.iter().any(|v| *v > 0.0) || frame_rate <= 0.0 {
        return TrackedBeats {
            frames: Vec::new(),
            tempo_bpm: None,
        };
    }

    let period = estimate_period(envelope, frame_rate, params)
        .unwrap_or(60.0 * frame_rate / params.start_bpm);
    let tempo_bpm = 60.0 * frame_rate / period;

    let local = local_score(envelope, period);
    let beats = dynamic_programming(&local, period, params.tightness);
    let frames = trim_beats(&local, beats, trim_threshold);

    tracing::debug!(
        "[BeatTracker] period {:.2} frames ({:.1} BPM), {} beats",
        period,
        tempo_bpm,
        frames.len()
    );

    TrackedBeats {
        frames,
        tempo_bpm: Some(tempo_bpm),
    }
}

/// Estimate the beat period in frames, or `None` when the envelope is too short
pub fn estimate_period(envelope: &[f32], frame_rate: f32, params: &DetectorConfig) -> Option<f32> {
    let n = envelope.len();
    let min_lag = ((60.0 * frame_rate / params.max_bpm).round() as usize).max(1);
    let max_lag = ((60.0 * frame_rate / params.min_bpm).round() as usize).min(n.saturating_sub(1));
    if min_lag > max_lag {
        return None;
    }

    let mut best: Option<(usize, f32)> = None;
    for lag in min_lag..=max_lag {
        let overlap = n - lag;
        let corr: f32 = envelope[..overlap]
            .iter()
            .zip(&envelope[lag..])
            .map(|(a, b)| a * b)
            .sum::<f32>()
            / overlap as f32;

        let bpm = 60.0 * frame_rate / lag as f32;
        let octaves = (bpm / params.start_bpm).log2();
        let weighted = corr * (-0.5 * octaves * octaves).exp();

        if weighted > best.map(|(_, score)| score).unwrap_or(0.0) {
            best = Some((lag, weighted));
        }
    }

    best.map(|(lag, _)| lag as f32)
}

/// Envelope normalized by its standard deviation and smoothed by a
/// Gaussian spanning one beat period on each side
fn local_score(envelope: &[f32], period: f32) -> Vec<f32> {
    let n = envelope.len();
    let mean = envelope.iter().sum::<f32>() / n as f32;
    let std = (envelope.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n as f32).sqrt();
    let scale = if std > 0.0 { std } else { 1.0 };

    let half = period.round().max(1.0) as isize;
    let kernel: Vec<f32> = (-half..=half)
        .map(|k| (-0.5 * (k as f32 * 32.0 / period).powi(2)).exp())
        .collect();

    (0..n as isize)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .filter_map(|(k, w)| {
                    let j = i + k as isize - half;
                    (j >= 0 && (j as usize) < n).then(|| w * envelope[j as usize] / scale)
                })
                .sum()
        })
        .collect()
}

fn dynamic_programming(local: &[f32], period: f32, tightness: f32) -> Vec<usize> {
    let n = local.len();
    let min_gap = (period / 2.0).round().max(1.0) as usize;
    let max_gap = (period * 2.0).round().max(min_gap as f32) as usize;

    let mut cumulative = vec![0.0f32; n];
    let mut backlink: Vec<Option<usize>> = vec![None; n];

    for i in 0..n {
        let mut best: Option<(usize, f32)> = None;
        if i >= min_gap {
            let earliest = i.saturating_sub(max_gap);
            for j in earliest..=i - min_gap {
                let gap = (i - j) as f32;
                let penalty = -tightness * (gap / period).ln().powi(2);
                let score = cumulative[j] + penalty;
                if best.map(|(_, s)| score > s).unwrap_or(true) {
                    best = Some((j, score));
                }
            }
        }

        match best {
            // Only chain onto a predecessor that helps
            Some((j, score)) if score > 0.0 => {
                cumulative[i] = local[i] + score;
                backlink[i] = Some(j);
            }
            _ => cumulative[i] = local[i],
        }
    }

    let Some(last) = last_beat(&cumulative) else {
        return Vec::new();
    };

    let mut beats = vec![last];
    let mut cursor = last;
    while let Some(prev) = backlink[cursor] {
        beats.push(prev);
        cursor = prev;
    }
    beats.reverse();
    beats
}

/// Last local maximum of the cumulative score above half the median peak
fn last_beat(cumulative: &[f32]) -> Option<usize> {
    let n = cumulative.len();
    let is_peak = |i: usize| {
        let left = if i == 0 { f32::NEG_INFINITY } else { cumulative[i - 1] };
        let right = if i + 1 == n { f32::NEG_INFINITY } else { cumulative[i + 1] };
        cumulative[i] > left && cumulative[i] >= right
    };

    let mut peaks: Vec<f32> = (0..n).filter(|&i| is_peak(i)).map(|i| cumulative[i]).collect();
    if peaks.is_empty() {
        return None;
    }
    peaks.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = peaks[peaks.len() / 2];

    (0..n)
        .rev()
        .find(|&i| is_peak(i) && cumulative[i] >= 0.5 * median)
}

fn trim_beats(local: &[f32], beats: Vec<usize>, threshold: f32) -> Vec<usize> {
    if beats.is_empty() {
        return beats;
    }

    let scores: Vec<f32> = beats.iter().map(|&b| local[b]).collect();
    let rms = (scores.iter().map(|s| s * s).sum::<f32>() / scores.len() as f32).sqrt();
    let cutoff = threshold * rms;

    let Some(first) = scores.iter().position(|s| *s >= cutoff) else {
        return Vec::new();
    };
    let last = scores
        .iter()
        .rposition(|s| *s >= cutoff)
        .unwrap_or(first);
    beats[first..=last].to_vec()
}
