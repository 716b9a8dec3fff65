//! Event strength mapping
//!
//! Looks up the local envelope energy under each event and scales it to
//! `[0, 1]` with min-max normalization over the whole envelope, so that
//! strengths stay comparable across the full track.

use crate::analysis::{Event, OnsetEnvelope};

/// Strength assigned to every event when the envelope is flat
pub const FLAT_ENVELOPE_STRENGTH: f32 = 0.5;

/// Frame positions closer than this to an integer are treated as exact
const FRAME_EPSILON: f64 = 1e-6;

/// Maps raw events onto normalized strengths
pub struct StrengthMapper;

impl StrengthMapper {
    /// Replace each event's strength with its normalized local energy
    pub fn map(events: &[Event], envelope: &OnsetEnvelope) -> Vec<Event> {
        if envelope.is_empty() {
            return events
                .iter()
                .map(|e| Event::new(e.timestamp, FLAT_ENVELOPE_STRENGTH))
                .collect();
        }

        let (min, max) = (envelope.min(), envelope.max());
        events
            .iter()
            .map(|event| {
                let raw = local_energy(envelope, event.timestamp);
                Event::new(event.timestamp, normalize(raw, min, max))
            })
            .collect()
    }
}

/// Envelope energy at `seconds`, linearly interpolated between frame centers
pub fn local_energy(envelope: &OnsetEnvelope, seconds: f64) -> f32 {
    let values = envelope.values();
    let last = values.len() - 1;
    let position = envelope.time_to_frame(seconds.max(0.0));

    let nearest = position.round();
    if (position - nearest).abs() < FRAME_EPSILON {
        return values[(nearest as usize).min(last)];
    }

    let lower = position.floor() as usize;
    if lower >= last {
        return values[last];
    }
    let frac = (position - lower as f64) as f32;
    values[lower] + (values[lower + 1] - values[lower]) * frac
}

fn normalize(raw: f32, min: f32, max: f32) -> f32 {
    if max <= min {
        return FLAT_ENVELOPE_STRENGTH;
    }
    ((raw - min) / (max - min)).clamp(0.0, 1.0)
}

/// Min-max normalize raw values against explicit bounds
///
/// With `min = 0, max = 1` values already in `[0, 1]` come back unchanged.
pub fn normalize_strengths(values: &[f32], min: f32, max: f32) -> Vec<f32> {
    values.iter().map(|v| normalize(*v, min, max)).collect()
}
