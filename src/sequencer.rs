//! Action sequencer - normalized events to alternating stroke positions
//!
//! Rules, applied in one left-to-right pass:
//! - Timestamps are rounded to whole milliseconds first; an event landing on
//!   or less than `min_interval_ms` after the last accepted action is dropped,
//!   so the first event of a cluster wins.
//! - Accepted events alternate low / high, starting low.
//! - `offset = strength * range / 2`; low is `50 - offset`, high `50 + offset`,
//!   rounded half away from zero and clamped to `0..=100`.
//! - Inversion mirrors every rounded position (`100 - pos`).

use crate::analysis::Event;
use crate::config::PipelineConfig;
use crate::script::Action;

/// Midpoint of the position scale
const CENTER: f32 = 50.0;
const MAX_POS: f32 = 100.0;

/// Which extreme an accepted event is sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stroke {
    Low,
    High,
}

impl Stroke {
    fn next(self) -> Self {
        match self {
            Stroke::Low => Stroke::High,
            Stroke::High => Stroke::Low,
        }
    }
}

/// Turns normalized events into a script's action list
#[derive(Debug, Clone, Copy)]
pub struct ActionSequencer {
    min_interval_ms: u64,
    range: u8,
    inverted: bool,
}

impl ActionSequencer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            min_interval_ms: u64::from(config.min_interval_ms),
            range: config.range.clamp(1, 100),
            inverted: config.inverted,
        }
    }

    /// Sequence `events` (ascending timestamps, strengths in `[0, 1]`)
    ///
    /// Empty input gives an empty action list. Non-finite or negative
    /// timestamps are skipped.
    pub fn sequence(&self, events: &[Event]) -> Vec<Action> {
        let mut actions: Vec<Action> = Vec::with_capacity(events.len());
        let mut stroke = Stroke::Low;
        let mut skipped = 0usize;

        for event in events {
            if !event.timestamp.is_finite() || event.timestamp < 0.0 {
                skipped += 1;
                continue;
            }

            let at = seconds_to_ms(event.timestamp);
            if let Some(last) = actions.last() {
                if at <= last.at || at - last.at < self.min_interval_ms {
                    skipped += 1;
                    continue;
                }
            }

            let pos = self.position(stroke, event.strength);
            actions.push(Action { at, pos });
            stroke = stroke.next();
        }

        tracing::debug!(
            "[ActionSequencer] {} events -> {} actions ({} dropped, range {}, inverted {})",
            events.len(),
            actions.len(),
            skipped,
            self.range,
            self.inverted
        );

        actions
    }

    /// Position for one stroke at the given normalized strength
    pub fn position(&self, stroke: Stroke, strength: f32) -> u8 {
        let strength = if strength.is_finite() {
            strength.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let offset = strength * f32::from(self.range) / 2.0;
        let raw = match stroke {
            Stroke::Low => CENTER - offset,
            Stroke::High => CENTER + offset,
        };
        let pos = raw.round().clamp(0.0, MAX_POS) as u8;

        if self.inverted {
            100 - pos
        } else {
            pos
        }
    }
}

/// Seconds to whole milliseconds, rounded half away from zero
pub fn seconds_to_ms(seconds: f64) -> u64 {
    (seconds * 1000.0).round() as u64
}
