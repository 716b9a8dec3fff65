// PulseDetector - seam between the pipeline and the detection algorithm
//
// The sequencer only needs frame indices and an envelope, so anything that
// can produce those (the bundled spectral-flux detector, a test fixture,
// a future ML model) plugs in here.

use crate::config::DetectorConfig;
use crate::error::PipelineError;
use crate::media::Waveform;

/// Which pulse train the detector should report
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DetectionMode {
    /// Beat-tracked, tempo-regular pulses
    Beats,
    /// Every detected onset (superset of beats)
    Onsets,
}

/// Raw detector output
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Frame indices of the detected pulses
    pub frames: Vec<usize>,
    /// Onset strength per frame, non-negative
    pub envelope: Vec<f32>,
    /// Samples between two frames
    pub hop_length: usize,
    /// Estimated tempo, when the detector tracked beats
    pub tempo_bpm: Option<f32>,
}

/// External onset/beat detection capability
pub trait PulseDetector: Send + Sync {
    /// Detect pulses in `waveform`
    ///
    /// # Arguments
    /// * `mode` - beats or all onsets
    /// * `sensitivity` - 0..1 threshold, higher keeps fewer pulses
    /// * `params` - frame layout and tempo search bounds
    fn detect(
        &self,
        waveform: &Waveform,
        mode: DetectionMode,
        sensitivity: f32,
        params: &DetectorConfig,
    ) -> Result<Detection, PipelineError>;
}
