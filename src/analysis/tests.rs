// Feature extraction tests
//
// Fixture detectors pin the envelope so extractor behavior is checked
// independently of the spectral flux algorithm; the last tests run the real
// detector on synthetic click tracks.

use super::*;
use crate::config::DetectorConfig;

/// Detector double returning a fixed detection
struct FixedDetector {
    frames: Vec<usize>,
    envelope: Vec<f32>,
    hop_length: usize,
}

impl PulseDetector for FixedDetector {
    fn detect(
        &self,
        _waveform: &Waveform,
        _mode: DetectionMode,
        _sensitivity: f32,
        _params: &DetectorConfig,
    ) -> Result<Detection, PipelineError> {
        Ok(Detection {
            frames: self.frames.clone(),
            envelope: self.envelope.clone(),
            hop_length: self.hop_length,
            tempo_bpm: None,
        })
    }
}

/// Records the mode/sensitivity it was asked for
struct ModeProbe {
    seen: std::sync::Mutex<Option<(DetectionMode, f32)>>,
}

impl PulseDetector for ModeProbe {
    fn detect(
        &self,
        _waveform: &Waveform,
        mode: DetectionMode,
        sensitivity: f32,
        _params: &DetectorConfig,
    ) -> Result<Detection, PipelineError> {
        *self.seen.lock().unwrap() = Some((mode, sensitivity));
        Ok(Detection {
            frames: vec![1],
            envelope: vec![0.0, 1.0, 0.5],
            hop_length: 10,
            tempo_bpm: Some(120.0),
        })
    }
}

fn unsmoothed_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.detector.smoothing_frames = 1;
    config
}

/// Decaying 1kHz bursts at the given times
fn click_track(sample_rate: u32, duration_s: f32, clicks: &[f32]) -> Waveform {
    let total = (sample_rate as f32 * duration_s) as usize;
    let mut samples = vec![0.0f32; total];
    for &at in clicks {
        let start = (at * sample_rate as f32) as usize;
        for (n, sample) in samples.iter_mut().skip(start).take(sample_rate as usize / 20).enumerate() {
            let t = n as f32 / sample_rate as f32;
            *sample += 0.8 * (-t * 80.0).exp() * (2.0 * std::f32::consts::PI * 1000.0 * t).sin();
        }
    }
    Waveform::new(samples, sample_rate)
}

#[test]
fn test_extract_converts_frames_to_seconds() {
    let extractor = FeatureExtractor::new(Box::new(FixedDetector {
        frames: vec![0, 2, 4],
        envelope: vec![1.0, 0.0, 3.0, 0.0, 2.0],
        hop_length: 100,
    }));
    let wave = Waveform::new(vec![0.1; 1000], 1000);

    let (events, envelope) = extractor.extract(&wave, &unsmoothed_config()).unwrap();
    let times: Vec<f64> = events.iter().map(|e| e.timestamp).collect();
    assert_eq!(times, vec![0.0, 0.2, 0.4]);
    let raw: Vec<f32> = events.iter().map(|e| e.strength).collect();
    assert_eq!(raw, vec![1.0, 3.0, 2.0]);
    assert_eq!(envelope.len(), 5);
    assert!((envelope.hop_seconds() - 0.1).abs() < 1e-12);
}

#[test]
fn test_extract_drops_out_of_range_and_duplicate_frames() {
    let extractor = FeatureExtractor::new(Box::new(FixedDetector {
        frames: vec![2, 1, 1, 9],
        envelope: vec![0.0, 1.0, 2.0, 0.0],
        hop_length: 10,
    }));
    let wave = Waveform::new(vec![0.5; 100], 100);

    let (events, _) = extractor.extract(&wave, &unsmoothed_config()).unwrap();
    let times: Vec<f64> = events.iter().map(|e| e.timestamp).collect();
    assert_eq!(times, vec![0.1, 0.2]);
}

#[test]
fn test_extract_silence_is_empty_audio() {
    let extractor = FeatureExtractor::new(Box::new(SpectralFluxDetector::new()));
    let wave = Waveform::new(vec![0.0; 22_050], 22_050);

    match extractor.extract(&wave, &PipelineConfig::default()) {
        Err(PipelineError::EmptyAudio) => {}
        other => panic!("Expected EmptyAudio, got {:?}", other),
    }

    let empty = Waveform::new(Vec::new(), 22_050);
    assert_eq!(
        extractor.extract(&empty, &PipelineConfig::default()).unwrap_err(),
        PipelineError::EmptyAudio
    );
}

#[test]
fn test_extract_flat_zero_envelope_is_empty_audio() {
    let extractor = FeatureExtractor::new(Box::new(FixedDetector {
        frames: vec![],
        envelope: vec![0.0; 8],
        hop_length: 10,
    }));
    let wave = Waveform::new(vec![0.2; 100], 100);
    assert_eq!(
        extractor.extract(&wave, &PipelineConfig::default()).unwrap_err(),
        PipelineError::EmptyAudio
    );
}

#[test]
fn test_extract_passes_mode_and_matching_threshold() {
    let probe = std::sync::Arc::new(ModeProbe {
        seen: std::sync::Mutex::new(None),
    });

    struct Shared(std::sync::Arc<ModeProbe>);
    impl PulseDetector for Shared {
        fn detect(
            &self,
            waveform: &Waveform,
            mode: DetectionMode,
            sensitivity: f32,
            params: &DetectorConfig,
        ) -> Result<Detection, PipelineError> {
            self.0.detect(waveform, mode, sensitivity, params)
        }
    }

    let extractor = FeatureExtractor::new(Box::new(Shared(probe.clone())));
    let wave = Waveform::new(vec![0.3; 100], 100);

    let config = PipelineConfig {
        use_onset: true,
        onset_threshold: 0.3,
        beat_threshold: 0.9,
        ..PipelineConfig::default()
    };
    extractor.extract(&wave, &config).unwrap();
    assert_eq!(*probe.seen.lock().unwrap(), Some((DetectionMode::Onsets, 0.3)));

    let config = PipelineConfig {
        use_onset: false,
        ..config
    };
    extractor.extract(&wave, &config).unwrap();
    assert_eq!(*probe.seen.lock().unwrap(), Some((DetectionMode::Beats, 0.9)));
}

#[test]
fn test_smooth_envelope_moving_average() {
    assert_eq!(smooth_envelope(&[0.0, 3.0, 0.0], 1), vec![0.0, 3.0, 0.0]);
    assert_eq!(smooth_envelope(&[0.0, 3.0, 0.0], 3), vec![1.5, 1.0, 1.5]);
}

#[test]
fn test_envelope_time_axis() {
    let env = OnsetEnvelope::new(vec![1.0, 2.0, 3.0], 512, 22_050);
    assert!((env.frame_to_time(2) - 1024.0 / 22_050.0).abs() < 1e-12);
    assert!((env.time_to_frame(env.frame_to_time(2)) - 2.0).abs() < 1e-9);
    assert_eq!(env.min(), 1.0);
    assert_eq!(env.max(), 3.0);
}

#[test]
fn test_spectral_flux_onsets_follow_clicks() {
    let clicks = [0.25, 0.75, 1.25, 1.75, 2.25, 2.75, 3.25];
    let wave = click_track(22_050, 4.0, &clicks);
    let extractor = FeatureExtractor::new(Box::new(SpectralFluxDetector::new()));
    let config = PipelineConfig {
        use_onset: true,
        ..PipelineConfig::default()
    };

    let (events, _) = extractor.extract(&wave, &config).unwrap();
    assert!(!events.is_empty());

    for click in clicks {
        assert!(
            events.iter().any(|e| (e.timestamp - click as f64).abs() < 0.1),
            "no onset near click at {}s: {:?}",
            click,
            events
        );
    }
    for event in &events {
        assert!(
            clicks.iter().any(|c| (event.timestamp - *c as f64).abs() < 0.1),
            "spurious onset at {}s",
            event.timestamp
        );
    }
}

#[test]
fn test_spectral_flux_beats_follow_steady_clicks() {
    let clicks: Vec<f32> = (0..15).map(|i| 0.25 + i as f32 * 0.5).collect();
    let wave = click_track(22_050, 8.0, &clicks);
    let extractor = FeatureExtractor::new(Box::new(SpectralFluxDetector::new()));

    let (events, _) = extractor.extract(&wave, &PipelineConfig::default()).unwrap();
    assert!(events.len() >= 8, "too few beats: {:?}", events);
    assert!(events.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    for event in &events {
        assert!(
            clicks.iter().any(|c| (event.timestamp - *c as f64).abs() < 0.12),
            "beat at {}s is not on a click",
            event.timestamp
        );
    }
}
