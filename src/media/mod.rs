// Media loader - mono PCM waveform from an audio or video file
//
// Audio containers are decoded in-process (hound for WAV, symphonia for the
// rest). Video containers go through an external demuxer that writes the
// audio track to a scoped temporary WAV, which is removed before `load`
// returns whether or not decoding succeeded.

use std::path::Path;

use crate::error::PipelineError;

pub mod decode;
pub mod demux;
pub mod resample;

pub use demux::{AudioDemuxer, FfmpegDemuxer};

const AUDIO_EXTENSIONS: &[&str] = &[
    "wav", "mp3", "flac", "m4a", "ogg", "oga", "aac", "aif", "aiff", "wma", "opus",
];
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg",
];

/// Mono PCM samples at a known rate
///
/// Owned by the loader until handed to the feature extractor; there are no
/// mutating accessors, so the samples stay immutable for the rest of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// True for empty or all-zero input
    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|s| *s == 0.0 || !s.is_finite())
    }
}

/// Container family, decided by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Audio)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

/// Loads any supported input as a mono waveform at the analysis rate
pub struct MediaLoader {
    demuxer: Box<dyn AudioDemuxer>,
}

impl MediaLoader {
    pub fn new() -> Self {
        Self::with_demuxer(Box::new(FfmpegDemuxer::default()))
    }

    pub fn with_demuxer(demuxer: Box<dyn AudioDemuxer>) -> Self {
        Self { demuxer }
    }

    /// Decode `path` and resample it to `target_sample_rate`
    pub fn load(&self, path: &Path, target_sample_rate: u32) -> Result<Waveform, PipelineError> {
        if !path.is_file() {
            return Err(PipelineError::io(
                format!("reading {}", path.display()),
                "file does not exist",
            ));
        }

        let kind = MediaKind::from_path(path)
            .ok_or_else(|| PipelineError::unsupported(path, "unrecognized file extension"))?;

        let (samples, source_rate) = match kind {
            MediaKind::Audio => decode::decode_audio(path)?,
            MediaKind::Video => self.load_video_audio(path, target_sample_rate)?,
        };

        tracing::info!(
            "[MediaLoader] Decoded {} samples at {}Hz from {:?} ({:?})",
            samples.len(),
            source_rate,
            path,
            kind
        );

        let samples = resample::resample_linear(samples, source_rate, target_sample_rate);
        Ok(Waveform::new(samples, target_sample_rate))
    }

    fn load_video_audio(
        &self,
        path: &Path,
        target_sample_rate: u32,
    ) -> Result<(Vec<f32>, u32), PipelineError> {
        if !self.demuxer.has_audio_track(path)? {
            return Err(PipelineError::no_audio_track(path));
        }

        // Removed on drop, including every early return below
        let scratch = tempfile::Builder::new()
            .prefix("beat_funscript-")
            .suffix(".wav")
            .tempfile()
            .map_err(|err| PipelineError::io("creating temporary audio file", err))?;

        tracing::debug!(
            "[MediaLoader] Extracting audio track of {:?} into {:?}",
            path,
            scratch.path()
        );
        self.demuxer
            .extract_audio(path, scratch.path(), target_sample_rate)?;

        decode::decode_wav(scratch.path())
    }
}

impl Default for MediaLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &sample in samples {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }

    /// Demuxer double that writes a fixed WAV and remembers the scratch path
    struct RecordingDemuxer {
        has_audio: bool,
        fail_after_write: bool,
        seen: Mutex<Option<PathBuf>>,
    }

    impl RecordingDemuxer {
        fn new(has_audio: bool, fail_after_write: bool) -> Self {
            Self {
                has_audio,
                fail_after_write,
                seen: Mutex::new(None),
            }
        }
    }

    impl AudioDemuxer for RecordingDemuxer {
        fn has_audio_track(&self, _video: &Path) -> Result<bool, PipelineError> {
            Ok(self.has_audio)
        }

        fn extract_audio(
            &self,
            _video: &Path,
            destination: &Path,
            sample_rate: u32,
        ) -> Result<(), PipelineError> {
            write_wav(destination, sample_rate, 1, &[0, 1000, -1000, 500]);
            *self.seen.lock().unwrap() = Some(destination.to_path_buf());
            if self.fail_after_write {
                Err(PipelineError::unsupported(destination, "simulated demux failure"))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_media_kind_from_extension() {
        assert_eq!(MediaKind::from_path(Path::new("a.WAV")), Some(MediaKind::Audio));
        assert_eq!(MediaKind::from_path(Path::new("a.mp3")), Some(MediaKind::Audio));
        assert_eq!(MediaKind::from_path(Path::new("a.mkv")), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_path(Path::new("a.txt")), None);
        assert_eq!(MediaKind::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_waveform_duration_and_silence() {
        let wave = Waveform::new(vec![0.0; 22_050], 22_050);
        assert!((wave.duration_secs() - 1.0).abs() < 1e-9);
        assert!(wave.is_silent());

        let wave = Waveform::new(vec![0.0, 0.2, 0.0], 22_050);
        assert!(!wave.is_silent());
    }

    #[test]
    fn test_load_wav_resamples_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<i16> = (0..44_100).map(|i| ((i % 100) as i16 - 50) * 100).collect();
        write_wav(&path, 44_100, 1, &samples);

        let wave = MediaLoader::new().load(&path, 22_050).unwrap();
        assert_eq!(wave.sample_rate(), 22_050);
        assert!((wave.len() as i64 - 22_050).abs() <= 1);
    }

    #[test]
    fn test_load_stereo_wav_mixes_to_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav(&path, 8_000, 2, &[1000, 3000, -2000, 2000]);

        let wave = MediaLoader::new().load(&path, 8_000).unwrap();
        assert_eq!(wave.len(), 2);
        assert!((wave.samples()[0] - 2000.0 / 32767.0).abs() < 1e-4);
        assert!(wave.samples()[1].abs() < 1e-6);
    }

    #[test]
    fn test_unknown_extension_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        match MediaLoader::new().load(&path, 22_050) {
            Err(PipelineError::UnsupportedFormat { .. }) => {}
            other => panic!("Expected UnsupportedFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_audio_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mp3");
        std::fs::write(&path, b"this is not an mp3 stream at all").unwrap();

        match MediaLoader::new().load(&path, 22_050) {
            Err(PipelineError::UnsupportedFormat { .. }) => {}
            other => panic!("Expected UnsupportedFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        match MediaLoader::new().load(Path::new("/no/such/input.wav"), 22_050) {
            Err(PipelineError::Io { .. }) => {}
            other => panic!("Expected Io, got {:?}", other),
        }
    }

    #[test]
    fn test_video_without_audio_track() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silent.mp4");
        std::fs::write(&path, b"fake").unwrap();

        let loader = MediaLoader::with_demuxer(Box::new(RecordingDemuxer::new(false, false)));
        match loader.load(&path, 22_050) {
            Err(PipelineError::NoAudioTrack { .. }) => {}
            other => panic!("Expected NoAudioTrack, got {:?}", other),
        }
    }

    #[test]
    fn test_video_scratch_file_removed_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"fake").unwrap();

        let demuxer = std::sync::Arc::new(RecordingDemuxer::new(true, false));
        let loader = MediaLoader::with_demuxer(Box::new(SharedDemuxer(demuxer.clone())));
        let wave = loader.load(&path, 8_000).unwrap();
        assert_eq!(wave.len(), 4);

        let scratch = demuxer.seen.lock().unwrap().clone().unwrap();
        assert!(!scratch.exists(), "scratch WAV should be deleted");
    }

    #[test]
    fn test_video_scratch_file_removed_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mov");
        std::fs::write(&path, b"fake").unwrap();

        let demuxer = std::sync::Arc::new(RecordingDemuxer::new(true, true));
        let loader = MediaLoader::with_demuxer(Box::new(SharedDemuxer(demuxer.clone())));
        assert!(loader.load(&path, 8_000).is_err());

        let scratch = demuxer.seen.lock().unwrap().clone().unwrap();
        assert!(!scratch.exists(), "scratch WAV should be deleted after failure");
    }

    struct SharedDemuxer(std::sync::Arc<RecordingDemuxer>);

    impl AudioDemuxer for SharedDemuxer {
        fn has_audio_track(&self, video: &Path) -> Result<bool, PipelineError> {
            self.0.has_audio_track(video)
        }

        fn extract_audio(
            &self,
            video: &Path,
            destination: &Path,
            sample_rate: u32,
        ) -> Result<(), PipelineError> {
            self.0.extract_audio(video, destination, sample_rate)
        }
    }
}
