// Pipeline error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;
use std::path::Path;

/// Pipeline error code constants
///
/// Single source of truth for the numeric codes reported by the CLI
/// and consumed by front ends.
///
/// Error code range: 3001-3006
pub struct PipelineErrorCodes {}

impl PipelineErrorCodes {
    /// Neither decode path recognizes the container
    pub const UNSUPPORTED_FORMAT: i32 = 3001;

    /// Video container carries no audio stream
    pub const NO_AUDIO_TRACK: i32 = 3002;

    /// Waveform has no detectable energy
    pub const EMPTY_AUDIO: i32 = 3003;

    /// Read or write failure
    pub const IO: i32 = 3004;

    /// Run was cancelled by the caller
    pub const CANCELLED: i32 = 3005;

    /// Threshold, range or detector parameter out of bounds
    pub const INVALID_CONFIG: i32 = 3006;
}

/// Log a pipeline error with structured context
///
/// Emits error_code, component and message fields in one line so the
/// log stays greppable next to the stage that failed.
pub fn log_pipeline_error(err: &PipelineError, context: &str) {
    error!(
        "Pipeline error in {}: code={}, component=Pipeline, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors produced by the beat-to-script pipeline
///
/// Loader and writer errors are surfaced immediately and never retried:
/// they describe input the user has to fix, not transient faults.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Container not recognized by any decoder
    UnsupportedFormat { path: String, reason: String },

    /// Video file without an audio stream
    NoAudioTrack { path: String },

    /// Silence or all-zero signal
    EmptyAudio,

    /// Read or write failure
    Io { operation: String, details: String },

    /// Run was cancelled at a stage boundary
    Cancelled,

    /// Caller supplied an out-of-bounds parameter
    InvalidConfig { field: String, reason: String },
}

impl PipelineError {
    pub fn unsupported(path: &Path, reason: impl Into<String>) -> Self {
        PipelineError::UnsupportedFormat {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }

    pub fn no_audio_track(path: &Path) -> Self {
        PipelineError::NoAudioTrack {
            path: path.display().to_string(),
        }
    }

    pub fn io(operation: impl Into<String>, err: impl fmt::Display) -> Self {
        PipelineError::Io {
            operation: operation.into(),
            details: err.to_string(),
        }
    }

    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Short, user-facing remediation for error dialogs and CLI output
    pub fn remediation_hint(&self) -> &'static str {
        match self {
            PipelineError::UnsupportedFormat { .. } => {
                "Use a WAV/MP3/FLAC/OGG audio file, or install video decoding support (ffmpeg) for video input"
            }
            PipelineError::NoAudioTrack { .. } => {
                "Choose a video that contains an audio track"
            }
            PipelineError::EmptyAudio => "The input is silent; pick a file with audible content",
            PipelineError::Io { .. } => "Check that the paths exist and are readable/writable",
            PipelineError::Cancelled => "Run cancelled; no script was written",
            PipelineError::InvalidConfig { .. } => {
                "Thresholds must be within 0..1 and range within 1..100"
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}

impl ErrorCode for PipelineError {
    fn code(&self) -> i32 {
        match self {
            PipelineError::UnsupportedFormat { .. } => PipelineErrorCodes::UNSUPPORTED_FORMAT,
            PipelineError::NoAudioTrack { .. } => PipelineErrorCodes::NO_AUDIO_TRACK,
            PipelineError::EmptyAudio => PipelineErrorCodes::EMPTY_AUDIO,
            PipelineError::Io { .. } => PipelineErrorCodes::IO,
            PipelineError::Cancelled => PipelineErrorCodes::CANCELLED,
            PipelineError::InvalidConfig { .. } => PipelineErrorCodes::INVALID_CONFIG,
        }
    }

    fn message(&self) -> String {
        match self {
            PipelineError::UnsupportedFormat { path, reason } => {
                format!("Unsupported media format for {}: {}", path, reason)
            }
            PipelineError::NoAudioTrack { path } => {
                format!("Video file has no audio track: {}", path)
            }
            PipelineError::EmptyAudio => "Audio contains no detectable energy".to_string(),
            PipelineError::Io { operation, details } => {
                format!("I/O error while {}: {}", operation, details)
            }
            PipelineError::Cancelled => "Pipeline run was cancelled".to_string(),
            PipelineError::InvalidConfig { field, reason } => {
                format!("Invalid configuration for {}: {}", field, reason)
            }
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message(), self.code())
    }
}

impl std::error::Error for PipelineError {}

/// Convert from std::io::Error to PipelineError
impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io {
            operation: "accessing file".to_string(),
            details: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_codes() {
        assert_eq!(
            PipelineError::unsupported(Path::new("a.xyz"), "unknown extension").code(),
            3001
        );
        assert_eq!(PipelineError::no_audio_track(Path::new("a.mp4")).code(), 3002);
        assert_eq!(PipelineError::EmptyAudio.code(), 3003);
        assert_eq!(PipelineError::io("reading", "boom").code(), 3004);
        assert_eq!(PipelineError::Cancelled.code(), 3005);
        assert_eq!(PipelineError::invalid_config("range", "0").code(), 3006);
    }

    #[test]
    fn test_pipeline_error_display() {
        let err = PipelineError::invalid_config("onset_threshold", "must be within 0..1");
        let text = err.to_string();
        assert!(text.contains("onset_threshold"));
        assert!(text.contains("3006"));

        let err = PipelineError::no_audio_track(Path::new("clip.mp4"));
        assert!(err.message().contains("clip.mp4"));
    }

    #[test]
    fn test_remediation_hint_mentions_video_support() {
        let err = PipelineError::unsupported(Path::new("movie.mkv"), "ffmpeg not found");
        assert!(err.remediation_hint().contains("video decoding support"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "test error");
        let err: PipelineError = io_err.into();

        match err {
            PipelineError::Io { details, .. } => {
                assert!(details.contains("test error"));
            }
            _ => panic!("Expected Io variant"),
        }
    }

    #[test]
    fn test_error_code_trait() {
        let err: &dyn ErrorCode = &PipelineError::Cancelled;
        assert_eq!(err.code(), PipelineErrorCodes::CANCELLED);
        assert!(PipelineError::Cancelled.is_cancelled());
        assert!(!PipelineError::EmptyAudio.is_cancelled());
    }
}
