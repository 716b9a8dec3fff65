// Video demuxing through external ffprobe/ffmpeg executables

use std::io::ErrorKind;
use std::path::Path;
use std::process::{Command, Output};

use crate::error::PipelineError;

/// External collaborator that pulls the audio track out of a video container
pub trait AudioDemuxer: Send + Sync {
    /// Whether the container carries at least one audio stream
    fn has_audio_track(&self, video: &Path) -> Result<bool, PipelineError>;

    /// Write the first audio stream as a mono WAV at `sample_rate` to `destination`
    fn extract_audio(
        &self,
        video: &Path,
        destination: &Path,
        sample_rate: u32,
    ) -> Result<(), PipelineError>;
}

/// Demuxer backed by the `ffmpeg` and `ffprobe` command-line tools
#[derive(Debug, Clone)]
pub struct FfmpegDemuxer {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl FfmpegDemuxer {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    fn run(&self, program: &str, video: &Path, command: &mut Command) -> Result<Output, PipelineError> {
        command.output().map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                PipelineError::unsupported(
                    video,
                    format!("{} not found; install video decoding support (ffmpeg)", program),
                )
            } else {
                PipelineError::io(format!("running {}", program), err)
            }
        })
    }
}

impl Default for FfmpegDemuxer {
    /// Uses `FFMPEG` / `FFPROBE` from the environment, falling back to PATH lookup
    fn default() -> Self {
        Self::new(
            std::env::var("FFMPEG").unwrap_or_else(|_| "ffmpeg".to_string()),
            std::env::var("FFPROBE").unwrap_or_else(|_| "ffprobe".to_string()),
        )
    }
}

impl AudioDemuxer for FfmpegDemuxer {
    fn has_audio_track(&self, video: &Path) -> Result<bool, PipelineError> {
        let output = self.run(
            &self.ffprobe_path,
            video,
            Command::new(&self.ffprobe_path)
                .args([
                    "-v", "error",
                    "-select_streams", "a",
                    "-show_entries", "stream=index",
                    "-of", "json",
                ])
                .arg(video),
        )?;

        if !output.status.success() {
            return Err(PipelineError::unsupported(
                video,
                format!("ffprobe failed: {}", String::from_utf8_lossy(&output.stderr).trim()),
            ));
        }

        let json: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|err| PipelineError::unsupported(video, format!("ffprobe output: {}", err)))?;
        Ok(count_streams(&json) > 0)
    }

    fn extract_audio(
        &self,
        video: &Path,
        destination: &Path,
        sample_rate: u32,
    ) -> Result<(), PipelineError> {
        let output = self.run(
            &self.ffmpeg_path,
            video,
            Command::new(&self.ffmpeg_path)
                .args(["-v", "error", "-y", "-i"])
                .arg(video)
                .args(["-vn", "-ac", "1", "-ar"])
                .arg(sample_rate.to_string())
                .args(["-acodec", "pcm_s16le", "-f", "wav"])
                .arg(destination),
        )?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("does not contain any stream") {
                return Err(PipelineError::no_audio_track(video));
            }
            return Err(PipelineError::unsupported(
                video,
                format!("ffmpeg audio extraction failed: {}", stderr.trim()),
            ));
        }
        Ok(())
    }
}

fn count_streams(probe: &serde_json::Value) -> usize {
    probe["streams"].as_array().map(|s| s.len()).unwrap_or(0)
}
