// In-process audio decoding
//
// WAV goes through hound; every other audio container is probed and decoded
// by symphonia. Both paths return mono f32 samples at the source rate.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::PipelineError;

/// Decode any supported audio container to mono samples
pub fn decode_audio(path: &Path) -> Result<(Vec<f32>, u32), PipelineError> {
    let is_wav = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("wav"))
        .unwrap_or(false);

    if is_wav {
        decode_wav(path)
    } else {
        decode_with_symphonia(path)
    }
}

/// Decode a PCM WAV file, mixing all channels down to mono
pub fn decode_wav(path: &Path) -> Result<(Vec<f32>, u32), PipelineError> {
    let mut reader = hound::WavReader::open(path).map_err(|err| map_hound_error(path, err))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<f32>, _>>()
            .map_err(|err| map_hound_error(path, err))?,
        hound::SampleFormat::Int => {
            let max = ((1i64 << (spec.bits_per_sample - 1)) - 1) as f32;
            match spec.bits_per_sample {
                8 | 16 | 24 | 32 => reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|value| value as f32 / max))
                    .collect::<Result<Vec<f32>, _>>()
                    .map_err(|err| map_hound_error(path, err))?,
                other => {
                    return Err(PipelineError::unsupported(
                        path,
                        format!("unsupported bits per sample {}", other),
                    ))
                }
            }
        }
    };

    Ok((mix_to_mono(&interleaved, channels), spec.sample_rate))
}

fn map_hound_error(path: &Path, err: hound::Error) -> PipelineError {
    match err {
        hound::Error::IoError(io) => PipelineError::io(format!("reading {}", path.display()), io),
        other => PipelineError::unsupported(path, other.to_string()),
    }
}

/// Decode through symphonia's default probe and codec registry
pub fn decode_with_symphonia(path: &Path) -> Result<(Vec<f32>, u32), PipelineError> {
    let src = File::open(path)
        .map_err(|err| PipelineError::io(format!("opening {}", path.display()), err))?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| PipelineError::unsupported(path, err.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| PipelineError::unsupported(path, "no decodable audio track"))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| PipelineError::unsupported(path, "unknown sample rate"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| PipelineError::unsupported(path, err.to_string()))?;

    let mut mono = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => return Err(PipelineError::unsupported(path, err.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let channels = spec.channels.count().max(1);
                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                mono.extend(mix_to_mono(buffer.samples(), channels));
            }
            // Corrupted packets are skipped
            Err(SymphoniaError::DecodeError(reason)) => {
                tracing::debug!("[Decode] Skipping undecodable packet: {}", reason);
                continue;
            }
            Err(err) => return Err(PipelineError::unsupported(path, err.to_string())),
        }
    }

    Ok((mono, sample_rate))
}

/// Average interleaved frames into a single channel
pub fn mix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
