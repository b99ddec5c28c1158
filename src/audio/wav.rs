//! WAV codec helpers and loudness utilities.
//!
//! Utterances travel between stages as WAV-encoded bytes; the cloner also
//! needs loudness normalization and silence padding for its sample chunks.

use crate::defaults::SAMPLE_RATE;
use crate::error::{LingoBridgeError, Result};
use std::io::Cursor;

/// Encode 16-bit PCM mono samples as WAV bytes.
pub fn encode(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(|e| {
            LingoBridgeError::AudioEncoding {
                message: format!("Failed to create WAV writer: {}", e),
            }
        })?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| LingoBridgeError::AudioEncoding {
                    message: format!("Failed to write WAV sample: {}", e),
                })?;
        }
        writer
            .finalize()
            .map_err(|e| LingoBridgeError::AudioEncoding {
                message: format!("Failed to finalize WAV data: {}", e),
            })?;
    }
    Ok(cursor.into_inner())
}

/// Decode WAV bytes into mono 16-bit PCM samples plus the source sample rate.
///
/// Stereo input is mixed down by channel averaging.
pub fn decode(bytes: &[u8]) -> Result<(Vec<i16>, u32)> {
    let mut reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| LingoBridgeError::AudioEncoding {
            message: format!("Failed to parse WAV data: {}", e),
        })?;

    let spec = reader.spec();
    let channels = spec.channels as usize;

    let raw: Vec<i16> = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| LingoBridgeError::AudioEncoding {
            message: format!("Failed to read WAV samples: {}", e),
        })?;

    let mono = if channels <= 1 {
        raw
    } else {
        raw.chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .collect()
    };

    Ok((mono, spec.sample_rate))
}

/// Duration in seconds of a mono sample buffer at the given rate.
pub fn duration_secs(sample_count: usize, sample_rate: u32) -> f64 {
    sample_count as f64 / sample_rate as f64
}

/// Predicted encoded size in bytes of a mono 16-bit WAV with this many samples.
///
/// 44-byte canonical header plus two bytes per sample. Used for the clone
/// chunk size cap without actually encoding each candidate.
pub fn encoded_size(sample_count: usize) -> usize {
    44 + sample_count * 2
}

/// A buffer of silence of the given length.
pub fn silence(ms: u32, sample_rate: u32) -> Vec<i16> {
    vec![0i16; (sample_rate as u64 * ms as u64 / 1000) as usize]
}

/// Peak-referenced loudness of a sample buffer, in dBFS.
///
/// Returns negative infinity for pure silence.
pub fn rms_dbfs(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return f32::NEG_INFINITY;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&sample| {
            let normalized = sample as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();

    let mean_square = sum_squares / samples.len() as f64;
    if mean_square <= 0.0 {
        return f32::NEG_INFINITY;
    }
    (10.0 * mean_square.log10()) as f32
}

/// Apply a gain in dB to a sample buffer, clamping at full scale.
pub fn apply_gain(samples: &[i16], gain_db: f32) -> Vec<i16> {
    let factor = 10f32.powf(gain_db / 20.0);
    samples
        .iter()
        .map(|&s| {
            let scaled = s as f32 * factor;
            scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
        })
        .collect()
}

/// Normalize a buffer so its RMS loudness sits at `target_dbfs`.
///
/// Silence is returned unchanged: there is no level to move.
pub fn normalize_to_dbfs(samples: &[i16], target_dbfs: f32) -> Vec<i16> {
    let current = rms_dbfs(samples);
    if current == f32::NEG_INFINITY {
        return samples.to_vec();
    }
    apply_gain(samples, target_dbfs - current)
}

/// Simple linear interpolation resampling.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let src_pos = i as f64 * ratio;
            let idx = src_pos as usize;
            let frac = src_pos - idx as f64;

            if idx + 1 < samples.len() {
                let a = samples[idx] as f64;
                let b = samples[idx + 1] as f64;
                (a + (b - a) * frac) as i16
            } else {
                samples[samples.len() - 1]
            }
        })
        .collect()
}

/// Decode WAV bytes to 16kHz mono samples, resampling if needed.
pub fn decode_to_pipeline_rate(bytes: &[u8]) -> Result<Vec<i16>> {
    let (samples, rate) = decode(bytes)?;
    if rate == SAMPLE_RATE {
        Ok(samples)
    } else {
        Ok(resample(&samples, rate, SAMPLE_RATE))
    }
}
