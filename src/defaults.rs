//! Default configuration constants for lingobridge.
//!
//! This module provides shared constants used across the pipeline stages
//! to ensure consistency and eliminate duplication.

use std::time::Duration;

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and provides a good balance
/// between quality and computational efficiency for voice applications.
pub const SAMPLE_RATE: u32 = 16000;

/// Poll interval for stage queue waits.
///
/// All stage loops block on `recv_timeout` with this interval. The timeout is
/// the cancellation poll point: worst-case shutdown latency per stage equals
/// this value.
pub const STAGE_POLL: Duration = Duration::from_secs(10);

/// How long the detector waits for speech to start before looping again.
///
/// A listen timeout is not an error; it is the detector's cancellation poll
/// point.
pub const LISTEN_TIMEOUT: Duration = Duration::from_secs(20);

/// Hard per-utterance capture cap.
///
/// Bounds pathological continuous-noise cases where background noise is
/// detected as unending speech.
pub const MAX_UTTERANCE: Duration = Duration::from_secs(60);

/// Interval at which the detector polls its audio source for new samples.
pub const CAPTURE_POLL: Duration = Duration::from_millis(16);

/// Default capture energy threshold, in raw 16-bit PCM RMS units.
pub const ENERGY_THRESHOLD: i32 = 300;

/// Multiplier applied to the measured ambient level during calibration
/// when the dynamic energy threshold is enabled.
pub const AMBIENT_ENERGY_RATIO: f32 = 1.5;

/// Duration of audio sampled for ambient-noise calibration.
pub const CALIBRATION_WINDOW: Duration = Duration::from_secs(1);

/// Default pause length (seconds) that ends an utterance.
pub const PAUSE_THRESHOLD_SECS: f32 = 0.8;

/// Segments whose non-speech probability exceeds this are dropped before
/// the recognized text is assembled.
pub const NON_SPEECH_PROB_MAX: f32 = 0.70;

/// Known spurious filler phrases produced by speech models on silence.
///
/// A transcription matching one of these (case-insensitively, within
/// [`HALLUCINATION_LENGTH_SLACK`] of the phrase length) is discarded.
pub const HALLUCINATION_PHRASES: &[&str] = &[
    "thank you for watching",
    "thanks for watching",
    "thank you so much for watching",
    "please subscribe to the channel",
];

/// Length tolerance for hallucination phrase matching, in characters.
pub const HALLUCINATION_LENGTH_SLACK: usize = 5;

/// Retry bound for transient fallback-translation errors.
///
/// No backoff between attempts; kept here so it can be tuned in one place.
pub const FALLBACK_RETRY_LIMIT: u32 = 10;

/// Total cleaned-audio duration required before a voice clone is built.
pub const CLONE_REQUIRED_SECS: f64 = 180.0;

/// Size ceiling for a single encoded clone-sample chunk, in bytes.
pub const CLONE_CHUNK_SIZE_LIMIT: usize = 9 * 1024 * 1024;

/// Silence padding appended after each clone segment, in milliseconds.
pub const CLONE_SILENCE_PAD_MS: u32 = 500;

/// Loudness target for clone-sample normalization, in dBFS.
pub const CLONE_TARGET_DBFS: f32 = -20.0;
