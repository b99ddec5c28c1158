//! Speech-to-text provider trait.
//!
//! The shared recognizer consumes whole WAV-encoded utterances and expects
//! per-segment text with non-speech probabilities, so the hallucination and
//! silence filters can run on the caller's side of this seam.

use crate::error::{LingoBridgeError, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One recognized segment of an utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscribedSegment {
    pub text: String,
    /// Model-reported probability that this segment contains no speech.
    pub no_speech_prob: f32,
}

/// The full transcription of one utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscribedAudio {
    pub segments: Vec<TranscribedSegment>,
    /// Detected source language code (e.g. "en").
    pub language: String,
    /// Duration of the recognized audio.
    pub duration: Duration,
}

impl TranscribedAudio {
    /// A single-segment transcription with full speech confidence.
    pub fn of(text: &str, language: &str, duration: Duration) -> Self {
        Self {
            segments: vec![TranscribedSegment {
                text: text.to_string(),
                no_speech_prob: 0.0,
            }],
            language: language.to_string(),
            duration,
        }
    }
}

/// Trait for speech-to-text backends.
///
/// Implementations may run a local model or call a remote API; either way
/// they accept complete WAV bytes and return segment-level results.
pub trait Transcriber: Send + Sync {
    /// Transcribe one WAV-encoded utterance.
    fn transcribe(&self, wav_bytes: &[u8]) -> Result<TranscribedAudio>;

    /// Human-readable backend/model name, for error reporting.
    fn model_name(&self) -> &str;
}

/// Mock transcriber for testing.
///
/// Returns scripted results in order; when the script runs out, the last
/// result repeats. With no script at all, every call fails.
pub struct MockTranscriber {
    script: Mutex<VecDeque<TranscribedAudio>>,
    last: Mutex<Option<TranscribedAudio>>,
    should_fail: bool,
    error_message: String,
    calls: Arc<AtomicU64>,
}

impl MockTranscriber {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            should_fail: false,
            error_message: "mock transcription error".to_string(),
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Queue a single-segment result.
    pub fn with_result(self, text: &str, language: &str, duration: Duration) -> Self {
        self.with_transcription(TranscribedAudio::of(text, language, duration))
    }

    /// Queue a full transcription, segments and all.
    pub fn with_transcription(self, transcription: TranscribedAudio) -> Self {
        self.script.lock().unwrap().push_back(transcription);
        self
    }

    /// Make every call fail.
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Shared counter of transcribe calls.
    pub fn call_counter(&self) -> Arc<AtomicU64> {
        self.calls.clone()
    }
}

impl Default for MockTranscriber {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcriber for MockTranscriber {
    fn transcribe(&self, _wav_bytes: &[u8]) -> Result<TranscribedAudio> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.should_fail {
            return Err(LingoBridgeError::Transcription {
                message: self.error_message.clone(),
            });
        }

        if let Some(next) = self.script.lock().unwrap().pop_front() {
            *self.last.lock().unwrap() = Some(next.clone());
            return Ok(next);
        }

        self.last
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| LingoBridgeError::Transcription {
                message: "mock transcriber has no scripted results".to_string(),
            })
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}
