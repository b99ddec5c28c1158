//! Messages exchanged between pipeline stages.

use crate::config::LanguageTag;
use crossbeam_channel::Sender;
use std::fmt;
use std::time::Instant;

/// One captured utterance, in flight from the detector to the shared
/// recognizer.
///
/// Carries its own reply route so the recognizer can serve both conversation
/// directions without knowing which one an utterance belongs to.
pub struct Utterance {
    /// WAV-encoded 16kHz mono audio.
    pub wav: Vec<u8>,
    /// When capture of this utterance ended.
    pub captured_at: Instant,
    /// Where the transcription result goes.
    pub reply: Sender<Transcript>,
    /// Raw audio copy for voice-clone accumulation, when cloning is active.
    pub clone_feed: Option<Sender<CloneMessage>>,
}

impl fmt::Debug for Utterance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Utterance")
            .field("wav_bytes", &self.wav.len())
            .field("captured_at", &self.captured_at)
            .field("clone_feed", &self.clone_feed.is_some())
            .finish()
    }
}

/// A recognized utterance, after filtering.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub text: String,
    /// Detected source language code.
    pub language: String,
    /// When the speaker started talking (capture end minus audio duration).
    pub started_at: Instant,
    /// When capture of the utterance ended.
    pub finished_at: Instant,
}

/// A translated transcript, ready for synthesis and for the embedder.
#[derive(Debug, Clone)]
pub struct Translation {
    pub recognized: String,
    pub translated: String,
    pub source_language: String,
    pub target_language: LanguageTag,
    pub started_at: Instant,
    pub finished_at: Instant,
}

/// Messages on the voice-clone feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloneMessage {
    /// One raw WAV-encoded utterance for clone training.
    Audio(Vec<u8>),
    /// Accumulation is over; no further audio will be accepted.
    DataComplete,
}

/// Progress of the voice-clone side pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum CloneProgress {
    /// Still gathering cleaned audio; total seconds collected so far.
    Collecting { seconds: f64 },
    /// Enough audio gathered; building the voice.
    Processing,
    /// The cloned voice is ready.
    Complete { voice_id: String },
}

impl fmt::Display for CloneProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloneProgress::Collecting { seconds } => write!(f, "COLLECTING {:.1}s", seconds),
            CloneProgress::Processing => write!(f, "PROCESSING"),
            CloneProgress::Complete { voice_id } => write!(f, "COMPLETE {}", voice_id),
        }
    }
}

/// Outbound events the embedder subscribes to.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A translation finished and was queued for synthesis.
    Translation(Translation),
    /// The clone side pipeline advanced.
    CloneProgress(CloneProgress),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_clone_progress_display() {
        assert_eq!(
            CloneProgress::Collecting { seconds: 42.0 }.to_string(),
            "COLLECTING 42.0s"
        );
        assert_eq!(CloneProgress::Processing.to_string(), "PROCESSING");
        assert_eq!(
            CloneProgress::Complete {
                voice_id: "v1".to_string()
            }
            .to_string(),
            "COMPLETE v1"
        );
    }

    #[test]
    fn test_utterance_debug_hides_audio_payload() {
        let (reply, _rx) = unbounded();
        let utterance = Utterance {
            wav: vec![0u8; 1024],
            captured_at: Instant::now(),
            reply,
            clone_feed: None,
        };
        let debug = format!("{:?}", utterance);
        assert!(debug.contains("wav_bytes: 1024"));
        assert!(!debug.contains("[0, 0"));
    }

    #[test]
    fn test_clone_message_equality() {
        assert_eq!(CloneMessage::DataComplete, CloneMessage::DataComplete);
        assert_ne!(
            CloneMessage::Audio(vec![1]),
            CloneMessage::Audio(vec![2])
        );
    }
}
