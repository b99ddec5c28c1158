//! External service seams: transcription, translation, synthesis, cloning.
//!
//! Every network- or model-backed collaborator sits behind a trait here, with
//! a builder-style mock next to it. The pipeline never talks to a provider
//! except through these traits.

pub mod speech;
pub mod transcription;
pub mod translation;
pub mod voice;
pub mod whisper;

pub use speech::{MockSpeechService, PlaybackHooks, SpeechService, SynthesisRequest};
pub use transcription::{
    MockTranscriber, TranscribedAudio, TranscribedSegment, Transcriber,
};
pub use translation::{FallbackEngine, MockFallbackEngine, MockTranslationEngine, TranslationEngine};
pub use voice::{Denoiser, MockDenoiser, MockVoiceCloneService, VoiceCloneService, VoiceSample};
pub use whisper::{WhisperConfig, WhisperTranscriber};
