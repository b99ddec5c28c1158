//! lingobridge - Real-time bidirectional speech interpretation
//!
//! Captures speech on two audio devices, transcribes it with a shared
//! recognizer, translates each utterance and speaks the result in the
//! listener's language, optionally through a clone of the speaker's voice.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod config;
pub mod defaults;
pub mod error;
pub mod pipeline;
pub mod providers;

// Core traits (source → transcribe → translate → speak)
pub use audio::recorder::AudioSource;
pub use providers::{
    Denoiser, FallbackEngine, SpeechService, Transcriber, TranslationEngine, VoiceCloneService,
};

// Pipeline
pub use pipeline::interpreter::{Interpreter, InterpreterConfig, InterpreterEngines};
pub use pipeline::recognizer::{RecognizerHandle, RecognizerRegistry};
pub use pipeline::types::{CloneProgress, PipelineEvent, Translation};

// Error handling
pub use error::{LingoBridgeError, Result};
pub use pipeline::error::{ErrorReporter, StageError};

// Config
pub use config::{Config, LanguageTag};

/// Build version string with optional git commit hash.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }
}
