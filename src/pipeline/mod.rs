//! Speech interpretation pipeline.
//!
//! Each stage runs in its own thread, connected by crossbeam channels. The
//! detector captures utterances, a shared recognizer transcribes them, the
//! translator rewrites them in the target language and the synthesizer
//! speaks the result in arrival order. An optional cloner collects the
//! speaker's audio on the side until a cloned voice can take over.

pub mod cloner;
pub mod control;
pub mod detector;
pub mod error;
pub mod interpreter;
pub mod recognizer;
pub mod synthesizer;
pub mod translator;
pub mod types;

pub use cloner::{Cloner, ClonerConfig};
pub use control::{CancellationToken, PauseGate};
pub use detector::{Detector, DetectorConfig};
pub use error::{CollectingReporter, ErrorReporter, LogReporter, StageError};
pub use interpreter::{Interpreter, InterpreterConfig, InterpreterEngines};
pub use recognizer::{RecognizerConfig, RecognizerHandle, RecognizerRegistry};
pub use synthesizer::{Synthesizer, SynthesizerConfig, VoiceSelector};
pub use translator::{Translator, TranslatorConfig};
pub use types::{
    CloneMessage, CloneProgress, PipelineEvent, Transcript, Translation, Utterance,
};
