//! One interpretation direction, assembled end to end.
//!
//! An `Interpreter` wires a detector, a shared recognizer handle, a
//! translator and a synthesizer into one listening direction, with an
//! optional cloner hanging off the recognizer's accepted audio. Two
//! interpreters pointed at different devices and target languages form a
//! full bidirectional session.

use crate::audio::recorder::AudioSource;
use crate::config::LanguageTag;
use crate::error::Result;
use crate::pipeline::cloner::{Cloner, ClonerConfig};
use crate::pipeline::control::{CancellationToken, PauseGate};
use crate::pipeline::detector::{Detector, DetectorConfig};
use crate::pipeline::error::{ErrorReporter, LogReporter};
use crate::pipeline::recognizer::RecognizerHandle;
use crate::pipeline::synthesizer::{Synthesizer, SynthesizerConfig, VoiceSelector};
use crate::pipeline::translator::{Translator, TranslatorConfig};
use crate::pipeline::types::PipelineEvent;
use crate::providers::{
    Denoiser, FallbackEngine, SpeechService, TranslationEngine, VoiceCloneService,
};
use crossbeam_channel::{Receiver, unbounded};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Configuration for one interpretation direction.
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    pub detector: DetectorConfig,
    pub translator: TranslatorConfig,
    pub synthesizer: SynthesizerConfig,
    pub cloner: ClonerConfig,
    /// Language spoken audio is translated into.
    pub target_language: LanguageTag,
    /// Voice used for synthesis until a clone replaces it.
    pub voice_id: String,
    /// Collect the speaker's audio and swap in a cloned voice once ready.
    pub clone_enabled: bool,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            translator: TranslatorConfig::default(),
            synthesizer: SynthesizerConfig::default(),
            cloner: ClonerConfig::default(),
            target_language: LanguageTag::new("english", "en"),
            voice_id: "default".to_string(),
            clone_enabled: false,
        }
    }
}

/// External services one direction runs against.
pub struct InterpreterEngines {
    pub source: Box<dyn AudioSource>,
    pub recognizer: RecognizerHandle,
    pub primary: Option<Arc<dyn TranslationEngine>>,
    pub fallback: Arc<dyn FallbackEngine>,
    pub speech: Arc<dyn SpeechService>,
    pub clone_service: Option<Arc<dyn VoiceCloneService>>,
    pub denoiser: Option<Arc<dyn Denoiser>>,
}

/// A single interpretation direction.
///
/// Stages are wired at construction and spawned by
/// [`begin_interpretation`](Interpreter::begin_interpretation);
/// [`stop_interpretation`](Interpreter::stop_interpretation) cancels every
/// stage before joining any of them, so no stage waits on a peer that has
/// not been told to exit.
pub struct Interpreter {
    detector: Option<Detector>,
    translator: Option<Translator>,
    synthesizer: Option<Synthesizer>,
    cloner: Option<Cloner>,
    recognizer: Option<RecognizerHandle>,
    voice: VoiceSelector,
    events: Receiver<PipelineEvent>,
    detector_pause: PauseGate,
    synthesizer_pause: PauseGate,
    tokens: Vec<CancellationToken>,
    threads: Vec<JoinHandle<()>>,
}

impl Interpreter {
    pub fn new(config: InterpreterConfig, engines: InterpreterEngines) -> Result<Self> {
        Self::with_error_reporter(config, engines, Arc::new(LogReporter))
    }

    pub fn with_error_reporter(
        config: InterpreterConfig,
        engines: InterpreterEngines,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Result<Self> {
        let (transcript_tx, transcript_rx) = unbounded();
        let (text_tx, text_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();

        let detector_pause = PauseGate::new();
        let synthesizer_pause = PauseGate::new();
        let mut tokens = Vec::new();

        let clone_parts = match (config.clone_enabled, &engines.clone_service) {
            (true, Some(service)) => {
                let (feed_tx, feed_rx) = unbounded();
                Some((feed_tx, feed_rx, Arc::clone(service)))
            }
            _ => None,
        };

        let detector_token = CancellationToken::new();
        tokens.push(detector_token.clone());
        let detector = Detector::new(
            engines.source,
            engines.recognizer.queue(),
            transcript_tx,
            clone_parts.as_ref().map(|(feed_tx, _, _)| feed_tx.clone()),
            config.detector,
            detector_pause.clone(),
            detector_token,
            Arc::clone(&reporter),
        );

        let translator_token = CancellationToken::new();
        tokens.push(translator_token.clone());
        let translator = Translator::new(
            engines.primary,
            engines.fallback,
            config.target_language,
            transcript_rx,
            text_tx,
            event_tx.clone(),
            config.translator,
            translator_token,
            Arc::clone(&reporter),
        )?;

        let voice = VoiceSelector::new(&config.voice_id);
        let synthesizer_token = CancellationToken::new();
        tokens.push(synthesizer_token.clone());
        let synthesizer = Synthesizer::new(
            engines.speech,
            voice.clone(),
            text_rx,
            config.synthesizer,
            synthesizer_pause.clone(),
            synthesizer_token,
            Arc::clone(&reporter),
        );

        let cloner = clone_parts.map(|(feed_tx, feed_rx, service)| {
            let cloner_token = CancellationToken::new();
            tokens.push(cloner_token.clone());
            Cloner::new(
                feed_rx,
                feed_tx,
                service,
                engines.denoiser,
                event_tx,
                config.cloner,
                cloner_token,
                reporter,
            )
        });

        Ok(Self {
            detector: Some(detector),
            translator: Some(translator),
            synthesizer: Some(synthesizer),
            cloner,
            recognizer: Some(engines.recognizer),
            voice,
            events: event_rx,
            detector_pause,
            synthesizer_pause,
            tokens,
            threads: Vec::new(),
        })
    }

    /// Spawns every stage. Calling it again while running is a no-op.
    pub fn begin_interpretation(&mut self) {
        if let Some(detector) = self.detector.take() {
            self.threads.push(thread::spawn(move || detector.run()));
        }
        if let Some(translator) = self.translator.take() {
            self.threads.push(thread::spawn(move || translator.run()));
        }
        if let Some(synthesizer) = self.synthesizer.take() {
            self.threads.push(thread::spawn(move || synthesizer.run()));
        }
        if let Some(cloner) = self.cloner.take() {
            let voice = self.voice.clone();
            self.threads.push(thread::spawn(move || {
                if let Some(voice_id) = cloner.run() {
                    voice.set(&voice_id);
                }
            }));
        }
    }

    /// Cancels all stages, waits for them, then releases the shared
    /// recognizer.
    pub fn stop_interpretation(&mut self) {
        for token in &self.tokens {
            token.cancel();
        }
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        self.recognizer.take();
    }

    /// True between `begin_interpretation` and `stop_interpretation`.
    pub fn is_running(&self) -> bool {
        !self.threads.is_empty()
    }

    /// Stream of translation results and clone progress updates.
    pub fn events(&self) -> Receiver<PipelineEvent> {
        self.events.clone()
    }

    /// Voice used by this direction's synthesizer.
    pub fn voice_selector(&self) -> VoiceSelector {
        self.voice.clone()
    }

    pub fn set_detector_paused(&self, paused: bool) {
        self.detector_pause.set_paused(paused);
    }

    pub fn detector_paused(&self) -> bool {
        self.detector_pause.is_paused()
    }

    pub fn set_synthesizer_paused(&self, paused: bool) {
        self.synthesizer_pause.set_paused(paused);
    }

    pub fn synthesizer_paused(&self) -> bool {
        self.synthesizer_pause.is_paused()
    }
}
