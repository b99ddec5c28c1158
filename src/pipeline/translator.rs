//! Translation stage.
//!
//! Resolves the configured target language once at construction, then
//! translates each transcript with the primary engine when it can and the
//! fallback engine otherwise. Fallback errors are retried a bounded number
//! of times with no backoff; an item that exhausts its retries is dropped,
//! never blocking the queue.

use crate::config::LanguageTag;
use crate::defaults;
use crate::error::{LingoBridgeError, Result};
use crate::pipeline::control::CancellationToken;
use crate::pipeline::error::{ErrorReporter, StageError};
use crate::pipeline::types::{PipelineEvent, Transcript, Translation};
use crate::providers::{FallbackEngine, TranslationEngine};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

const STAGE_NAME: &str = "translator";

/// Target-language codes that differ between the config vocabulary and the
/// primary engine's vocabulary.
const TARGET_CODE_ALIASES: &[(&str, &str)] = &[("en", "en-us"), ("pt", "pt-br")];

/// Translator stage configuration.
#[derive(Debug, Clone)]
pub struct TranslatorConfig {
    /// Queue wait interval, doubling as the cancellation poll interval.
    pub poll: Duration,
    /// Retry bound for transient fallback errors.
    pub retry_limit: u32,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            poll: defaults::STAGE_POLL,
            retry_limit: defaults::FALLBACK_RETRY_LIMIT,
        }
    }
}

/// Apply the engine-vocabulary alias for a requested target code.
fn alias_code(code: &str) -> &str {
    TARGET_CODE_ALIASES
        .iter()
        .find(|(from, _)| *from == code)
        .map(|(_, to)| *to)
        .unwrap_or(code)
}

/// Find a tag matching the request by aliased code or by name,
/// case-insensitively.
fn find_tag<'a>(tags: &'a [LanguageTag], requested: &LanguageTag) -> Option<&'a LanguageTag> {
    let wanted_code = alias_code(&requested.code).to_lowercase();
    let wanted_name = requested.name.to_lowercase();
    tags.iter().find(|tag| {
        tag.code.to_lowercase() == wanted_code
            || tag.code.to_lowercase() == requested.code.to_lowercase()
            || tag.name.to_lowercase() == wanted_name
    })
}

/// Translation stage.
pub struct Translator {
    primary: Option<Arc<dyn TranslationEngine>>,
    fallback: Arc<dyn FallbackEngine>,
    target: LanguageTag,
    /// Target code in the primary engine's vocabulary, when it supports the
    /// target at all.
    primary_target: Option<String>,
    /// Target code in the fallback engine's vocabulary.
    fallback_target: Option<String>,
    transcripts: Receiver<Transcript>,
    synthesis: Sender<String>,
    events: Sender<PipelineEvent>,
    config: TranslatorConfig,
    token: CancellationToken,
    reporter: Arc<dyn ErrorReporter>,
}

impl Translator {
    /// Build the stage, resolving the target language against both engines.
    ///
    /// # Errors
    /// Returns `LingoBridgeError::UnsupportedLanguage` when neither engine
    /// can produce the requested target.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        primary: Option<Arc<dyn TranslationEngine>>,
        fallback: Arc<dyn FallbackEngine>,
        target: LanguageTag,
        transcripts: Receiver<Transcript>,
        synthesis: Sender<String>,
        events: Sender<PipelineEvent>,
        config: TranslatorConfig,
        token: CancellationToken,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Result<Self> {
        let primary_target = match &primary {
            Some(engine) => engine
                .target_languages()
                .ok()
                .and_then(|tags| find_tag(&tags, &target).map(|t| t.code.clone())),
            None => None,
        };

        let fallback_target = fallback
            .languages()
            .ok()
            .and_then(|tags| find_tag(&tags, &target).map(|t| t.code.clone()));

        if primary_target.is_none() && fallback_target.is_none() {
            return Err(LingoBridgeError::UnsupportedLanguage {
                language: target.to_string(),
            });
        }

        Ok(Self {
            primary,
            fallback,
            target,
            primary_target,
            fallback_target,
            transcripts,
            synthesis,
            events,
            config,
            token,
            reporter,
        })
    }

    /// Runs the translator until its token is cancelled.
    pub fn run(self) {
        loop {
            if self.token.is_cancelled() {
                break;
            }
            match self.transcripts.recv_timeout(self.config.poll) {
                Ok(transcript) => self.process(transcript),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn process(&self, transcript: Transcript) {
        let translated = match self.translate(&transcript.text, &transcript.language) {
            Some(translated) => translated,
            None => return,
        };

        let translation = Translation {
            recognized: transcript.text,
            translated: translated.clone(),
            source_language: transcript.language,
            target_language: self.target.clone(),
            started_at: transcript.started_at,
            finished_at: transcript.finished_at,
        };

        let _ = self.events.send(PipelineEvent::Translation(translation));
        let _ = self.synthesis.send(translated);
    }

    fn translate(&self, text: &str, source: &str) -> Option<String> {
        if let Some(target_code) = &self.primary_target
            && let Some(engine) = &self.primary
            && self.primary_handles_source(engine.as_ref(), source)
        {
            match engine.translate(text, target_code, source) {
                Ok(translated) => return Some(translated),
                Err(e) => {
                    self.reporter.report(
                        STAGE_NAME,
                        &StageError::Recoverable(format!(
                            "primary engine failed, using fallback: {}",
                            e
                        )),
                    );
                }
            }
        }

        self.translate_with_fallback(text, source)
    }

    fn primary_handles_source(&self, engine: &dyn TranslationEngine, source: &str) -> bool {
        engine
            .source_languages()
            .map(|tags| {
                tags.iter()
                    .any(|tag| tag.code.to_lowercase() == source.to_lowercase())
            })
            .unwrap_or(false)
    }

    fn translate_with_fallback(&self, text: &str, source: &str) -> Option<String> {
        let target_code = match &self.fallback_target {
            Some(code) => code,
            None => {
                self.reporter.report(
                    STAGE_NAME,
                    &StageError::Recoverable(format!(
                        "fallback engine does not support {}; dropping item",
                        self.target
                    )),
                );
                return None;
            }
        };

        let mut last_error = None;
        for _ in 0..self.config.retry_limit {
            match self.fallback.translate(text, target_code, source) {
                Ok(translated) => return Some(translated),
                Err(e) => last_error = Some(e),
            }
        }

        self.reporter.report(
            STAGE_NAME,
            &StageError::Recoverable(format!(
                "fallback translation failed after {} attempts: {}",
                self.config.retry_limit,
                last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no attempts made".to_string()),
            )),
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::error::CollectingReporter;
    use crate::providers::{MockFallbackEngine, MockTranslationEngine};
    use crossbeam_channel::unbounded;
    use std::sync::atomic::Ordering;
    use std::thread;
    use std::time::Instant;

    fn fast_config() -> TranslatorConfig {
        TranslatorConfig {
            poll: Duration::from_millis(5),
            retry_limit: defaults::FALLBACK_RETRY_LIMIT,
        }
    }

    fn transcript(text: &str, language: &str) -> Transcript {
        let now = Instant::now();
        Transcript {
            text: text.to_string(),
            language: language.to_string(),
            started_at: now,
            finished_at: now,
        }
    }

    struct Harness {
        transcripts: Sender<Transcript>,
        synthesis: Receiver<String>,
        events: Receiver<PipelineEvent>,
        token: CancellationToken,
        reporter: CollectingReporter,
        thread: thread::JoinHandle<()>,
    }

    fn spawn_translator(
        primary: Option<MockTranslationEngine>,
        fallback: MockFallbackEngine,
        target: LanguageTag,
    ) -> Harness {
        let (tx, rx) = unbounded();
        let (synth_tx, synth_rx) = unbounded();
        let (events_tx, events_rx) = unbounded();
        let token = CancellationToken::new();
        let reporter = CollectingReporter::new();

        let translator = Translator::new(
            primary.map(|p| Arc::new(p) as Arc<dyn TranslationEngine>),
            Arc::new(fallback),
            target,
            rx,
            synth_tx,
            events_tx,
            fast_config(),
            token.clone(),
            Arc::new(reporter.clone()),
        )
        .unwrap();
        let thread = thread::spawn(move || translator.run());

        Harness {
            transcripts: tx,
            synthesis: synth_rx,
            events: events_rx,
            token,
            reporter,
            thread,
        }
    }

    fn shutdown(harness: Harness) {
        harness.token.cancel();
        harness.thread.join().unwrap();
    }

    #[test]
    fn test_alias_resolution() {
        assert_eq!(alias_code("en"), "en-us");
        assert_eq!(alias_code("pt"), "pt-br");
        assert_eq!(alias_code("fr"), "fr");
    }

    #[test]
    fn test_construction_fails_when_no_engine_supports_target() {
        let (_, rx) = unbounded();
        let (synth_tx, _) = unbounded();
        let (events_tx, _) = unbounded();

        let result = Translator::new(
            Some(Arc::new(
                MockTranslationEngine::new().with_target_language("german", "de"),
            )),
            Arc::new(MockFallbackEngine::new().with_language("german", "de")),
            LanguageTag::new("klingon", "tlh"),
            rx,
            synth_tx,
            events_tx,
            fast_config(),
            CancellationToken::new(),
            Arc::new(CollectingReporter::new()),
        );

        match result {
            Err(LingoBridgeError::UnsupportedLanguage { language }) => {
                assert_eq!(language, "klingon - tlh");
            }
            _ => panic!("Expected UnsupportedLanguage error"),
        }
    }

    #[test]
    fn test_english_target_resolves_to_en_us_on_primary() {
        let primary = MockTranslationEngine::new()
            .with_target_language("american english", "en-us")
            .with_source_language("french", "fr")
            .with_response("Bonjour", "Hello");
        let fallback = MockFallbackEngine::new();

        let harness = spawn_translator(
            Some(primary),
            fallback,
            LanguageTag::new("english", "en"),
        );

        harness.transcripts.send(transcript("Bonjour", "fr")).unwrap();
        let translated = harness
            .synthesis
            .recv_timeout(Duration::from_secs(2))
            .unwrap();
        assert_eq!(translated, "Hello");
        shutdown(harness);
    }

    #[test]
    fn test_unknown_source_language_routes_to_fallback() {
        let primary = MockTranslationEngine::new()
            .with_target_language("french", "fr")
            .with_source_language("english", "en");
        let primary_counter = primary.call_counter();

        let fallback = MockFallbackEngine::new()
            .with_language("french", "fr")
            .with_response("Hallo", "Salut");

        let harness =
            spawn_translator(Some(primary), fallback, LanguageTag::new("french", "fr"));

        // German is not in the primary's source list.
        harness.transcripts.send(transcript("Hallo", "de")).unwrap();
        let translated = harness
            .synthesis
            .recv_timeout(Duration::from_secs(2))
            .unwrap();
        assert_eq!(translated, "Salut");
        assert_eq!(primary_counter.load(Ordering::SeqCst), 0);
        shutdown(harness);
    }

    #[test]
    fn test_primary_error_falls_back() {
        let primary = MockTranslationEngine::new()
            .with_target_language("french", "fr")
            .with_source_language("english", "en")
            .with_transient_failures(100);
        let fallback = MockFallbackEngine::new()
            .with_language("french", "fr")
            .with_response("Hello", "Bonjour");

        let harness =
            spawn_translator(Some(primary), fallback, LanguageTag::new("french", "fr"));

        harness.transcripts.send(transcript("Hello", "en")).unwrap();
        let translated = harness
            .synthesis
            .recv_timeout(Duration::from_secs(2))
            .unwrap();
        assert_eq!(translated, "Bonjour");
        assert!(!harness.reporter.is_empty());
        shutdown(harness);
    }

    #[test]
    fn test_fallback_retries_transient_errors() {
        let fallback = MockFallbackEngine::new()
            .with_language("french", "fr")
            .with_transient_failures(9)
            .with_response("Hi", "Salut");
        let counter = fallback.call_counter();

        let harness = spawn_translator(None, fallback, LanguageTag::new("french", "fr"));

        harness.transcripts.send(transcript("Hi", "en")).unwrap();
        let translated = harness
            .synthesis
            .recv_timeout(Duration::from_secs(2))
            .unwrap();
        assert_eq!(translated, "Salut");
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        shutdown(harness);
    }

    #[test]
    fn test_retry_exhaustion_drops_item_and_continues() {
        let fallback = MockFallbackEngine::new()
            .with_language("french", "fr")
            .with_transient_failures(10)
            .with_response("second", "deuxième");

        let harness = spawn_translator(None, fallback, LanguageTag::new("french", "fr"));

        harness.transcripts.send(transcript("first", "en")).unwrap();
        harness.transcripts.send(transcript("second", "en")).unwrap();

        // First item burns all 10 retries and is dropped; second succeeds.
        let translated = harness
            .synthesis
            .recv_timeout(Duration::from_secs(2))
            .unwrap();
        assert_eq!(translated, "deuxième");
        assert!(harness.synthesis.try_recv().is_err());

        let reports = harness.reporter.reports();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].1.to_string().contains("after 10 attempts"));
        shutdown(harness);
    }

    #[test]
    fn test_translation_event_emitted() {
        let fallback = MockFallbackEngine::new()
            .with_language("french", "fr")
            .with_response("Hello there", "Bonjour");

        let harness = spawn_translator(None, fallback, LanguageTag::new("french", "fr"));

        harness
            .transcripts
            .send(transcript("Hello there", "en"))
            .unwrap();

        match harness.events.recv_timeout(Duration::from_secs(2)).unwrap() {
            PipelineEvent::Translation(t) => {
                assert_eq!(t.recognized, "Hello there");
                assert_eq!(t.translated, "Bonjour");
                assert_eq!(t.source_language, "en");
                assert_eq!(t.target_language.code, "fr");
            }
            other => panic!("Expected translation event, got {:?}", other),
        }
        shutdown(harness);
    }
}
