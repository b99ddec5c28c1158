//! Text translation provider traits.
//!
//! Two seams: a primary engine with separate source/target language lists
//! (keyed by code), and a fallback engine with one combined list. The
//! translator stage decides which to use per item; retry policy also lives
//! in the stage, not here.

use crate::config::LanguageTag;
use crate::error::{LingoBridgeError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Primary translation engine.
///
/// The engine advertises which source languages it can translate from and
/// which targets it can produce; the stage only routes an item here when
/// both ends match.
pub trait TranslationEngine: Send + Sync {
    /// Languages this engine can translate into.
    fn target_languages(&self) -> Result<Vec<LanguageTag>>;

    /// Languages this engine can translate from.
    fn source_languages(&self) -> Result<Vec<LanguageTag>>;

    /// Translate `text` from `source_code` into `target_code`.
    fn translate(&self, text: &str, target_code: &str, source_code: &str) -> Result<String>;
}

/// Fallback translation engine with a single supported-language list.
pub trait FallbackEngine: Send + Sync {
    /// All languages this engine supports, as both source and target.
    fn languages(&self) -> Result<Vec<LanguageTag>>;

    /// Translate `text` from `source_code` into `target_code`.
    fn translate(&self, text: &str, target_code: &str, source_code: &str) -> Result<String>;
}

/// Scripted behavior shared by the two translation mocks.
struct MockCore {
    languages: Vec<LanguageTag>,
    /// Input text → translated text. Unmapped inputs get a tagged echo.
    responses: HashMap<String, String>,
    /// How many leading calls fail before the mock starts succeeding.
    transient_failures: u64,
    calls: Arc<AtomicU64>,
}

impl MockCore {
    fn new() -> Self {
        Self {
            languages: Vec::new(),
            responses: HashMap::new(),
            transient_failures: 0,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    fn translate(&self, text: &str, target_code: &str) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.transient_failures {
            return Err(LingoBridgeError::Translation {
                message: format!("transient failure {} of {}", call + 1, self.transient_failures),
            });
        }

        Ok(self
            .responses
            .get(text)
            .cloned()
            .unwrap_or_else(|| format!("[{}] {}", target_code, text)))
    }
}

/// Mock primary engine for testing.
///
/// Translations come from a scripted input→output map; unmapped inputs are
/// echoed with the target code prefixed. Target and source lists are
/// configured independently.
pub struct MockTranslationEngine {
    core: MockCore,
    source_languages: Vec<LanguageTag>,
}

impl MockTranslationEngine {
    pub fn new() -> Self {
        Self {
            core: MockCore::new(),
            source_languages: Vec::new(),
        }
    }

    pub fn with_target_language(mut self, name: &str, code: &str) -> Self {
        self.core.languages.push(LanguageTag::new(name, code));
        self
    }

    pub fn with_source_language(mut self, name: &str, code: &str) -> Self {
        self.source_languages.push(LanguageTag::new(name, code));
        self
    }

    /// Script the translation of one exact input.
    pub fn with_response(mut self, input: &str, output: &str) -> Self {
        self.core
            .responses
            .insert(input.to_string(), output.to_string());
        self
    }

    /// Fail the first `count` translate calls, then succeed.
    pub fn with_transient_failures(mut self, count: u64) -> Self {
        self.core.transient_failures = count;
        self
    }

    /// Shared counter of translate calls.
    pub fn call_counter(&self) -> Arc<AtomicU64> {
        self.core.calls.clone()
    }
}

impl Default for MockTranslationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TranslationEngine for MockTranslationEngine {
    fn target_languages(&self) -> Result<Vec<LanguageTag>> {
        Ok(self.core.languages.clone())
    }

    fn source_languages(&self) -> Result<Vec<LanguageTag>> {
        Ok(self.source_languages.clone())
    }

    fn translate(&self, text: &str, target_code: &str, _source_code: &str) -> Result<String> {
        self.core.translate(text, target_code)
    }
}

/// Mock fallback engine for testing, with scripted transient failures for
/// exercising the retry path.
pub struct MockFallbackEngine {
    core: MockCore,
}

impl MockFallbackEngine {
    pub fn new() -> Self {
        Self {
            core: MockCore::new(),
        }
    }

    pub fn with_language(mut self, name: &str, code: &str) -> Self {
        self.core.languages.push(LanguageTag::new(name, code));
        self
    }

    /// Script the translation of one exact input.
    pub fn with_response(mut self, input: &str, output: &str) -> Self {
        self.core
            .responses
            .insert(input.to_string(), output.to_string());
        self
    }

    /// Fail the first `count` translate calls, then succeed.
    pub fn with_transient_failures(mut self, count: u64) -> Self {
        self.core.transient_failures = count;
        self
    }

    /// Shared counter of translate calls.
    pub fn call_counter(&self) -> Arc<AtomicU64> {
        self.core.calls.clone()
    }
}

impl Default for MockFallbackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackEngine for MockFallbackEngine {
    fn languages(&self) -> Result<Vec<LanguageTag>> {
        Ok(self.core.languages.clone())
    }

    fn translate(&self, text: &str, target_code: &str, _source_code: &str) -> Result<String> {
        self.core.translate(text, target_code)
    }
}
