//! Speech synthesis provider trait.
//!
//! A `stream` call covers the whole request: synthesize, then play through
//! the output device, blocking until playback finishes. The caller threads
//! playback hooks through so it can impose ordering across overlapping
//! requests.

use crate::error::{LingoBridgeError, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One synthesis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice_id: String,
    pub model_id: String,
}

/// Playback lifecycle callbacks.
///
/// `on_start` runs when synthesized audio is ready, immediately before the
/// first sample plays; the implementation must not start playback until it
/// returns. `on_end` runs after the last sample has played, and must still
/// be invoked when playback fails partway through.
pub struct PlaybackHooks {
    pub on_start: Box<dyn FnOnce() + Send>,
    pub on_end: Box<dyn FnOnce() + Send>,
}

impl PlaybackHooks {
    pub fn new(
        on_start: impl FnOnce() + Send + 'static,
        on_end: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            on_start: Box::new(on_start),
            on_end: Box::new(on_end),
        }
    }

    /// Hooks that do nothing, for callers without ordering requirements.
    pub fn noop() -> Self {
        Self::new(|| {}, || {})
    }
}

/// Trait for streaming text-to-speech backends.
pub trait SpeechService: Send + Sync {
    /// Synthesize and play one request, blocking until playback completes.
    fn stream(&self, request: SynthesisRequest, hooks: PlaybackHooks) -> Result<()>;
}

/// Mock speech service for testing.
///
/// Simulates network latency before audio is ready and a playback duration
/// after, and records the text of each request in the order playback
/// actually started.
pub struct MockSpeechService {
    /// Per-call latencies, consumed front to back; the last value repeats.
    latencies: Mutex<VecDeque<Duration>>,
    playback_duration: Duration,
    should_fail: bool,
    played: Arc<Mutex<Vec<SynthesisRequest>>>,
    calls: Arc<AtomicU64>,
}

impl MockSpeechService {
    pub fn new() -> Self {
        Self {
            latencies: Mutex::new(VecDeque::new()),
            playback_duration: Duration::ZERO,
            should_fail: false,
            played: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Script per-call synthesis latencies; the final value repeats when the
    /// script runs out.
    pub fn with_latencies(self, latencies: &[Duration]) -> Self {
        self.latencies.lock().unwrap().extend(latencies.iter().copied());
        self
    }

    /// How long simulated playback takes per request.
    pub fn with_playback_duration(mut self, duration: Duration) -> Self {
        self.playback_duration = duration;
        self
    }

    /// Make every call fail before playback.
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Texts in the order their playback started.
    pub fn played(&self) -> Vec<String> {
        self.played
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.text.clone())
            .collect()
    }

    /// Full requests in the order their playback started.
    pub fn played_requests(&self) -> Vec<SynthesisRequest> {
        self.played.lock().unwrap().clone()
    }

    /// Shared counter of stream calls.
    pub fn call_counter(&self) -> Arc<AtomicU64> {
        self.calls.clone()
    }

    fn next_latency(&self) -> Duration {
        let mut latencies = self.latencies.lock().unwrap();
        if latencies.len() > 1 {
            latencies.pop_front().unwrap_or(Duration::ZERO)
        } else {
            latencies.front().copied().unwrap_or(Duration::ZERO)
        }
    }
}

impl Default for MockSpeechService {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechService for MockSpeechService {
    fn stream(&self, request: SynthesisRequest, hooks: PlaybackHooks) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.should_fail {
            return Err(LingoBridgeError::Synthesis {
                message: format!("mock synthesis failure for \"{}\"", request.text),
            });
        }

        std::thread::sleep(self.next_latency());

        (hooks.on_start)();
        self.played.lock().unwrap().push(request);
        std::thread::sleep(self.playback_duration);
        (hooks.on_end)();

        Ok(())
    }
}
