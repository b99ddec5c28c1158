//! Speech segmentation over captured audio frames.
//!
//! RMS-based thresholding with a small state machine that rides out short
//! pauses before declaring an utterance finished. The threshold is either
//! fixed or derived from ambient-noise calibration.

use crate::defaults;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Trait for time operations, allowing mock time in tests.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// Real system clock using `std::time::Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for driving segmentation in tests.
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<Mutex<Instant>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Advances the mock clock by the given duration.
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.lock().unwrap();
        *current += duration;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.current.lock().unwrap()
    }
}

/// Configuration for speech segmentation.
#[derive(Debug, Clone, Copy)]
pub struct VadConfig {
    /// RMS threshold for detecting speech (0.0 to 1.0).
    pub speech_threshold: f32,
    /// Duration of silence before an utterance is considered ended.
    pub pause_threshold: Duration,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            speech_threshold: threshold_from_energy(defaults::ENERGY_THRESHOLD),
            pause_threshold: Duration::from_secs_f32(defaults::PAUSE_THRESHOLD_SECS),
        }
    }
}

/// Current state of the segmenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    /// No speech detected.
    Idle,
    /// Speech is being detected.
    Speaking,
    /// Silence detected, waiting to confirm the utterance ended.
    MaybeSilence,
    /// The utterance has ended.
    Stopped,
}

/// Events emitted per processed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    /// Speech has started.
    SpeechStart,
    /// Ongoing speech detected.
    Speech,
    /// Silence detected.
    Silence,
    /// The utterance has ended.
    SpeechEnd,
}

/// Speech segmentation state machine.
pub struct Vad<C: Clock = SystemClock> {
    config: VadConfig,
    state: VadState,
    silence_start: Option<Instant>,
    clock: C,
}

impl<C: Clock> Vad<C> {
    pub fn with_clock(config: VadConfig, clock: C) -> Self {
        Self {
            config,
            state: VadState::Idle,
            silence_start: None,
            clock,
        }
    }

    /// Processes one frame of 16-bit PCM samples and reports what happened.
    pub fn process(&mut self, samples: &[i16]) -> VadEvent {
        let rms = calculate_rms(samples);
        let is_speech = rms > self.config.speech_threshold;
        let now = self.clock.now();

        match self.state {
            VadState::Idle => {
                if is_speech {
                    self.state = VadState::Speaking;
                    self.silence_start = None;
                    VadEvent::SpeechStart
                } else {
                    VadEvent::Silence
                }
            }
            VadState::Speaking => {
                if is_speech {
                    self.silence_start = None;
                    VadEvent::Speech
                } else {
                    self.state = VadState::MaybeSilence;
                    self.silence_start = Some(now);
                    VadEvent::Silence
                }
            }
            VadState::MaybeSilence => {
                if is_speech {
                    self.state = VadState::Speaking;
                    self.silence_start = None;
                    VadEvent::Speech
                } else {
                    let silence_elapsed = self
                        .silence_start
                        .map(|start| now.duration_since(start))
                        .unwrap_or(Duration::ZERO);

                    if silence_elapsed >= self.config.pause_threshold {
                        self.state = VadState::Stopped;
                        self.silence_start = None;
                        VadEvent::SpeechEnd
                    } else {
                        VadEvent::Silence
                    }
                }
            }
            VadState::Stopped => VadEvent::Silence,
        }
    }

    /// Returns the current segmenter state.
    pub fn state(&self) -> VadState {
        self.state
    }

    /// Resets to idle, ready for the next utterance.
    pub fn reset(&mut self) {
        self.state = VadState::Idle;
        self.silence_start = None;
    }

    /// Updates the speech threshold without resetting state.
    pub fn set_threshold(&mut self, threshold: f32) {
        self.config.speech_threshold = threshold;
    }

    /// Returns the active speech threshold.
    pub fn threshold(&self) -> f32 {
        self.config.speech_threshold
    }
}

impl Vad<SystemClock> {
    pub fn new(config: VadConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

/// Calculates the Root Mean Square (RMS) of audio samples.
///
/// Returns a normalized value in 0.0..=1.0, where 0.0 is silence and
/// ~0.707 is a full-scale sine wave.
pub fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&sample| {
            let normalized = sample as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();

    let mean_square = sum_squares / samples.len() as f64;
    mean_square.sqrt() as f32
}

/// Converts a raw 16-bit energy threshold to a normalized RMS threshold.
pub fn threshold_from_energy(energy: i32) -> f32 {
    energy.max(0) as f32 / i16::MAX as f32
}

/// Derives a speech threshold from an ambient-noise calibration window.
///
/// The ambient RMS level is scaled up by a fixed ratio so that ordinary
/// room noise stays below the threshold.
pub fn threshold_from_ambient(ambient_samples: &[i16]) -> f32 {
    calculate_rms(ambient_samples) * defaults::AMBIENT_ENERGY_RATIO
}
