//! Speech detection stage: one per conversation direction.
//!
//! Owns the capture device, segments the stream into utterances, and pushes
//! each one to the shared recognizer with the direction's reply route
//! attached. Muting a direction suspends capture entirely rather than
//! discarding captured audio.

use crate::audio::recorder::AudioSource;
use crate::audio::vad::{Clock, SystemClock, Vad, VadConfig, VadEvent, threshold_from_ambient, threshold_from_energy};
use crate::audio::wav;
use crate::defaults;
use crate::error::Result;
use crate::pipeline::control::{CancellationToken, PauseGate};
use crate::pipeline::error::{ErrorReporter, StageError};
use crate::pipeline::types::{CloneMessage, Transcript, Utterance};
use crossbeam_channel::Sender;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const STAGE_NAME: &str = "detector";

/// Both directions calibrate against the same physical room; serializing
/// calibration keeps one direction's test tone out of the other's ambient
/// measurement.
static CALIBRATION_LOCK: Mutex<()> = Mutex::new(());

/// Detector stage configuration.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Base capture energy threshold, in raw 16-bit PCM RMS units.
    pub energy_threshold: i32,
    /// Derive the threshold from measured ambient noise instead.
    pub dynamic_energy_threshold: bool,
    /// Silence length that ends an utterance.
    pub pause_threshold: Duration,
    /// How long to wait for speech to start before looping; the detector's
    /// cancellation poll interval.
    pub listen_timeout: Duration,
    /// Hard cap on a single utterance.
    pub max_utterance: Duration,
    /// Interval between reads from the audio source.
    pub capture_poll: Duration,
    /// Length of the ambient-noise calibration window.
    pub calibration_window: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            energy_threshold: defaults::ENERGY_THRESHOLD,
            dynamic_energy_threshold: true,
            pause_threshold: Duration::from_secs_f32(defaults::PAUSE_THRESHOLD_SECS),
            listen_timeout: defaults::LISTEN_TIMEOUT,
            max_utterance: defaults::MAX_UTTERANCE,
            capture_poll: defaults::CAPTURE_POLL,
            calibration_window: defaults::CALIBRATION_WINDOW,
        }
    }
}

/// Speech detection stage.
pub struct Detector<C: Clock + Clone = SystemClock> {
    source: Box<dyn AudioSource>,
    utterances: Sender<Utterance>,
    reply: Sender<Transcript>,
    clone_feed: Option<Sender<CloneMessage>>,
    config: DetectorConfig,
    pause: PauseGate,
    token: CancellationToken,
    reporter: Arc<dyn ErrorReporter>,
    clock: C,
}

impl Detector<SystemClock> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Box<dyn AudioSource>,
        utterances: Sender<Utterance>,
        reply: Sender<Transcript>,
        clone_feed: Option<Sender<CloneMessage>>,
        config: DetectorConfig,
        pause: PauseGate,
        token: CancellationToken,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self::with_clock(
            source, utterances, reply, clone_feed, config, pause, token, reporter, SystemClock,
        )
    }
}

impl<C: Clock + Clone> Detector<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn with_clock(
        source: Box<dyn AudioSource>,
        utterances: Sender<Utterance>,
        reply: Sender<Transcript>,
        clone_feed: Option<Sender<CloneMessage>>,
        config: DetectorConfig,
        pause: PauseGate,
        token: CancellationToken,
        reporter: Arc<dyn ErrorReporter>,
        clock: C,
    ) -> Self {
        Self {
            source,
            utterances,
            reply,
            clone_feed,
            config,
            pause,
            token,
            reporter,
            clock,
        }
    }

    /// Runs the detector until its token is cancelled.
    pub fn run(mut self) {
        if let Err(e) = self.source.start() {
            self.reporter.report(
                STAGE_NAME,
                &StageError::Fatal(format!("failed to start audio source: {}", e)),
            );
            return;
        }

        let threshold = match self.calibrate() {
            Ok(t) => t,
            Err(e) => {
                self.reporter.report(
                    STAGE_NAME,
                    &StageError::Fatal(format!("calibration failed: {}", e)),
                );
                let _ = self.source.stop();
                return;
            }
        };

        let mut vad = Vad::with_clock(
            VadConfig {
                speech_threshold: threshold,
                pause_threshold: self.config.pause_threshold,
            },
            self.clock.clone(),
        );

        while !self.token.is_cancelled() {
            if self.pause.is_paused() {
                self.suspend_capture();
                continue;
            }

            if let Some(samples) = self.capture_utterance(&mut vad) {
                let wav = match wav::encode(&samples, defaults::SAMPLE_RATE) {
                    Ok(wav) => wav,
                    Err(e) => {
                        self.reporter.report(
                            STAGE_NAME,
                            &StageError::Recoverable(format!("failed to encode utterance: {}", e)),
                        );
                        continue;
                    }
                };

                let utterance = Utterance {
                    wav,
                    captured_at: self.clock.now(),
                    reply: self.reply.clone(),
                    clone_feed: self.clone_feed.clone(),
                };
                if self.utterances.send(utterance).is_err() {
                    // Recognizer is gone; nothing left to feed.
                    break;
                }
            }
        }

        let _ = self.source.stop();
    }

    /// Measure the room and derive the speech threshold.
    fn calibrate(&mut self) -> Result<f32> {
        if !self.config.dynamic_energy_threshold {
            return Ok(threshold_from_energy(self.config.energy_threshold));
        }

        let _guard = match CALIBRATION_LOCK.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut ambient = Vec::new();
        let start = self.clock.now();
        while self.clock.now().duration_since(start) < self.config.calibration_window
            && !self.token.is_cancelled()
        {
            ambient.extend(self.source.read_samples()?);
            std::thread::sleep(self.config.capture_poll);
        }

        Ok(threshold_from_ambient(&ambient))
    }

    /// Stop the device while muted, restart it when unmuted.
    fn suspend_capture(&mut self) {
        if let Err(e) = self.source.stop() {
            self.reporter.report(
                STAGE_NAME,
                &StageError::Recoverable(format!("failed to stop audio source: {}", e)),
            );
        }

        while !self.token.is_cancelled()
            && !self.pause.wait_until_resumed(self.config.capture_poll.max(Duration::from_millis(10)))
        {}

        if self.token.is_cancelled() {
            return;
        }

        if let Err(e) = self.source.start() {
            self.reporter.report(
                STAGE_NAME,
                &StageError::Fatal(format!("failed to restart audio source: {}", e)),
            );
            self.token.cancel();
        }
    }

    /// Listen for one VAD-bounded utterance.
    ///
    /// Returns `None` on listen timeout, pause, cancellation, or a read
    /// error; a timeout just means nobody spoke, and the caller loops.
    fn capture_utterance(&mut self, vad: &mut Vad<C>) -> Option<Vec<i16>> {
        vad.reset();
        let listen_start = self.clock.now();
        let mut collected: Vec<i16> = Vec::new();
        let mut speech_start = None;

        loop {
            if self.token.is_cancelled() || self.pause.is_paused() {
                return None;
            }

            let frame = match self.source.read_samples() {
                Ok(frame) => frame,
                Err(e) => {
                    self.reporter.report(
                        STAGE_NAME,
                        &StageError::Recoverable(format!("audio read failed: {}", e)),
                    );
                    return None;
                }
            };

            match vad.process(&frame) {
                VadEvent::SpeechStart => {
                    speech_start = Some(self.clock.now());
                    collected.extend(frame);
                }
                VadEvent::Speech => collected.extend(frame),
                VadEvent::SpeechEnd => return Some(collected),
                VadEvent::Silence => {
                    if speech_start.is_some() {
                        // Possible mid-utterance pause; keep the audio.
                        collected.extend(frame);
                    } else if self.clock.now().duration_since(listen_start)
                        >= self.config.listen_timeout
                    {
                        return None;
                    }
                }
            }

            if let Some(start) = speech_start
                && self.clock.now().duration_since(start) >= self.config.max_utterance
            {
                // Continuous-noise cap: ship what we have.
                return Some(collected);
            }

            std::thread::sleep(self.config.capture_poll);
        }
    }
}
