//! Speech synthesis stage.
//!
//! Requests run concurrently so synthesis latency overlaps, but playback is
//! forced into request-issue order: every request registers an ordering
//! token before it is sent, and the provider's on-start hook blocks on that
//! token until the previous playback has finished.

use crate::defaults;
use crate::pipeline::control::{CancellationToken, PauseGate};
use crate::pipeline::error::{ErrorReporter, StageError};
use crate::providers::{PlaybackHooks, SpeechService, SynthesisRequest};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

const STAGE_NAME: &str = "synthesizer";

/// Synthesizer stage configuration.
#[derive(Debug, Clone)]
pub struct SynthesizerConfig {
    /// Queue wait interval, doubling as the cancellation poll interval.
    pub poll: Duration,
    /// Synthesis model passed through on every request.
    pub model_id: String,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            poll: defaults::STAGE_POLL,
            model_id: "eleven_multilingual_v2".to_string(),
        }
    }
}

/// Shared handle for hot-swapping the active voice.
///
/// Swaps apply to requests issued afterwards; in-flight requests keep the
/// voice they were created with.
#[derive(Debug, Clone)]
pub struct VoiceSelector {
    inner: Arc<RwLock<String>>,
}

impl VoiceSelector {
    pub fn new(voice_id: &str) -> Self {
        Self {
            inner: Arc::new(RwLock::new(voice_id.to_string())),
        }
    }

    pub fn set(&self, voice_id: &str) {
        *self.inner.write().unwrap() = voice_id.to_string();
    }

    pub fn get(&self) -> String {
        self.inner.read().unwrap().clone()
    }
}

/// Speech synthesis stage.
pub struct Synthesizer {
    service: Arc<dyn SpeechService>,
    voice: VoiceSelector,
    texts: Receiver<String>,
    config: SynthesizerConfig,
    pause: PauseGate,
    token: CancellationToken,
    reporter: Arc<dyn ErrorReporter>,
}

impl Synthesizer {
    pub fn new(
        service: Arc<dyn SpeechService>,
        voice: VoiceSelector,
        texts: Receiver<String>,
        config: SynthesizerConfig,
        pause: PauseGate,
        token: CancellationToken,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            service,
            voice,
            texts,
            config,
            pause,
            token,
            reporter,
        }
    }

    /// Runs the synthesizer until its token is cancelled.
    ///
    /// Items dequeued while paused are drained and ignored, so a long mute
    /// never replays stale speech on resume.
    pub fn run(self) {
        // FIFO of ordering tokens, one per issued request.
        let (order_tx, order_rx) = unbounded::<Sender<()>>();
        // Playback permit: exactly one in circulation.
        let (ready_tx, ready_rx) = bounded::<()>(1);
        let _ = ready_tx.send(());

        let ordering = spawn_ordering_loop(
            order_rx,
            ready_rx,
            ready_tx.clone(),
            self.config.poll,
            self.token.clone(),
        );

        let mut requests: Vec<thread::JoinHandle<()>> = Vec::new();

        loop {
            if self.token.is_cancelled() {
                break;
            }
            match self.texts.recv_timeout(self.config.poll) {
                Ok(text) => {
                    if self.pause.is_paused() {
                        continue;
                    }

                    // Zero-capacity so the send only completes when the
                    // request is actually blocked in on_start; a request
                    // that failed early shows up as a send error instead of
                    // silently consuming the permit.
                    let (go_tx, go_rx) = bounded::<()>(0);
                    if order_tx.send(go_tx).is_err() {
                        break;
                    }

                    let ready = ready_tx.clone();
                    let hooks = PlaybackHooks::new(
                        // Err means shutdown dropped our token; play anyway
                        // so the provider thread can finish.
                        move || {
                            let _ = go_rx.recv();
                        },
                        move || {
                            let _ = ready.try_send(());
                        },
                    );

                    let request = SynthesisRequest {
                        text,
                        voice_id: self.voice.get(),
                        model_id: self.config.model_id.clone(),
                    };
                    let service = Arc::clone(&self.service);
                    let reporter = Arc::clone(&self.reporter);
                    requests.push(thread::spawn(move || {
                        if let Err(e) = service.stream(request, hooks) {
                            reporter.report(STAGE_NAME, &StageError::Recoverable(e.to_string()));
                        }
                    }));
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // Unblock the ordering loop even when we exited via a disconnected
        // inbound queue.
        self.token.cancel();
        drop(order_tx);
        for request in requests {
            let _ = request.join();
        }
        let _ = ordering.join();
    }
}

/// The playback-ordering loop: fires each registered token strictly in
/// registration order, one per playback permit.
fn spawn_ordering_loop(
    order_rx: Receiver<Sender<()>>,
    ready_rx: Receiver<()>,
    ready_tx: Sender<()>,
    poll: Duration,
    token: CancellationToken,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        'tokens: loop {
            if token.is_cancelled() {
                break;
            }
            let go_tx = match order_rx.recv_timeout(poll) {
                Ok(go_tx) => go_tx,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            // Wait for the previous playback to release the permit.
            loop {
                if token.is_cancelled() {
                    break 'tokens;
                }
                match ready_rx.recv_timeout(poll) {
                    Ok(()) => break,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break 'tokens,
                }
            }

            // A request that failed before playback drops its receiver; the
            // permit it would have released must go back into circulation.
            if go_tx.send(()).is_err() {
                let _ = ready_tx.try_send(());
            }
        }
        // Remaining tokens are dropped here, unblocking any in-flight
        // requests so shutdown can join them.
    })
}
