//! The shared transcription stage.
//!
//! Both conversation directions feed one recognizer instance; a registry
//! hands out reference-counted handles and owns the worker thread so the
//! model is loaded exactly once and unloaded when the last direction stops.

use crate::defaults;
use crate::error::{LingoBridgeError, Result};
use crate::pipeline::control::CancellationToken;
use crate::pipeline::error::{ErrorReporter, StageError};
use crate::pipeline::types::{CloneMessage, Transcript, Utterance};
use crate::providers::Transcriber;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

const STAGE_NAME: &str = "recognizer";

/// Recognizer stage configuration.
#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    /// Queue wait interval, doubling as the cancellation poll interval.
    pub poll: Duration,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            poll: defaults::STAGE_POLL,
        }
    }
}

/// Returns true when `text` is a spurious transcription to discard.
///
/// Catches the empty/punctuation-only results speech models produce on
/// silence, and the known filler phrases they hallucinate: a match counts
/// when the text contains a phrase case-insensitively and is no more than a
/// few characters longer than the phrase itself.
pub fn is_hallucination(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "." {
        return true;
    }

    let lowered = trimmed.to_lowercase();
    defaults::HALLUCINATION_PHRASES.iter().any(|phrase| {
        lowered.contains(phrase) && trimmed.len() < phrase.len() + defaults::HALLUCINATION_LENGTH_SLACK
    })
}

struct Worker {
    queue: Sender<Utterance>,
    token: CancellationToken,
    thread: JoinHandle<()>,
}

struct RegistryState {
    holders: usize,
    worker: Option<Worker>,
}

/// Owner of the single shared recognizer worker.
///
/// `acquire` on the first holder spawns the worker; dropping the last
/// [`RecognizerHandle`] cancels and joins it. Holders in between share the
/// same inbound queue.
pub struct RecognizerRegistry {
    transcriber: Arc<dyn Transcriber>,
    reporter: Arc<dyn ErrorReporter>,
    config: RecognizerConfig,
    state: Mutex<RegistryState>,
}

impl RecognizerRegistry {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        reporter: Arc<dyn ErrorReporter>,
        config: RecognizerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            transcriber,
            reporter,
            config,
            state: Mutex::new(RegistryState {
                holders: 0,
                worker: None,
            }),
        })
    }

    /// Obtain a handle on the shared recognizer, spawning the worker on the
    /// first acquisition.
    pub fn acquire(self: &Arc<Self>) -> RecognizerHandle {
        let mut state = self.state.lock().unwrap();
        state.holders += 1;

        let queue = if let Some(worker) = &state.worker {
            worker.queue.clone()
        } else {
            let (tx, rx) = unbounded();
            let token = CancellationToken::new();
            let thread = spawn_worker(
                rx,
                Arc::clone(&self.transcriber),
                Arc::clone(&self.reporter),
                self.config.poll,
                token.clone(),
            );
            state.worker = Some(Worker {
                queue: tx.clone(),
                token,
                thread,
            });
            tx
        };

        RecognizerHandle {
            registry: Arc::clone(self),
            queue,
        }
    }

    /// Number of live handles.
    pub fn holder_count(&self) -> usize {
        self.state.lock().unwrap().holders
    }

    /// Whether the worker thread currently exists.
    pub fn worker_active(&self) -> bool {
        self.state.lock().unwrap().worker.is_some()
    }

    fn release(&self) {
        let worker = {
            let mut state = self.state.lock().unwrap();
            state.holders = state.holders.saturating_sub(1);
            if state.holders == 0 {
                state.worker.take()
            } else {
                None
            }
        };

        if let Some(worker) = worker {
            worker.token.cancel();
            drop(worker.queue);
            let _ = worker.thread.join();
        }
    }
}

/// Reference-counted access to the shared recognizer.
pub struct RecognizerHandle {
    registry: Arc<RecognizerRegistry>,
    queue: Sender<Utterance>,
}

impl RecognizerHandle {
    /// Queue one utterance for transcription.
    pub fn submit(&self, utterance: Utterance) -> Result<()> {
        self.queue
            .send(utterance)
            .map_err(|_| LingoBridgeError::Transcription {
                message: "recognizer worker is gone".to_string(),
            })
    }

    /// A plain sender for stages that only need to enqueue.
    pub fn queue(&self) -> Sender<Utterance> {
        self.queue.clone()
    }
}

impl Drop for RecognizerHandle {
    fn drop(&mut self) {
        // Shed this handle's sender before the registry joins the worker;
        // the worker then exits on Disconnected instead of waiting out a
        // full poll interval.
        let (detached, _) = unbounded();
        drop(std::mem::replace(&mut self.queue, detached));
        self.registry.release();
    }
}

fn spawn_worker(
    inbound: Receiver<Utterance>,
    transcriber: Arc<dyn Transcriber>,
    reporter: Arc<dyn ErrorReporter>,
    poll: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        loop {
            if token.is_cancelled() {
                break;
            }
            match inbound.recv_timeout(poll) {
                Ok(utterance) => {
                    process_utterance(utterance, transcriber.as_ref(), reporter.as_ref())
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    })
}

fn process_utterance(
    utterance: Utterance,
    transcriber: &dyn Transcriber,
    reporter: &dyn ErrorReporter,
) {
    let result = match transcriber.transcribe(&utterance.wav) {
        Ok(result) => result,
        Err(e) => {
            reporter.report(
                STAGE_NAME,
                &StageError::Recoverable(format!(
                    "transcription via {} failed: {}",
                    transcriber.model_name(),
                    e
                )),
            );
            return;
        }
    };

    let text: String = result
        .segments
        .iter()
        .filter(|s| s.no_speech_prob < defaults::NON_SPEECH_PROB_MAX)
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("");
    let text = text.trim().to_string();

    if is_hallucination(&text) {
        return;
    }

    let started_at = utterance
        .captured_at
        .checked_sub(result.duration)
        .unwrap_or(utterance.captured_at);

    let transcript = Transcript {
        text,
        language: result.language.to_lowercase(),
        started_at,
        finished_at: utterance.captured_at,
    };

    // Receivers may drop during shutdown; not an error.
    let _ = utterance.reply.send(transcript);

    if let Some(clone_feed) = &utterance.clone_feed {
        let _ = clone_feed.send(CloneMessage::Audio(utterance.wav));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::error::CollectingReporter;
    use crate::providers::transcription::{MockTranscriber, TranscribedAudio, TranscribedSegment};
    use std::time::Instant;

    fn fast_config() -> RecognizerConfig {
        RecognizerConfig {
            poll: Duration::from_millis(5),
        }
    }

    fn registry_with(mock: MockTranscriber) -> Arc<RecognizerRegistry> {
        RecognizerRegistry::new(
            Arc::new(mock),
            Arc::new(CollectingReporter::new()),
            fast_config(),
        )
    }

    fn utterance(reply: Sender<Transcript>) -> Utterance {
        Utterance {
            wav: vec![0u8; 64],
            captured_at: Instant::now(),
            reply,
            clone_feed: None,
        }
    }

    #[test]
    fn test_hallucination_filter_rejects_empty_and_dot() {
        assert!(is_hallucination(""));
        assert!(is_hallucination("   "));
        assert!(is_hallucination("."));
        assert!(is_hallucination(" . "));
    }

    #[test]
    fn test_hallucination_filter_rejects_filler_phrases() {
        assert!(is_hallucination("Thank you for watching"));
        assert!(is_hallucination("thanks for watching!"));
        assert!(is_hallucination("Please subscribe to the channel."));
    }

    #[test]
    fn test_hallucination_filter_keeps_phrase_inside_longer_speech() {
        assert!(!is_hallucination(
            "I always say thank you for watching at the end of my videos"
        ));
    }

    #[test]
    fn test_hallucination_filter_keeps_real_speech() {
        assert!(!is_hallucination("Hello there"));
        assert!(!is_hallucination("The weather is nice today."));
    }

    #[test]
    fn test_single_worker_shared_by_both_directions() {
        let registry = registry_with(
            MockTranscriber::new().with_result("hi", "en", Duration::from_secs(1)),
        );

        let a = registry.acquire();
        let b = registry.acquire();
        assert_eq!(registry.holder_count(), 2);
        assert!(registry.worker_active());

        drop(a);
        assert!(registry.worker_active());

        drop(b);
        assert_eq!(registry.holder_count(), 0);
        assert!(!registry.worker_active());
    }

    #[test]
    fn test_reacquire_after_full_release_spawns_new_worker() {
        let registry = registry_with(
            MockTranscriber::new().with_result("hi", "en", Duration::from_secs(1)),
        );

        drop(registry.acquire());
        assert!(!registry.worker_active());

        let handle = registry.acquire();
        assert!(registry.worker_active());
        drop(handle);
    }

    #[test]
    fn test_transcript_delivered_to_reply_queue() {
        let registry = registry_with(
            MockTranscriber::new().with_result("Hello there", "en", Duration::from_secs(2)),
        );
        let handle = registry.acquire();

        let (reply_tx, reply_rx) = unbounded();
        let captured_at = Instant::now();
        handle
            .submit(Utterance {
                wav: vec![0u8; 64],
                captured_at,
                reply: reply_tx,
                clone_feed: None,
            })
            .unwrap();

        let transcript = reply_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(transcript.text, "Hello there");
        assert_eq!(transcript.language, "en");
        assert_eq!(transcript.finished_at, captured_at);
        assert_eq!(
            transcript.finished_at - transcript.started_at,
            Duration::from_secs(2)
        );
        drop(handle);
    }

    #[test]
    fn test_non_speech_segments_dropped_before_assembly() {
        let transcription = TranscribedAudio {
            segments: vec![
                TranscribedSegment {
                    text: "Hello".to_string(),
                    no_speech_prob: 0.1,
                },
                TranscribedSegment {
                    text: " [background noise]".to_string(),
                    no_speech_prob: 0.95,
                },
                TranscribedSegment {
                    text: " there".to_string(),
                    no_speech_prob: 0.2,
                },
            ],
            language: "en".to_string(),
            duration: Duration::from_secs(3),
        };
        let registry =
            registry_with(MockTranscriber::new().with_transcription(transcription));
        let handle = registry.acquire();

        let (reply_tx, reply_rx) = unbounded();
        handle.submit(utterance(reply_tx)).unwrap();

        let transcript = reply_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(transcript.text, "Hello there");
        drop(handle);
    }

    #[test]
    fn test_hallucinated_utterance_produces_nothing() {
        let registry = registry_with(
            MockTranscriber::new().with_result("Thanks for watching", "en", Duration::from_secs(1)),
        );
        let handle = registry.acquire();

        let (reply_tx, reply_rx) = unbounded();
        handle.submit(utterance(reply_tx)).unwrap();

        assert!(reply_rx.recv_timeout(Duration::from_millis(200)).is_err());
        drop(handle);
    }

    #[test]
    fn test_accepted_audio_forwarded_to_clone_feed() {
        let registry = registry_with(
            MockTranscriber::new().with_result("Real speech", "en", Duration::from_secs(1)),
        );
        let handle = registry.acquire();

        let (reply_tx, reply_rx) = unbounded();
        let (clone_tx, clone_rx) = unbounded();
        handle
            .submit(Utterance {
                wav: vec![7u8; 32],
                captured_at: Instant::now(),
                reply: reply_tx,
                clone_feed: Some(clone_tx),
            })
            .unwrap();

        reply_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        match clone_rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            CloneMessage::Audio(wav) => assert_eq!(wav, vec![7u8; 32]),
            other => panic!("Expected audio on clone feed, got {:?}", other),
        }
        drop(handle);
    }

    #[test]
    fn test_transcriber_error_reported_recoverable_and_loop_survives() {
        let reporter = CollectingReporter::new();
        let registry = RecognizerRegistry::new(
            Arc::new(MockTranscriber::new().with_failure()),
            Arc::new(reporter.clone()),
            fast_config(),
        );
        let handle = registry.acquire();

        let (reply_tx, reply_rx) = unbounded();
        handle.submit(utterance(reply_tx)).unwrap();
        assert!(reply_rx.recv_timeout(Duration::from_millis(200)).is_err());

        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        assert!(matches!(reports[0].1, StageError::Recoverable(_)));

        // The worker is still alive and accepting work.
        let (reply_tx, _reply_rx) = unbounded();
        assert!(handle.submit(utterance(reply_tx)).is_ok());
        drop(handle);
    }

    #[test]
    fn test_release_with_default_poll_does_not_wait_out_the_interval() {
        let registry = RecognizerRegistry::new(
            Arc::new(MockTranscriber::new().with_result("hi", "en", Duration::from_secs(1))),
            Arc::new(CollectingReporter::new()),
            RecognizerConfig::default(),
        );
        let handle = registry.acquire();

        let start = Instant::now();
        drop(handle);
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "release took {:?}",
            start.elapsed()
        );
    }

    #[test]
    fn test_release_joins_worker_promptly() {
        let registry = registry_with(
            MockTranscriber::new().with_result("hi", "en", Duration::from_secs(1)),
        );
        let handle = registry.acquire();

        let start = Instant::now();
        drop(handle);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
