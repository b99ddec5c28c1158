//! Voice-clone accumulation stage.
//!
//! Sits on the clone feed next to the main pipeline: every accepted
//! utterance of the speaker is cleaned on its own thread, accumulated until
//! enough audio exists, then chunked and submitted to the clone provider.
//! The stage never blocks the conversation path.

use crate::audio::wav;
use crate::defaults;
use crate::error::Result;
use crate::pipeline::control::CancellationToken;
use crate::pipeline::error::{ErrorReporter, StageError};
use crate::pipeline::types::{CloneMessage, CloneProgress, PipelineEvent};
use crate::providers::{Denoiser, VoiceCloneService, VoiceSample};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const STAGE_NAME: &str = "cloner";

/// Cloner stage configuration.
#[derive(Debug, Clone)]
pub struct ClonerConfig {
    /// Queue wait interval, doubling as the cancellation poll interval.
    pub poll: Duration,
    /// Cleaned audio required before the voice is built, in seconds.
    pub required_secs: f64,
    /// Size ceiling for one encoded sample chunk, in bytes.
    pub chunk_size_limit: usize,
    /// Silence appended after each segment, in milliseconds.
    pub silence_pad_ms: u32,
    /// Loudness normalization target, in dBFS.
    pub target_dbfs: f32,
    /// Name for the created voice.
    pub voice_name: String,
}

impl Default for ClonerConfig {
    fn default() -> Self {
        Self {
            poll: defaults::STAGE_POLL,
            required_secs: defaults::CLONE_REQUIRED_SECS,
            chunk_size_limit: defaults::CLONE_CHUNK_SIZE_LIMIT,
            silence_pad_ms: defaults::CLONE_SILENCE_PAD_MS,
            target_dbfs: defaults::CLONE_TARGET_DBFS,
            voice_name: "cloned voice".to_string(),
        }
    }
}

/// One cleaned segment waiting for finalization.
struct CleanedSegment {
    samples: Vec<i16>,
    seconds: f64,
}

#[derive(Default)]
struct Accumulator {
    total_seconds: f64,
    /// Set exactly once, the first time the total crosses the threshold.
    latched: bool,
}

/// Voice-clone accumulation stage.
pub struct Cloner {
    inbound: Receiver<CloneMessage>,
    /// Self-enqueue route for the completion sentinel.
    inbound_tx: Sender<CloneMessage>,
    service: Arc<dyn VoiceCloneService>,
    denoiser: Option<Arc<dyn Denoiser>>,
    events: Sender<PipelineEvent>,
    config: ClonerConfig,
    token: CancellationToken,
    reporter: Arc<dyn ErrorReporter>,
}

impl Cloner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        inbound: Receiver<CloneMessage>,
        inbound_tx: Sender<CloneMessage>,
        service: Arc<dyn VoiceCloneService>,
        denoiser: Option<Arc<dyn Denoiser>>,
        events: Sender<PipelineEvent>,
        config: ClonerConfig,
        token: CancellationToken,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            inbound,
            inbound_tx,
            service,
            denoiser,
            events,
            config,
            token,
            reporter,
        }
    }

    /// Runs until the voice is built or the stage is cancelled.
    ///
    /// Returns the new voice id, or `None` when cancelled (or the feed
    /// closed) before enough audio arrived. An abandoned clone is a normal
    /// outcome, not an error.
    pub fn run(self) -> Option<String> {
        let (acc_tx, acc_rx) = unbounded::<Option<CleanedSegment>>();
        let accumulator = Arc::new(Mutex::new(Accumulator::default()));
        let mut cleaners: Vec<thread::JoinHandle<()>> = Vec::new();
        let mut complete = false;

        loop {
            if self.token.is_cancelled() {
                break;
            }
            match self.inbound.recv_timeout(self.config.poll) {
                Ok(CloneMessage::Audio(wav_bytes)) => {
                    if accumulator.lock().unwrap().latched {
                        continue;
                    }
                    cleaners.push(self.spawn_cleaner(
                        wav_bytes,
                        Arc::clone(&accumulator),
                        acc_tx.clone(),
                    ));
                }
                Ok(CloneMessage::DataComplete) => {
                    complete = true;
                    break;
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // In-flight cleaning tasks drain before any decision is final.
        for cleaner in cleaners {
            let _ = cleaner.join();
        }

        if !complete {
            return None;
        }

        drop(acc_tx);
        let mut segments = Vec::new();
        while let Ok(message) = acc_rx.try_recv() {
            match message {
                Some(segment) => segments.push(segment),
                None => break,
            }
        }

        let chunks = match build_chunks(&segments, &self.config) {
            Ok(chunks) => chunks,
            Err(e) => {
                self.reporter.report(
                    STAGE_NAME,
                    &StageError::Fatal(format!("failed to encode clone chunks: {}", e)),
                );
                return None;
            }
        };

        match self.service.create_voice(&self.config.voice_name, chunks) {
            Ok(voice_id) => {
                let _ = self
                    .events
                    .send(PipelineEvent::CloneProgress(CloneProgress::Complete {
                        voice_id: voice_id.clone(),
                    }));
                Some(voice_id)
            }
            Err(e) => {
                self.reporter.report(
                    STAGE_NAME,
                    &StageError::Fatal(format!("voice creation failed: {}", e)),
                );
                None
            }
        }
    }

    /// Clean one raw segment off-thread and fold it into the accumulator.
    fn spawn_cleaner(
        &self,
        wav_bytes: Vec<u8>,
        accumulator: Arc<Mutex<Accumulator>>,
        acc_tx: Sender<Option<CleanedSegment>>,
    ) -> thread::JoinHandle<()> {
        let denoiser = self.denoiser.clone();
        let target_dbfs = self.config.target_dbfs;
        let required_secs = self.config.required_secs;
        let inbound_tx = self.inbound_tx.clone();
        let events = self.events.clone();
        let reporter = Arc::clone(&self.reporter);

        thread::spawn(move || {
            let samples =
                match clean_segment(&wav_bytes, denoiser.as_deref(), target_dbfs, reporter.as_ref())
                {
                    Ok(samples) => samples,
                    Err(e) => {
                        reporter.report(
                            STAGE_NAME,
                            &StageError::Recoverable(format!("segment rejected: {}", e)),
                        );
                        return;
                    }
                };
            let seconds = wav::duration_secs(samples.len(), defaults::SAMPLE_RATE);

            let mut acc = accumulator.lock().unwrap();
            if acc.latched {
                return;
            }

            acc.total_seconds += seconds;
            let _ = acc_tx.send(Some(CleanedSegment { samples, seconds }));
            let _ = events.send(PipelineEvent::CloneProgress(CloneProgress::Collecting {
                seconds: acc.total_seconds,
            }));

            if acc.total_seconds > required_secs {
                acc.latched = true;
                let _ = acc_tx.send(None);
                let _ = inbound_tx.send(CloneMessage::DataComplete);
                let _ = events.send(PipelineEvent::CloneProgress(CloneProgress::Processing));
            }
        })
    }
}

/// Normalize a raw WAV segment to the loudness target, then denoise when a
/// denoiser is available. A denoise failure degrades to the normalized
/// audio; cleanup never costs us a segment.
fn clean_segment(
    wav_bytes: &[u8],
    denoiser: Option<&dyn Denoiser>,
    target_dbfs: f32,
    reporter: &dyn ErrorReporter,
) -> Result<Vec<i16>> {
    let samples = wav::decode_to_pipeline_rate(wav_bytes)?;
    let normalized = wav::normalize_to_dbfs(&samples, target_dbfs);

    let Some(denoiser) = denoiser else {
        return Ok(normalized);
    };

    let encoded = wav::encode(&normalized, defaults::SAMPLE_RATE)?;
    match denoiser
        .denoise(&encoded)
        .and_then(|clean| wav::decode_to_pipeline_rate(&clean))
    {
        Ok(denoised) => Ok(denoised),
        Err(e) => {
            reporter.report(
                STAGE_NAME,
                &StageError::Recoverable(format!("denoise failed, using normalized audio: {}", e)),
            );
            Ok(normalized)
        }
    }
}

/// Concatenate segments (each followed by a silence pad) into encoded chunks
/// that stay under the size cap. A segment that would push the current chunk
/// over the cap starts a new one.
fn build_chunks(segments: &[CleanedSegment], config: &ClonerConfig) -> Result<Vec<VoiceSample>> {
    let pad = wav::silence(config.silence_pad_ms, defaults::SAMPLE_RATE);
    let mut chunks = Vec::new();
    let mut current: Vec<i16> = Vec::new();

    let mut flush = |current: &mut Vec<i16>, chunks: &mut Vec<VoiceSample>| -> Result<()> {
        if current.is_empty() {
            return Ok(());
        }
        let wav_bytes = wav::encode(current, defaults::SAMPLE_RATE)?;
        chunks.push(VoiceSample {
            name: format!("{}_{}", config.voice_name, chunks.len()),
            wav: wav_bytes,
        });
        current.clear();
        Ok(())
    };

    for segment in segments {
        let added = segment.samples.len() + pad.len();
        if !current.is_empty() && wav::encoded_size(current.len() + added) > config.chunk_size_limit
        {
            flush(&mut current, &mut chunks)?;
        }
        current.extend(&segment.samples);
        current.extend(&pad);
    }
    flush(&mut current, &mut chunks)?;

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::error::CollectingReporter;
    use crate::providers::{MockDenoiser, MockVoiceCloneService};
    use std::time::Instant;

    fn fast_config() -> ClonerConfig {
        ClonerConfig {
            poll: Duration::from_millis(5),
            required_secs: 3.0,
            chunk_size_limit: defaults::CLONE_CHUNK_SIZE_LIMIT,
            silence_pad_ms: 10,
            target_dbfs: defaults::CLONE_TARGET_DBFS,
            voice_name: "test voice".to_string(),
        }
    }

    fn wav_of_seconds(seconds: f64) -> Vec<u8> {
        let count = (seconds * defaults::SAMPLE_RATE as f64) as usize;
        wav::encode(&vec![4000i16; count], defaults::SAMPLE_RATE).unwrap()
    }

    struct Harness {
        feed: Sender<CloneMessage>,
        events: Receiver<PipelineEvent>,
        service: Arc<MockVoiceCloneService>,
        token: CancellationToken,
        reporter: CollectingReporter,
        thread: thread::JoinHandle<Option<String>>,
    }

    fn spawn_cloner(
        config: ClonerConfig,
        service: MockVoiceCloneService,
        denoiser: Option<MockDenoiser>,
    ) -> Harness {
        let service = Arc::new(service);
        let (feed_tx, feed_rx) = unbounded();
        let (events_tx, events_rx) = unbounded();
        let token = CancellationToken::new();
        let reporter = CollectingReporter::new();

        let cloner = Cloner::new(
            feed_rx,
            feed_tx.clone(),
            Arc::clone(&service) as Arc<dyn VoiceCloneService>,
            denoiser.map(|d| Arc::new(d) as Arc<dyn Denoiser>),
            events_tx,
            config,
            token.clone(),
            Arc::new(reporter.clone()),
        );
        let thread = thread::spawn(move || cloner.run());

        Harness {
            feed: feed_tx,
            events: events_rx,
            service,
            token,
            reporter,
            thread,
        }
    }

    fn progress_events(events: &Receiver<PipelineEvent>) -> Vec<CloneProgress> {
        events
            .try_iter()
            .filter_map(|event| match event {
                PipelineEvent::CloneProgress(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_threshold_latches_exactly_once() {
        // 1.0 + 1.0 + 1.0 = threshold exactly: no latch. The fourth segment
        // crosses it.
        let harness = spawn_cloner(fast_config(), MockVoiceCloneService::new(), None);

        for seconds in [1.0, 1.0, 1.0, 0.5] {
            harness
                .feed
                .send(CloneMessage::Audio(wav_of_seconds(seconds)))
                .unwrap();
        }

        let voice_id = harness.thread.join().unwrap();
        assert_eq!(voice_id, Some("cloned-voice-1".to_string()));

        let progress = progress_events(&harness.events);
        let processing_count = progress
            .iter()
            .filter(|p| matches!(p, CloneProgress::Processing))
            .count();
        assert_eq!(processing_count, 1, "latch must fire exactly once");
        assert!(
            matches!(progress.last(), Some(CloneProgress::Complete { voice_id }) if voice_id == "cloned-voice-1")
        );
        assert!(harness.reporter.is_empty());
    }

    #[test]
    fn test_submission_contains_all_collected_audio() {
        let harness = spawn_cloner(fast_config(), MockVoiceCloneService::new(), None);

        for seconds in [2.0, 1.5] {
            harness
                .feed
                .send(CloneMessage::Audio(wav_of_seconds(seconds)))
                .unwrap();
        }
        harness.thread.join().unwrap();

        let submissions = harness.service.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].0, "test voice");

        let total_samples: usize = submissions[0]
            .1
            .iter()
            .map(|chunk| wav::decode(&chunk.wav).unwrap().0.len())
            .sum();
        // 3.5s of speech plus one 10ms pad per segment.
        let expected = (3.5 * defaults::SAMPLE_RATE as f64) as usize + 2 * 160;
        assert_eq!(total_samples, expected);
    }

    #[test]
    fn test_cancellation_before_threshold_abandons_clone() {
        let harness = spawn_cloner(fast_config(), MockVoiceCloneService::new(), None);

        harness
            .feed
            .send(CloneMessage::Audio(wav_of_seconds(1.0)))
            .unwrap();
        thread::sleep(Duration::from_millis(50));

        let start = Instant::now();
        harness.token.cancel();
        let voice_id = harness.thread.join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));

        assert_eq!(voice_id, None);
        assert!(harness.service.submissions().is_empty());
    }

    #[test]
    fn test_denoiser_timeout_degrades_to_normalized_audio() {
        let harness = spawn_cloner(
            fast_config(),
            MockVoiceCloneService::new(),
            Some(MockDenoiser::new().with_timeout()),
        );

        harness
            .feed
            .send(CloneMessage::Audio(wav_of_seconds(3.5)))
            .unwrap();

        let voice_id = harness.thread.join().unwrap();
        assert!(voice_id.is_some(), "clone must survive denoiser failures");

        let reports = harness.reporter.reports();
        assert!(!reports.is_empty());
        assert!(reports[0].1.to_string().contains("denoise failed"));
    }

    #[test]
    fn test_audio_after_latch_is_ignored() {
        let harness = spawn_cloner(fast_config(), MockVoiceCloneService::new(), None);

        harness
            .feed
            .send(CloneMessage::Audio(wav_of_seconds(3.5)))
            .unwrap();
        let voice_id = harness.thread.join().unwrap();
        assert!(voice_id.is_some());

        let submissions = harness.service.submissions();
        let total_samples: usize = submissions[0]
            .1
            .iter()
            .map(|chunk| wav::decode(&chunk.wav).unwrap().0.len())
            .sum();
        let expected = (3.5 * defaults::SAMPLE_RATE as f64) as usize + 160;
        assert_eq!(total_samples, expected);
    }

    #[test]
    fn test_clean_segment_normalizes_loudness() {
        let quiet = wav::encode(&vec![500i16; 16000], defaults::SAMPLE_RATE).unwrap();
        let reporter = CollectingReporter::new();

        let cleaned = clean_segment(&quiet, None, -20.0, &reporter).unwrap();
        let dbfs = wav::rms_dbfs(&cleaned);
        assert!((dbfs - (-20.0)).abs() < 0.5, "got {} dBFS", dbfs);
    }

    #[test]
    fn test_build_chunks_respects_size_cap() {
        let mut config = fast_config();
        // Fits one segment plus pad, not two.
        config.chunk_size_limit = wav::encoded_size(16000 + 160 + 8000);

        let segments: Vec<CleanedSegment> = (0..3)
            .map(|_| CleanedSegment {
                samples: vec![1000i16; 16000],
                seconds: 1.0,
            })
            .collect();

        let chunks = build_chunks(&segments, &config).unwrap();
        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert!(chunk.wav.len() <= config.chunk_size_limit);
            assert_eq!(chunk.name, format!("test voice_{}", i));
        }
    }

    #[test]
    fn test_build_chunks_splits_before_overflowing_segment() {
        let mut config = fast_config();
        // Four padded segments fit under the cap; the fifth would not.
        config.chunk_size_limit = wav::encoded_size(4 * (16000 + 160) + 8000);

        let segments: Vec<CleanedSegment> = (0..6)
            .map(|_| CleanedSegment {
                samples: vec![1000i16; 16000],
                seconds: 1.0,
            })
            .collect();

        let chunks = build_chunks(&segments, &config).unwrap();
        assert_eq!(chunks.len(), 2);
        let (first, _) = wav::decode(&chunks[0].wav).unwrap();
        assert_eq!(first.len(), 4 * (16000 + 160));
        let (second, _) = wav::decode(&chunks[1].wav).unwrap();
        assert_eq!(second.len(), 2 * (16000 + 160));
    }

    #[test]
    fn test_build_chunks_packs_small_segments_together() {
        let config = fast_config();
        let segments: Vec<CleanedSegment> = (0..5)
            .map(|_| CleanedSegment {
                samples: vec![1000i16; 1600],
                seconds: 0.1,
            })
            .collect();

        let chunks = build_chunks(&segments, &config).unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_build_chunks_empty_input() {
        let chunks = build_chunks(&[], &fast_config()).unwrap();
        assert!(chunks.is_empty());
    }
}
