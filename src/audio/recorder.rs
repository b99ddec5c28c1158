use crate::error::{LingoBridgeError, Result};
use std::sync::Arc;
use std::sync::Mutex;

/// Trait for audio source devices.
///
/// This trait allows swapping implementations (real audio device vs mock).
/// The device behind it is an already-resolved handle: validating that a
/// device name refers to real hardware is the caller's responsibility.
pub trait AudioSource: Send {
    /// Start capturing audio from the source.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing audio from the source.
    fn stop(&mut self) -> Result<()>;

    /// Read all samples captured since the previous read.
    ///
    /// # Returns
    /// 16-bit PCM samples at 16kHz mono. An empty vector is a normal result
    /// for a live source between hardware callbacks.
    fn read_samples(&mut self) -> Result<Vec<i16>>;
}

/// One phase of scripted mock audio: the same frame repeated `count` times.
#[derive(Debug, Clone)]
pub struct FramePhase {
    pub samples: Vec<i16>,
    pub count: u32,
}

/// Mock audio source for testing.
///
/// Plays back a scripted sequence of frame phases, then returns empty reads.
#[derive(Debug, Clone)]
pub struct MockAudioSource {
    is_started: bool,
    phases: Vec<FramePhase>,
    phase_index: usize,
    frame_index: u32,
    repeat_last_phase: bool,
    should_fail_start: bool,
    should_fail_read: bool,
    error_message: String,
    reads: Arc<Mutex<u64>>,
}

impl MockAudioSource {
    /// Create a new mock audio source with no scripted audio.
    pub fn new() -> Self {
        Self {
            is_started: false,
            phases: Vec::new(),
            phase_index: 0,
            frame_index: 0,
            repeat_last_phase: false,
            should_fail_start: false,
            should_fail_read: false,
            error_message: "mock audio error".to_string(),
            reads: Arc::new(Mutex::new(0)),
        }
    }

    /// Script the frames this source produces, phase by phase.
    pub fn with_frame_sequence(mut self, phases: Vec<FramePhase>) -> Self {
        self.phases = phases;
        self
    }

    /// Keep repeating the final phase forever instead of going quiet.
    pub fn with_repeating_last_phase(mut self) -> Self {
        self.repeat_last_phase = true;
        self
    }

    /// Configure the mock to fail on start
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Configure the mock to fail on read
    pub fn with_read_failure(mut self) -> Self {
        self.should_fail_read = true;
        self
    }

    /// Configure the error message for failures
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Shared counter of reads issued against this source.
    pub fn read_counter(&self) -> Arc<Mutex<u64>> {
        self.reads.clone()
    }

    /// Check if the audio source is started
    pub fn is_started(&self) -> bool {
        self.is_started
    }
}

impl Default for MockAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for MockAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.should_fail_start {
            Err(LingoBridgeError::AudioCapture {
                message: self.error_message.clone(),
            })
        } else {
            self.is_started = true;
            Ok(())
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.is_started = false;
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        if self.should_fail_read {
            return Err(LingoBridgeError::AudioCapture {
                message: self.error_message.clone(),
            });
        }

        if let Ok(mut reads) = self.reads.lock() {
            *reads += 1;
        }

        let Some(phase) = self.phases.get(self.phase_index) else {
            return Ok(Vec::new());
        };

        let samples = phase.samples.clone();
        self.frame_index += 1;
        if self.frame_index >= phase.count {
            let at_last = self.phase_index + 1 >= self.phases.len();
            if !(at_last && self.repeat_last_phase) {
                self.phase_index += 1;
            }
            self.frame_index = 0;
        }

        Ok(samples)
    }
}
