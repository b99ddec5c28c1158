//! Voice cloning and audio cleanup provider traits.

use crate::error::{LingoBridgeError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// One named training sample: WAV-encoded audio under the chunk size cap.
#[derive(Debug, Clone)]
pub struct VoiceSample {
    pub name: String,
    pub wav: Vec<u8>,
}

/// Trait for voice cloning backends.
pub trait VoiceCloneService: Send + Sync {
    /// Create a cloned voice from the given samples; returns the voice id.
    fn create_voice(&self, name: &str, samples: Vec<VoiceSample>) -> Result<String>;
}

/// Trait for audio denoising backends.
///
/// Callers must treat a denoise failure as non-fatal and fall back to the
/// input audio; cleanup is an enhancement, not a requirement.
pub trait Denoiser: Send + Sync {
    /// Remove background noise from WAV-encoded audio.
    fn denoise(&self, wav: &[u8]) -> Result<Vec<u8>>;
}

/// Mock clone service recording every submission.
pub struct MockVoiceCloneService {
    voice_id: String,
    should_fail: bool,
    submissions: Arc<Mutex<Vec<(String, Vec<VoiceSample>)>>>,
}

impl MockVoiceCloneService {
    pub fn new() -> Self {
        Self {
            voice_id: "cloned-voice-1".to_string(),
            should_fail: false,
            submissions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_voice_id(mut self, id: &str) -> Self {
        self.voice_id = id.to_string();
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// All (voice name, samples) submissions so far.
    pub fn submissions(&self) -> Vec<(String, Vec<VoiceSample>)> {
        self.submissions.lock().unwrap().clone()
    }
}

impl Default for MockVoiceCloneService {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceCloneService for MockVoiceCloneService {
    fn create_voice(&self, name: &str, samples: Vec<VoiceSample>) -> Result<String> {
        if self.should_fail {
            return Err(LingoBridgeError::VoiceClone {
                message: "mock clone service failure".to_string(),
            });
        }
        self.submissions
            .lock()
            .unwrap()
            .push((name.to_string(), samples));
        Ok(self.voice_id.clone())
    }
}

/// Mock denoiser: passthrough by default, with an optional timeout failure
/// mode for exercising the graceful-degradation path.
pub struct MockDenoiser {
    should_time_out: bool,
    calls: Arc<AtomicU64>,
}

impl MockDenoiser {
    pub fn new() -> Self {
        Self {
            should_time_out: false,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Fail every call as if the provider timed out.
    pub fn with_timeout(mut self) -> Self {
        self.should_time_out = true;
        self
    }

    /// Shared counter of denoise calls.
    pub fn call_counter(&self) -> Arc<AtomicU64> {
        self.calls.clone()
    }
}

impl Default for MockDenoiser {
    fn default() -> Self {
        Self::new()
    }
}

impl Denoiser for MockDenoiser {
    fn denoise(&self, wav: &[u8]) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_time_out {
            return Err(LingoBridgeError::Denoise {
                message: "mock denoiser timed out".to_string(),
            });
        }
        Ok(wav.to_vec())
    }
}
