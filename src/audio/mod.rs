//! Audio capture plumbing: source trait, WAV codec helpers, and VAD.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod recorder;
pub mod vad;
pub mod wav;
