//! Stage lifecycle primitives: cancellation and pausing.
//!
//! The two concerns are deliberately separate types. Cancellation is
//! terminal and one-directional; pausing is reversible and never tears a
//! stage down. A stage polls its token at every queue wait and consults its
//! gate only at the points where suspension is meaningful.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// One-directional shutdown signal shared between a stage and its owner.
///
/// Once cancelled, a token never becomes live again.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals the stage to exit at its next poll point.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Reversible suspension gate for a stage.
///
/// Pausing does not interrupt work already in flight; the stage decides at
/// which loop points it honors the gate.
#[derive(Debug, Clone, Default)]
pub struct PauseGate {
    inner: Arc<GateInner>,
}

#[derive(Debug, Default)]
struct GateInner {
    paused: Mutex<bool>,
    resumed: Condvar,
}

impl PauseGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        *self.inner.paused.lock().unwrap() = true;
    }

    pub fn resume(&self) {
        let mut paused = self.inner.paused.lock().unwrap();
        *paused = false;
        self.inner.resumed.notify_all();
    }

    pub fn set_paused(&self, value: bool) {
        if value {
            self.pause()
        } else {
            self.resume()
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.inner.paused.lock().unwrap()
    }

    /// Blocks while paused, up to `timeout`.
    ///
    /// Returns `true` when the gate is open on return and `false` when the
    /// timeout expired with the gate still closed. Callers use the timeout
    /// as their cancellation poll interval.
    pub fn wait_until_resumed(&self, timeout: Duration) -> bool {
        let paused = self.inner.paused.lock().unwrap();
        let (paused, _) = self
            .inner
            .resumed
            .wait_timeout_while(paused, timeout, |paused| *paused)
            .unwrap();
        !*paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_token_starts_live() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_is_visible_through_clones() {
        let token = CancellationToken::new();
        let viewer = token.clone();

        token.cancel();
        assert!(viewer.is_cancelled());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancellationToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_gate_open_by_default() {
        let gate = PauseGate::new();
        assert!(!gate.is_paused());
        assert!(gate.wait_until_resumed(Duration::from_millis(1)));
    }

    #[test]
    fn test_paused_gate_times_out() {
        let gate = PauseGate::new();
        gate.pause();

        let start = Instant::now();
        assert!(!gate.wait_until_resumed(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_resume_wakes_waiter() {
        let gate = PauseGate::new();
        gate.pause();

        let waiter_gate = gate.clone();
        let waiter = thread::spawn(move || waiter_gate.wait_until_resumed(Duration::from_secs(5)));

        thread::sleep(Duration::from_millis(20));
        gate.resume();

        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_pause_resume_round_trips() {
        let gate = PauseGate::new();
        gate.set_paused(true);
        assert!(gate.is_paused());
        gate.set_paused(false);
        assert!(!gate.is_paused());
        gate.set_paused(true);
        assert!(gate.is_paused());
    }
}
