//! Error types and reporting for pipeline stages.

use std::fmt;
use std::sync::{Arc, Mutex};

/// Errors surfaced by a running stage.
#[derive(Debug, Clone)]
pub enum StageError {
    /// Recoverable error; the stage drops the current item and continues.
    Recoverable(String),
    /// Fatal error; the stage shuts down.
    Fatal(String),
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::Recoverable(msg) => write!(f, "Recoverable error: {}", msg),
            StageError::Fatal(msg) => write!(f, "Fatal error: {}", msg),
        }
    }
}

impl std::error::Error for StageError {}

/// Trait for reporting stage errors.
pub trait ErrorReporter: Send + Sync {
    /// Reports an error from a stage.
    fn report(&self, stage: &str, error: &StageError);
}

/// Simple error reporter that logs to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, stage: &str, error: &StageError) {
        eprintln!("[{}] {}", stage, error);
    }
}

/// Reporter that collects everything it sees, for assertions in tests.
#[derive(Debug, Clone, Default)]
pub struct CollectingReporter {
    reports: Arc<Mutex<Vec<(String, StageError)>>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(String, StageError)> {
        self.reports.lock().unwrap().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().unwrap().is_empty()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, stage: &str, error: &StageError) {
        self.reports
            .lock()
            .unwrap()
            .push((stage.to_string(), error.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_display() {
        let recoverable = StageError::Recoverable("temporary failure".to_string());
        assert_eq!(
            recoverable.to_string(),
            "Recoverable error: temporary failure"
        );

        let fatal = StageError::Fatal("critical failure".to_string());
        assert_eq!(fatal.to_string(), "Fatal error: critical failure");
    }

    #[test]
    fn test_log_reporter() {
        let reporter = LogReporter;
        let error = StageError::Recoverable("test error".to_string());
        // Just ensure it doesn't panic
        reporter.report("TestStage", &error);
    }

    #[test]
    fn test_collecting_reporter_captures_reports() {
        let reporter = CollectingReporter::new();
        assert!(reporter.is_empty());

        reporter.report("translator", &StageError::Recoverable("oops".to_string()));

        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, "translator");
        assert!(reports[0].1.to_string().contains("oops"));
    }
}
