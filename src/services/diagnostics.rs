//! Diagnostic reporting service
//!
//! Separates "something is wrong with the input" reporting from the selection
//! logic, allowing different frontends to route messages their own way.

use std::sync::{Arc, Mutex};

/// Severity of a reported diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Warning,
    Error,
}

/// A single reported diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
}

/// Trait for reporting diagnostics during backend selection
pub trait DiagnosticReporter: Send + Sync {
    /// Report an error
    ///
    /// # Arguments
    /// * `message` - Human-readable description of the problem
    fn error(&self, message: &str);

    /// Report a warning
    ///
    /// # Arguments
    /// * `message` - Human-readable description of the problem
    fn warn(&self, _message: &str) {
        // Default implementation drops warnings - only error reporting is required
    }
}

/// Reporter that forwards diagnostics to `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl TracingReporter {
    /// Shared instance suitable for injection
    #[must_use]
    pub fn shared() -> Arc<dyn DiagnosticReporter> {
        Arc::new(Self)
    }
}

impl DiagnosticReporter for TracingReporter {
    fn error(&self, message: &str) {
        tracing::error!(target: "reid_autobackend", "{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "reid_autobackend", "{message}");
    }
}

/// No-op reporter that discards all diagnostics
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpReporter;

impl DiagnosticReporter for NoOpReporter {
    fn error(&self, _message: &str) {
        // Intentionally empty - discards error reports
    }
}

/// Reporter that keeps every diagnostic in memory
///
/// Clones share the same storage, so a clone can be handed to a selector while
/// the first handle is kept for assertions.
#[derive(Debug, Default, Clone)]
pub struct RecordingReporter {
    entries: Arc<Mutex<Vec<Diagnostic>>>,
}

impl RecordingReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, level: DiagnosticLevel, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(Diagnostic {
                level,
                message: message.to_string(),
            });
        }
    }

    /// All diagnostics in reporting order
    #[must_use]
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Messages of reported errors in reporting order
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.messages(DiagnosticLevel::Error)
    }

    /// Messages of reported warnings in reporting order
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        self.messages(DiagnosticLevel::Warning)
    }

    fn messages(&self, level: DiagnosticLevel) -> Vec<String> {
        self.diagnostics()
            .into_iter()
            .filter(|d| d.level == level)
            .map(|d| d.message)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl DiagnosticReporter for RecordingReporter {
    fn error(&self, message: &str) {
        self.record(DiagnosticLevel::Error, message);
    }

    fn warn(&self, message: &str) {
        self.record(DiagnosticLevel::Warning, message);
    }
}
