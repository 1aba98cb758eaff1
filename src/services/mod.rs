//! Service layer shared by the selector, the backends and the CLI
//!
//! Diagnostics are reported through an injected capability so that callers
//! (and tests) decide where messages go without process-wide logger state.

pub mod diagnostics;

pub use diagnostics::{
    Diagnostic, DiagnosticLevel, DiagnosticReporter, NoOpReporter, RecordingReporter,
    TracingReporter,
};
