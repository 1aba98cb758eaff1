//! Error types for backend selection and feature extraction

use crate::framework::Framework;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for re-identification operations
pub type Result<T> = std::result::Result<T, ReidError>;

/// Error types for backend selection, model loading and inference
#[derive(Error, Debug)]
pub enum ReidError {
    /// Weights extension does not map to any supported framework
    #[error("Unsupported model format '{extension}' for weights '{}'. Supported suffixes: {supported}", path.display())]
    UnsupportedFormat {
        path: PathBuf,
        extension: String,
        supported: String,
    },

    /// A backend was produced for a different framework than the one identified
    #[error("Inconsistent backend mapping: identified {expected}, backend reports {actual}")]
    InconsistentMapping {
        expected: Framework,
        actual: Framework,
    },

    /// An empty list of weights was supplied
    #[error("Weights list is empty, at least one path is required")]
    EmptyWeights,

    /// No inference engine is linked for the framework
    #[error("No {framework} runtime is available in this build: {hint}")]
    RuntimeUnavailable { framework: Framework, hint: String },

    /// Input batch or crop boxes are malformed
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model artifact loading or validation errors
    #[error("Model error: {0}")]
    Model(String),

    /// Engine inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Input/output errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Configuration (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReidError {
    /// Create an unsupported format error for a weights path
    pub fn unsupported_format<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or_else(|| "<none>".to_string(), |e| format!(".{e}"));
        Self::UnsupportedFormat {
            path,
            extension,
            supported: Framework::supported_suffixes().join(", "),
        }
    }

    /// Create a runtime-unavailable error
    pub fn runtime_unavailable<S: Into<String>>(framework: Framework, hint: S) -> Self {
        Self::RuntimeUnavailable {
            framework,
            hint: hint.into(),
        }
    }

    /// Create a new invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create model error with troubleshooting context
    pub fn model_error_with_context<P: AsRef<std::path::Path>>(
        operation: &str,
        model_path: P,
        error: &str,
        suggestions: &[&str],
    ) -> Self {
        let path_display = model_path.as_ref().display();
        let suggestion_text = if suggestions.is_empty() {
            String::new()
        } else {
            format!(" Suggestions: {}", suggestions.join(", "))
        };

        Self::Model(format!(
            "Failed to {operation} model '{path_display}': {error}.{suggestion_text}"
        ))
    }

    /// Whether the error means the weights file itself was rejected
    #[must_use]
    pub fn is_unsupported_format(&self) -> bool {
        matches!(self, Self::UnsupportedFormat { .. })
    }
}
