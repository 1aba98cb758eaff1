//! Mobile-format backend for `.tflite` flatbuffers
//!
//! TFLite models take channels-last input, so `preprocess_input` transposes
//! the NCHW batch to NHWC.

use super::base::{ensure_file, read_header, reid_backend, BackendCore, TensorLayout};
use crate::{
    error::{ReidError, Result},
    framework::Framework,
    inference::{BackendOptions, InferenceEngine},
};
use std::path::Path;

/// Flatbuffer file identifier, stored after the 4-byte root offset
const TFLITE_IDENTIFIER: &[u8] = b"TFL3";

/// Backend for TensorFlow Lite models
#[derive(Debug)]
pub struct TfLiteBackend {
    core: BackendCore,
}

impl TfLiteBackend {
    /// Create a backend; the flatbuffer is validated on first use
    ///
    /// # Errors
    /// Never fails today; kept fallible to match the other backends.
    pub fn new(options: BackendOptions) -> Result<Self> {
        if options.half {
            log::warn!("TFLite precision is fixed at conversion time, ignoring half");
        }
        Ok(Self {
            core: BackendCore::new(
                Framework::TfLite,
                options,
                TensorLayout::Nhwc,
                Self::load_engine,
            ),
        })
    }

    /// Create a backend that runs on an engine provided by the caller
    #[must_use]
    pub fn with_engine(options: BackendOptions, engine: Box<dyn InferenceEngine>) -> Self {
        Self {
            core: BackendCore::with_engine(Framework::TfLite, options, TensorLayout::Nhwc, engine),
        }
    }

    /// Check the flatbuffer identifier
    ///
    /// # Errors
    /// - File missing or not a TFLite flatbuffer
    pub fn validate_artifact(path: &Path) -> Result<()> {
        ensure_file(path, Framework::TfLite)?;
        let header = read_header(path, 8)?;
        if header.get(4..8) == Some(TFLITE_IDENTIFIER) {
            Ok(())
        } else {
            Err(ReidError::model_error_with_context(
                "load",
                path,
                "missing TFL3 flatbuffer identifier",
                &["convert the model with the TFLite converter"],
            ))
        }
    }

    fn load_engine(options: &BackendOptions) -> Result<Box<dyn InferenceEngine>> {
        Self::validate_artifact(options.weights())?;
        Err(ReidError::runtime_unavailable(
            Framework::TfLite,
            "flatbuffers need the TFLite interpreter; use the ONNX export or inject an engine with TfLiteBackend::with_engine",
        ))
    }
}

reid_backend!(TfLiteBackend);
