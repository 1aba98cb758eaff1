//! Vendor-runtime backend for OpenVINO IR models
//!
//! An IR model is an `.xml` topology with the weights in a `.bin` file of the
//! same stem next to it.

use super::base::{ensure_file, read_header, reid_backend, BackendCore, TensorLayout};
use crate::{
    error::{ReidError, Result},
    framework::Framework,
    inference::{BackendOptions, InferenceEngine},
};
use std::path::{Path, PathBuf};

/// Backend for OpenVINO IR models
#[derive(Debug)]
pub struct OpenVinoBackend {
    core: BackendCore,
}

impl OpenVinoBackend {
    /// Create a backend; the IR pair is validated on first use
    ///
    /// # Errors
    /// Never fails today; kept fallible to match the other backends.
    pub fn new(options: BackendOptions) -> Result<Self> {
        if options.half {
            log::warn!("OpenVINO picks inference precision per device, ignoring half");
        }
        Ok(Self {
            core: BackendCore::new(
                Framework::OpenVino,
                options,
                TensorLayout::Nchw,
                Self::load_engine,
            ),
        })
    }

    /// Create a backend that runs on an engine provided by the caller
    #[must_use]
    pub fn with_engine(options: BackendOptions, engine: Box<dyn InferenceEngine>) -> Self {
        Self {
            core: BackendCore::with_engine(
                Framework::OpenVino,
                options,
                TensorLayout::Nchw,
                engine,
            ),
        }
    }

    /// Weights file that belongs to an IR topology
    #[must_use]
    pub fn companion_weights(xml: &Path) -> PathBuf {
        xml.with_extension("bin")
    }

    /// Check the topology is XML and its `.bin` weights exist
    ///
    /// # Errors
    /// - Topology missing or not XML
    /// - Companion weights missing
    pub fn validate_artifact(path: &Path) -> Result<()> {
        ensure_file(path, Framework::OpenVino)?;

        let header = read_header(path, 64)?;
        let text = String::from_utf8_lossy(&header);
        if !text.trim_start_matches('\u{feff}').trim_start().starts_with('<') {
            return Err(ReidError::model_error_with_context(
                "load",
                path,
                "topology is not an XML document",
                &["export the model with the OpenVINO model converter"],
            ));
        }

        let weights = Self::companion_weights(path);
        if !weights.is_file() {
            return Err(ReidError::model_error_with_context(
                "load",
                path,
                &format!("companion weights '{}' not found", weights.display()),
                &["keep the .bin file next to the .xml topology"],
            ));
        }
        Ok(())
    }

    fn load_engine(options: &BackendOptions) -> Result<Box<dyn InferenceEngine>> {
        Self::validate_artifact(options.weights())?;
        Err(ReidError::runtime_unavailable(
            Framework::OpenVino,
            "IR models need the OpenVINO runtime; use the ONNX export or inject an engine with OpenVinoBackend::with_engine",
        ))
    }
}

reid_backend!(OpenVinoBackend);
