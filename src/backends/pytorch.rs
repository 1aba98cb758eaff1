//! Native framework backend for `.pt` / `.pth` checkpoints
//!
//! Checkpoints are pickled module graphs that only libtorch can execute. The
//! backend validates the artifact and runs whichever engine the caller injects;
//! without one, loading reports `RuntimeUnavailable`.

use super::base::{ensure_file, read_header, reid_backend, BackendCore, TensorLayout, ZIP_MAGIC};
use crate::{
    error::{ReidError, Result},
    framework::Framework,
    inference::{BackendOptions, InferenceEngine},
};
use std::path::Path;

/// First byte of a legacy (pre zip) pickle checkpoint
const PICKLE_PROTOCOL: u8 = 0x80;

/// Backend for native framework checkpoints
#[derive(Debug)]
pub struct PyTorchBackend {
    core: BackendCore,
}

impl PyTorchBackend {
    /// Create a backend; the checkpoint is validated on first use
    ///
    /// # Errors
    /// Never fails today; kept fallible to match the other backends.
    pub fn new(options: BackendOptions) -> Result<Self> {
        Ok(Self {
            core: BackendCore::new(
                Framework::PyTorch,
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
            core: BackendCore::with_engine(Framework::PyTorch, options, TensorLayout::Nchw, engine),
        }
    }

    /// Check that the file looks like a torch checkpoint
    ///
    /// # Errors
    /// - File missing or neither a zip archive nor a pickle stream
    pub fn validate_artifact(path: &Path) -> Result<()> {
        ensure_file(path, Framework::PyTorch)?;
        let header = read_header(path, ZIP_MAGIC.len())?;
        if header.starts_with(ZIP_MAGIC) || header.first() == Some(&PICKLE_PROTOCOL) {
            Ok(())
        } else {
            Err(ReidError::model_error_with_context(
                "load",
                path,
                "not a torch checkpoint (expected a zip archive or pickle stream)",
                &["re-save the model with torch.save"],
            ))
        }
    }

    fn load_engine(options: &BackendOptions) -> Result<Box<dyn InferenceEngine>> {
        Self::validate_artifact(options.weights())?;
        Err(ReidError::runtime_unavailable(
            Framework::PyTorch,
            "native checkpoints need libtorch; export the model to ONNX or inject an engine with PyTorchBackend::with_engine",
        ))
    }
}

reid_backend!(PyTorchBackend);
