//! Compiled graph backend for `.torchscript` archives

use super::base::{ensure_file, read_header, reid_backend, BackendCore, TensorLayout, ZIP_MAGIC};
use crate::{
    error::{ReidError, Result},
    framework::Framework,
    inference::{BackendOptions, InferenceEngine},
};
use std::path::Path;

/// Backend for TorchScript archives
#[derive(Debug)]
pub struct TorchScriptBackend {
    core: BackendCore,
}

impl TorchScriptBackend {
    /// Create a backend; the archive is validated on first use
    ///
    /// # Errors
    /// Never fails today; kept fallible to match the other backends.
    pub fn new(options: BackendOptions) -> Result<Self> {
        Ok(Self {
            core: BackendCore::new(
                Framework::TorchScript,
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
                Framework::TorchScript,
                options,
                TensorLayout::Nchw,
                engine,
            ),
        }
    }

    /// TorchScript modules are always zip archives
    ///
    /// # Errors
    /// - File missing or not a zip archive
    pub fn validate_artifact(path: &Path) -> Result<()> {
        ensure_file(path, Framework::TorchScript)?;
        if read_header(path, ZIP_MAGIC.len())?.starts_with(ZIP_MAGIC) {
            Ok(())
        } else {
            Err(ReidError::model_error_with_context(
                "load",
                path,
                "not a TorchScript archive",
                &["export again with torch.jit.trace(...).save(...)"],
            ))
        }
    }

    fn load_engine(options: &BackendOptions) -> Result<Box<dyn InferenceEngine>> {
        Self::validate_artifact(options.weights())?;
        Err(ReidError::runtime_unavailable(
            Framework::TorchScript,
            "TorchScript modules need libtorch; export the model to ONNX or inject an engine with TorchScriptBackend::with_engine",
        ))
    }
}

reid_backend!(TorchScriptBackend);
