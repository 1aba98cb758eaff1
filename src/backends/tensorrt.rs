//! Accelerator-plan backend for `.engine` / `.plan` files
//!
//! Serialized TensorRT engines are bound to the GPU they were built on and can
//! only be deserialized by the TensorRT runtime.

use super::base::{ensure_file, reid_backend, BackendCore, TensorLayout};
use crate::{
    config::Device,
    error::{ReidError, Result},
    framework::Framework,
    inference::{BackendOptions, InferenceEngine},
};
use std::path::Path;

/// Backend for serialized TensorRT engines
#[derive(Debug)]
pub struct TensorRtBackend {
    core: BackendCore,
}

impl TensorRtBackend {
    /// Create a backend for a GPU device
    ///
    /// # Errors
    /// - `InvalidConfig` when the device is neither CUDA nor `auto`
    pub fn new(options: BackendOptions) -> Result<Self> {
        Self::check_device(options.device)?;
        Ok(Self {
            core: BackendCore::new(
                Framework::TensorRt,
                options,
                TensorLayout::Nchw,
                Self::load_engine,
            ),
        })
    }

    /// Create a backend that runs on an engine provided by the caller
    ///
    /// # Errors
    /// - `InvalidConfig` when the device is neither CUDA nor `auto`
    pub fn with_engine(options: BackendOptions, engine: Box<dyn InferenceEngine>) -> Result<Self> {
        Self::check_device(options.device)?;
        Ok(Self {
            core: BackendCore::with_engine(
                Framework::TensorRt,
                options,
                TensorLayout::Nchw,
                engine,
            ),
        })
    }

    fn check_device(device: Device) -> Result<()> {
        match device {
            Device::Cuda(_) | Device::Auto => Ok(()),
            other => Err(ReidError::invalid_config(format!(
                "TensorRT engines run on CUDA devices only, got {other}"
            ))),
        }
    }

    /// Engine plans are opaque; only a non-empty file is required
    ///
    /// # Errors
    /// - File missing or empty
    pub fn validate_artifact(path: &Path) -> Result<()> {
        ensure_file(path, Framework::TensorRt)?;
        if std::fs::metadata(path)?.len() == 0 {
            return Err(ReidError::model_error_with_context(
                "load",
                path,
                "engine plan is empty",
                &["rebuild the engine with trtexec on the target GPU"],
            ));
        }
        Ok(())
    }

    fn load_engine(options: &BackendOptions) -> Result<Box<dyn InferenceEngine>> {
        Self::validate_artifact(options.weights())?;
        Err(ReidError::runtime_unavailable(
            Framework::TensorRt,
            "engine plans need the TensorRT runtime; use the ONNX export or inject an engine with TensorRtBackend::with_engine",
        ))
    }
}

reid_backend!(TensorRtBackend);
