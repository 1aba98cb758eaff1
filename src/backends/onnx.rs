//! Exchange-format backend for `.onnx` graphs
//!
//! ONNX is the one format this crate can execute on its own. `OrtEngine` runs
//! the graph on ONNX Runtime with CUDA or `CoreML` acceleration when the device
//! asks for it; builds without the `onnx` feature fall back to Tract.

use super::base::{ensure_file, reid_backend, BackendCore, TensorLayout};
use crate::{
    error::{ReidError, Result},
    framework::Framework,
    inference::{BackendOptions, InferenceEngine},
};
use std::path::Path;

#[cfg(feature = "onnx")]
use crate::{config::Device, inference::flatten_output};
#[cfg(feature = "onnx")]
use ndarray::{Array2, Array4};
#[cfg(feature = "onnx")]
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
};
#[cfg(feature = "onnx")]
use ort::session::{
    builder::{GraphOptimizationLevel, SessionBuilder},
    Session,
};
#[cfg(feature = "onnx")]
use ort::tensor::TensorElementType;
#[cfg(feature = "onnx")]
use ort::value::{Value, ValueType};

/// Backend for ONNX graphs
#[derive(Debug)]
pub struct OnnxBackend {
    core: BackendCore,
}

impl OnnxBackend {
    /// Create a backend using the preferred runtime of this build
    ///
    /// # Errors
    /// Never fails today; the graph is loaded on first use.
    pub fn new(options: BackendOptions) -> Result<Self> {
        Ok(Self {
            core: BackendCore::new(Framework::Onnx, options, TensorLayout::Nchw, Self::load_engine),
        })
    }

    /// Create a backend that always runs on the pure Rust Tract engine
    ///
    /// # Errors
    /// Never fails today; the graph is loaded on first use.
    #[cfg(feature = "tract")]
    pub fn pure_rust(options: BackendOptions) -> Result<Self> {
        Ok(Self {
            core: BackendCore::new(Framework::Onnx, options, TensorLayout::Nchw, |options| {
                Self::validate_artifact(options.weights())?;
                Ok(Box::new(super::tract::TractEngine::load(options)?))
            }),
        })
    }

    /// Create a backend that runs on an engine provided by the caller
    #[must_use]
    pub fn with_engine(options: BackendOptions, engine: Box<dyn InferenceEngine>) -> Self {
        Self {
            core: BackendCore::with_engine(Framework::Onnx, options, TensorLayout::Nchw, engine),
        }
    }

    /// ONNX graphs are protobuf; only existence and a non-empty body are checked
    ///
    /// # Errors
    /// - File missing or empty
    pub fn validate_artifact(path: &Path) -> Result<()> {
        ensure_file(path, Framework::Onnx)?;
        if std::fs::metadata(path)?.len() == 0 {
            return Err(ReidError::model_error_with_context(
                "load",
                path,
                "ONNX file is empty",
                &["export the model again"],
            ));
        }
        Ok(())
    }

    fn load_engine(options: &BackendOptions) -> Result<Box<dyn InferenceEngine>> {
        Self::validate_artifact(options.weights())?;

        #[cfg(feature = "onnx")]
        {
            Ok(Box::new(OrtEngine::load(options)?))
        }

        #[cfg(all(not(feature = "onnx"), feature = "tract"))]
        {
            log::debug!("ONNX Runtime not compiled in, using Tract");
            Ok(Box::new(super::tract::TractEngine::load(options)?))
        }

        #[cfg(not(any(feature = "onnx", feature = "tract")))]
        {
            Err(ReidError::runtime_unavailable(
                Framework::Onnx,
                "rebuild with the `onnx` or `tract` feature",
            ))
        }
    }
}

reid_backend!(OnnxBackend);

/// ONNX Runtime session wrapped as an inference engine
#[cfg(feature = "onnx")]
#[derive(Debug)]
pub struct OrtEngine {
    session: Session,
}

#[cfg(feature = "onnx")]
impl OrtEngine {
    /// Build a session for the weights on the requested device
    ///
    /// Unavailable accelerators fall back to CPU with a warning.
    ///
    /// # Errors
    /// - Session creation or graph loading failures
    pub fn load(options: &BackendOptions) -> Result<Self> {
        let start = instant::Instant::now();
        let builder = Session::builder()
            .map_err(|e| ReidError::model(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ReidError::model(format!("Failed to set optimization level: {e}")))?;
        let builder = Self::configure_device(builder, options.device)?;

        let session = builder.commit_from_file(options.weights()).map_err(|e| {
            ReidError::model_error_with_context(
                "load",
                options.weights(),
                &e.to_string(),
                &["check that the file is a valid ONNX export"],
            )
        })?;
        Self::check_input_precision(Self::input_element_type(&session), options)?;

        log::debug!(
            "ONNX Runtime session for {} created in {:.0}ms",
            options.weights().display(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(Self { session })
    }

    /// Element type of the graph's first input, when it is a tensor
    fn input_element_type(session: &Session) -> Option<TensorElementType> {
        match &session.inputs.first()?.input_type {
            ValueType::Tensor { ty, .. } => Some(*ty),
            _ => None,
        }
    }

    /// Batches are fed as f32; graphs exported with float16 inputs are rejected
    fn check_input_precision(
        input_type: Option<TensorElementType>,
        options: &BackendOptions,
    ) -> Result<()> {
        match input_type {
            None | Some(TensorElementType::Float32) => {
                if options.half {
                    log::info!(
                        "Graph takes f32 input; half precision applies only to its internal weights"
                    );
                }
                Ok(())
            },
            Some(TensorElementType::Float16) => Err(ReidError::model_error_with_context(
                "load",
                options.weights(),
                "graph expects float16 input but batches are f32",
                &["export with float32 inputs and outputs (keep_io_types)"],
            )),
            Some(other) => Err(ReidError::model_error_with_context(
                "load",
                options.weights(),
                &format!("unsupported input element type {other:?}"),
                &["export the model with a float32 image input"],
            )),
        }
    }

    fn configure_device(builder: SessionBuilder, device: Device) -> Result<SessionBuilder> {
        let cuda_available = || {
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false)
        };
        let coreml_available = || {
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false)
        };

        let providers = match device {
            Device::Cpu => {
                log::info!("Using CPU execution provider");
                Vec::new()
            },
            Device::Auto => {
                let mut providers = Vec::new();
                if cuda_available() {
                    log::info!("CUDA execution provider is available and will be used");
                    providers.push(CUDAExecutionProvider::default().build());
                }
                if coreml_available() {
                    log::info!("CoreML execution provider is available and will be used");
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                }
                if providers.is_empty() {
                    log::info!("No hardware acceleration available, using CPU");
                }
                providers
            },
            Device::Cuda(ordinal) => {
                if cuda_available() {
                    let device_id = i32::try_from(ordinal).map_err(|_| {
                        ReidError::invalid_config(format!("CUDA ordinal {ordinal} is out of range"))
                    })?;
                    log::info!("Using CUDA execution provider on device {device_id}");
                    vec![CUDAExecutionProvider::default().with_device_id(device_id).build()]
                } else {
                    log::warn!("CUDA execution provider requested but not available, falling back to CPU");
                    Vec::new()
                }
            },
            Device::CoreMl => {
                if coreml_available() {
                    log::info!("Using CoreML execution provider");
                    vec![CoreMLExecutionProvider::default().with_subgraphs(true).build()]
                } else {
                    log::warn!("CoreML execution provider requested but not available, falling back to CPU");
                    Vec::new()
                }
            },
        };

        if providers.is_empty() {
            return Ok(builder);
        }
        builder
            .with_execution_providers(providers)
            .map_err(|e| ReidError::model(format!("Failed to set execution providers: {e}")))
    }
}

#[cfg(feature = "onnx")]
impl InferenceEngine for OrtEngine {
    fn name(&self) -> &'static str {
        "onnxruntime"
    }

    fn run(&mut self, input: &Array4<f32>) -> Result<Array2<f32>> {
        let start = instant::Instant::now();
        let input_value = Value::from_array(input.clone())
            .map_err(|e| ReidError::inference(format!("Failed to convert input tensor: {e}")))?;

        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .map_err(|e| ReidError::inference(format!("ONNX inference failed: {e}")))?;

        // Embedding models have a single output; take it by position
        let (shape, data) = {
            let keys: Vec<_> = outputs.keys().collect();
            let first_key = keys
                .first()
                .ok_or_else(|| ReidError::inference("No output tensors found"))?;
            let tensor = outputs
                .get(first_key)
                .ok_or_else(|| ReidError::inference("First output tensor not found"))?
                .try_extract_array::<f32>()
                .map_err(|e| ReidError::inference(format!("Failed to extract output tensor: {e}")))?;
            (tensor.shape().to_vec(), tensor.iter().copied().collect::<Vec<f32>>())
        };

        log::debug!(
            "ONNX inference on {:?} took {:.2}ms",
            input.shape(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        flatten_output(&shape, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::StubEngine;
    use crate::config::Device;
    use crate::inference::ReidBackend;
    use ndarray::Array4;
    use tempfile::TempDir;

    #[test]
    fn test_backend_keeps_construction_arguments() {
        let options = BackendOptions::new("osnet.onnx", Device::Cuda(0), true);
        let backend = OnnxBackend::new(options.clone()).unwrap();

        assert_eq!(backend.framework(), Framework::Onnx);
        assert_eq!(backend.options(), &options);
        assert!(!backend.is_loaded());
    }

    #[test]
    fn test_missing_graph_fails_on_first_use() {
        let options = BackendOptions::new("/nonexistent/osnet.onnx", Device::Cpu, false);
        let mut backend = OnnxBackend::new(options).unwrap();

        let err = backend.warmup().unwrap_err();
        assert!(matches!(err, ReidError::Model(_)));
        assert!(!backend.is_loaded());
    }

    #[test]
    fn test_empty_graph_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.onnx");
        std::fs::write(&path, b"").unwrap();
        assert!(OnnxBackend::validate_artifact(&path).is_err());

        std::fs::write(&path, [0x08, 0x07]).unwrap();
        assert!(OnnxBackend::validate_artifact(&path).is_ok());
    }

    #[cfg(any(feature = "onnx", feature = "tract"))]
    #[test]
    fn test_corrupt_graph_is_a_model_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corrupt.onnx");
        std::fs::write(&path, b"definitely not protobuf").unwrap();

        let mut backend = OnnxBackend::new(BackendOptions::new(&path, Device::Cpu, false)).unwrap();
        let err = backend.get_features(Array4::zeros((1, 3, 8, 4))).unwrap_err();
        assert!(matches!(err, ReidError::Model(_)));
    }

    #[cfg(feature = "onnx")]
    #[test]
    fn test_float16_graph_input_is_rejected() {
        let options = BackendOptions::new("osnet_fp16.onnx", Device::Cuda(0), true);
        let err = OrtEngine::check_input_precision(Some(TensorElementType::Float16), &options)
            .unwrap_err();
        assert!(matches!(err, ReidError::Model(ref msg) if msg.contains("float16")));

        let err = OrtEngine::check_input_precision(Some(TensorElementType::Uint8), &options)
            .unwrap_err();
        assert!(matches!(err, ReidError::Model(_)));
    }

    #[cfg(feature = "onnx")]
    #[test]
    fn test_float32_graph_input_accepts_half_flag() {
        for half in [false, true] {
            let options = BackendOptions::new("osnet.onnx", Device::Cpu, half);
            assert!(
                OrtEngine::check_input_precision(Some(TensorElementType::Float32), &options)
                    .is_ok()
            );
            assert!(OrtEngine::check_input_precision(None, &options).is_ok());
        }
    }

    #[test]
    fn test_injected_engine_receives_nchw() {
        let engine = StubEngine::new(8);
        let shapes = engine.calls();
        let options = BackendOptions::new("osnet.onnx", Device::Cpu, false);
        let mut backend = OnnxBackend::with_engine(options, Box::new(engine));

        let batch = backend.preprocess_input(Array4::ones((3, 3, 16, 8))).unwrap();
        let features = backend.get_features(batch).unwrap();

        assert_eq!(features.dim(), (3, 8));
        assert_eq!(shapes.lock().unwrap()[0], vec![3, 3, 16, 8]);
        assert!(backend.as_any().downcast_ref::<OnnxBackend>().is_some());
    }
}
