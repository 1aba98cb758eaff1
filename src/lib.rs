#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Re-identification Auto Backend
//!
//! Picks the inference backend for an object re-identification model from the
//! extension of its weights file and exposes one `forward` call over all of
//! them.
//!
//! ## Features
//!
//! - **Format Detection**: `.pt`/`.pth`, `.torchscript`, `.onnx`, `.xml`
//!   (OpenVINO IR), `.engine`/`.plan` (TensorRT) and `.tflite`
//! - **ONNX Execution**: ONNX Runtime with CUDA and `CoreML` providers, or Tract
//!   in pure Rust
//! - **Pluggable Runtimes**: other frameworks run on an `InferenceEngine` supplied
//!   by the caller
//! - **Injected Diagnostics**: selection problems go to a `DiagnosticReporter`
//!   instead of terminating the process
//! - **CLI Integration**: optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use image::RgbImage;
//! use reid_autobackend::{Device, ReidAutoBackend, ReidPreprocessor};
//!
//! # fn main() -> reid_autobackend::Result<()> {
//! let mut selector = ReidAutoBackend::new("osnet_x0_25_msmt17.onnx", Device::Auto, false)?;
//!
//! let frame = RgbImage::new(1280, 720);
//! let boxes = [[100.0, 50.0, 180.0, 260.0], [400.0, 80.0, 470.0, 300.0]];
//! let crops = ReidPreprocessor::default().crops_to_tensor(&frame, &boxes)?;
//!
//! let embeddings = selector.forward(crops)?;
//! assert_eq!(embeddings.nrows(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime engine with GPU acceleration support
//! - `tract` (default): pure Rust ONNX engine
//! - `cli` (default): command-line interface
//! - `tracing-json`: JSON log output for the CLI
//!
//! ## Custom Runtimes
//!
//! ```rust,no_run
//! use ndarray::{Array2, Array4};
//! use reid_autobackend::{
//!     BackendOptions, Device, InferenceEngine, ReidBackend, Result, TfLiteBackend,
//! };
//!
//! struct MyInterpreter;
//!
//! impl InferenceEngine for MyInterpreter {
//!     fn name(&self) -> &'static str {
//!         "my-interpreter"
//!     }
//!
//!     fn run(&mut self, input: &Array4<f32>) -> Result<Array2<f32>> {
//!         Ok(Array2::ones((input.dim().0, 512)))
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let options = BackendOptions::new("osnet.tflite", Device::Cpu, false);
//! let mut backend = TfLiteBackend::with_engine(options, Box::new(MyInterpreter));
//! let batch = backend.preprocess_input(Array4::zeros((1, 3, 256, 128)))?;
//! let embeddings = backend.get_features(batch)?;
//! # Ok(())
//! # }
//! ```

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod framework;
pub mod inference;
pub mod selector;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod utils;

// Public API exports
pub use backends::*;
pub use config::{default_weights_dir, Device, SelectorConfig, Weights, DEFAULT_WEIGHTS_FILE};
pub use error::{ReidError, Result};
pub use framework::{
    check_suffix, identify_framework, ExportFormat, Framework, PathList, SuffixSet,
    EXPORT_FORMATS,
};
pub use inference::{BackendOptions, InferenceEngine, ReidBackend};
pub use selector::{BackendFactory, DefaultBackendFactory, ReidAutoBackend};
pub use services::{
    Diagnostic, DiagnosticLevel, DiagnosticReporter, NoOpReporter, RecordingReporter,
    TracingReporter,
};
pub use utils::{PreprocessingConfig, ReidPreprocessor};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};
