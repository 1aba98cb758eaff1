//! Backend implementations, one per model framework
//!
//! - `OnnxBackend`: executes on ONNX Runtime or Tract
//! - `PyTorchBackend`, `TorchScriptBackend`, `OpenVinoBackend`,
//!   `TensorRtBackend`, `TfLiteBackend`: validate their artifact and run an
//!   injected `InferenceEngine`

mod base;
pub mod onnx;
pub mod openvino;
pub mod pytorch;
pub mod tensorrt;
pub mod tflite;
pub mod torchscript;

#[cfg(feature = "tract")]
pub mod tract;

// Stub engines for backend and selector tests
#[cfg(test)]
pub mod test_utils;

pub use self::base::TensorLayout;
pub use self::onnx::OnnxBackend;
#[cfg(feature = "onnx")]
pub use self::onnx::OrtEngine;
pub use self::openvino::OpenVinoBackend;
pub use self::pytorch::PyTorchBackend;
pub use self::tensorrt::TensorRtBackend;
pub use self::tflite::TfLiteBackend;
pub use self::torchscript::TorchScriptBackend;
#[cfg(feature = "tract")]
pub use self::tract::TractEngine;
