//! Backend contract and inference engine abstraction

use crate::{config::Device, error::Result, framework::Framework};
use ndarray::{Array2, Array4};
use std::any::Any;
use std::path::{Path, PathBuf};

/// Arguments every backend is constructed with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOptions {
    /// Path of the model artifact
    pub weights: PathBuf,
    /// Execution device, passed through untouched
    pub device: Device,
    /// Half precision flag, passed through untouched
    pub half: bool,
}

impl BackendOptions {
    #[must_use]
    pub fn new<P: Into<PathBuf>>(weights: P, device: Device, half: bool) -> Self {
        Self {
            weights: weights.into(),
            device,
            half,
        }
    }

    #[must_use]
    pub fn weights(&self) -> &Path {
        &self.weights
    }
}

/// Trait implemented by every re-identification backend
///
/// A backend owns one model artifact for one runtime and turns a batch of
/// normalized crops into one embedding row per crop.
pub trait ReidBackend {
    /// Framework this backend runs
    fn framework(&self) -> Framework;

    /// Options the backend was constructed with
    fn options(&self) -> &BackendOptions;

    /// Validate and convert a raw NCHW batch into the layout the engine expects
    ///
    /// # Errors
    /// - Batch is not a 3-channel image batch
    fn preprocess_input(&self, batch: Array4<f32>) -> Result<Array4<f32>>;

    /// Run the model on a preprocessed batch, returning L2-normalized embeddings
    ///
    /// # Errors
    /// - Artifact validation or engine loading failures
    /// - Engine inference failures
    fn get_features(&mut self, batch: Array4<f32>) -> Result<Array2<f32>>;

    /// Load the model and run one dummy batch through it
    ///
    /// # Errors
    /// - Artifact validation or engine loading failures
    fn warmup(&mut self) -> Result<()>;

    /// Whether the engine has been loaded
    fn is_loaded(&self) -> bool;

    /// Concrete type access for callers that need backend-specific features
    fn as_any(&self) -> &dyn Any;
}

impl std::fmt::Debug for dyn ReidBackend + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReidBackend({})", self.framework())
    }
}

/// Trait for the runtime that actually executes a model
///
/// Engines receive exactly what `preprocess_input` produced and return one row
/// per batch item. Callers linking an additional runtime implement this trait
/// and hand it to a backend with `with_engine`.
pub trait InferenceEngine {
    /// Short engine name for diagnostics
    fn name(&self) -> &'static str;

    /// Run inference on the input tensor
    ///
    /// # Errors
    /// - Model inference failures
    /// - Output tensor conversion errors
    fn run(&mut self, input: &Array4<f32>) -> Result<Array2<f32>>;
}

impl std::fmt::Debug for dyn InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InferenceEngine({})", self.name())
    }
}

/// Flatten an engine output of shape `(n, ...)` into `(n, dim)` rows
///
/// # Errors
/// - Output is a scalar or has a zero-sized batch dimension while data is present
pub fn flatten_output(shape: &[usize], data: Vec<f32>) -> Result<Array2<f32>> {
    let batch = *shape.first().ok_or_else(|| {
        crate::error::ReidError::inference("Engine returned a scalar instead of a batch")
    })?;
    if batch == 0 {
        return Ok(Array2::zeros((0, shape.iter().skip(1).product())));
    }
    let dim = data.len() / batch;
    Array2::from_shape_vec((batch, dim), data).map_err(|e| {
        crate::error::ReidError::inference(format!(
            "Failed to reshape output {shape:?} into embeddings: {e}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_options_pass_through() {
        let options = BackendOptions::new("osnet.onnx", Device::Cuda(1), true);
        assert_eq!(options.weights(), Path::new("osnet.onnx"));
        assert_eq!(options.device, Device::Cuda(1));
        assert!(options.half);
    }

    #[test]
    fn test_flatten_output_shapes() {
        let rows = flatten_output(&[2, 4, 1, 1], (0..8).map(|v| v as f32).collect()).unwrap();
        assert_eq!(rows.dim(), (2, 4));
        assert_eq!(rows[[1, 0]], 4.0);

        let rows = flatten_output(&[3, 2], vec![0.0; 6]).unwrap();
        assert_eq!(rows.dim(), (3, 2));

        let empty = flatten_output(&[0, 512], Vec::new()).unwrap();
        assert_eq!(empty.dim(), (0, 512));

        assert!(flatten_output(&[], vec![1.0]).is_err());
        assert!(flatten_output(&[2, 3], vec![0.0; 5]).is_err());
    }

    #[test]
    fn test_borrowed_backend_is_debug() {
        let options = BackendOptions::new("osnet.pt", Device::Cpu, false);
        let mut backend =
            crate::backends::test_utils::stub_backend(Framework::PyTorch, options, 4).unwrap();
        let borrowed: &mut dyn ReidBackend = backend.as_mut();
        assert_eq!(format!("{borrowed:?}"), format!("ReidBackend({})", Framework::PyTorch));
    }
}
