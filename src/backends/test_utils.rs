//! Test utilities and stub engines for backend testing
//!
//! These stand in for real runtimes so backends and the selector can be
//! exercised without model files, ONNX Runtime or Tract.

use crate::{
    backends::{
        OnnxBackend, OpenVinoBackend, PyTorchBackend, TensorRtBackend, TfLiteBackend,
        TorchScriptBackend,
    },
    error::{ReidError, Result},
    framework::Framework,
    inference::{BackendOptions, InferenceEngine, ReidBackend},
};
use ndarray::{Array2, Array4, Axis};
use std::any::Any;
use std::sync::{Arc, Mutex};

/// Shapes of every batch an engine was run on
pub type CallLog = Arc<Mutex<Vec<Vec<usize>>>>;

/// Deterministic engine producing `dim`-wide embeddings
///
/// Row `i` is `[s, s + 1, ..., s + dim - 1]` where `s` is the sum of sample `i`,
/// so different inputs give different embeddings.
#[derive(Debug, Clone)]
pub struct StubEngine {
    dim: usize,
    fixed_rows: Option<usize>,
    should_fail: bool,
    calls: CallLog,
}

impl StubEngine {
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            fixed_rows: None,
            should_fail: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Engine that always fails during inference
    #[must_use]
    pub fn failing() -> Self {
        let mut engine = Self::new(4);
        engine.should_fail = true;
        engine
    }

    /// Return this many rows regardless of the batch size
    #[must_use]
    pub fn with_fixed_rows(mut self, rows: usize) -> Self {
        self.fixed_rows = Some(rows);
        self
    }

    /// Shared handle on the recorded input shapes
    #[must_use]
    pub fn calls(&self) -> CallLog {
        Arc::clone(&self.calls)
    }
}

impl InferenceEngine for StubEngine {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn run(&mut self, input: &Array4<f32>) -> Result<Array2<f32>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(input.shape().to_vec());
        }
        if self.should_fail {
            return Err(ReidError::inference("Stub engine failure"));
        }

        let sums: Vec<f32> = input.axis_iter(Axis(0)).map(|sample| sample.sum()).collect();
        let rows = self.fixed_rows.unwrap_or(sums.len());
        let mut output = Array2::<f32>::zeros((rows, self.dim));
        for (row, mut values) in output.axis_iter_mut(Axis(0)).enumerate() {
            let base = sums.get(row).copied().unwrap_or(0.0);
            for (offset, value) in values.iter_mut().enumerate() {
                *value = base + offset as f32;
            }
        }
        Ok(output)
    }
}

/// Real backend of the given framework running on a `StubEngine`
///
/// # Errors
/// - `TensorRtBackend` rejects devices other than CUDA and `auto`
pub fn stub_backend(
    framework: Framework,
    options: BackendOptions,
    dim: usize,
) -> Result<Box<dyn ReidBackend>> {
    let engine = Box::new(StubEngine::new(dim));
    Ok(match framework {
        Framework::PyTorch => Box::new(PyTorchBackend::with_engine(options, engine)),
        Framework::TorchScript => Box::new(TorchScriptBackend::with_engine(options, engine)),
        Framework::Onnx => Box::new(OnnxBackend::with_engine(options, engine)),
        Framework::OpenVino => Box::new(OpenVinoBackend::with_engine(options, engine)),
        Framework::TensorRt => Box::new(TensorRtBackend::with_engine(options, engine)?),
        Framework::TfLite => Box::new(TfLiteBackend::with_engine(options, engine)),
    })
}

/// Ordered record of backend calls
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Backend that records every call and reports a configurable framework
///
/// `preprocess_input` doubles the batch and `get_features` returns the
/// per-sample sums, so tests can see that one fed the other.
#[derive(Debug)]
pub struct RecordingBackend {
    framework: Framework,
    options: BackendOptions,
    events: EventLog,
    loaded: bool,
}

impl RecordingBackend {
    #[must_use]
    pub fn new(framework: Framework, options: BackendOptions, events: EventLog) -> Self {
        Self {
            framework,
            options,
            events,
            loaded: false,
        }
    }

    fn record(&self, event: &str) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.to_string());
        }
    }
}

impl ReidBackend for RecordingBackend {
    fn framework(&self) -> Framework {
        self.framework
    }

    fn options(&self) -> &BackendOptions {
        &self.options
    }

    fn preprocess_input(&self, batch: Array4<f32>) -> Result<Array4<f32>> {
        self.record("preprocess_input");
        Ok(batch * 2.0)
    }

    fn get_features(&mut self, batch: Array4<f32>) -> Result<Array2<f32>> {
        self.record("get_features");
        self.loaded = true;
        let sums: Vec<f32> = batch.axis_iter(Axis(0)).map(|sample| sample.sum()).collect();
        Array2::from_shape_vec((sums.len(), 1), sums)
            .map_err(|e| ReidError::inference(e.to_string()))
    }

    fn warmup(&mut self) -> Result<()> {
        self.record("warmup");
        self.loaded = true;
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_engine_output() {
        let mut engine = StubEngine::new(3);
        let output = engine.run(&Array4::ones((2, 1, 2, 2))).unwrap();
        assert_eq!(output.dim(), (2, 3));
        assert_eq!(output[[0, 0]], 4.0);
        assert_eq!(output[[1, 2]], 6.0);
        assert_eq!(engine.calls().lock().unwrap().len(), 1);
    }

    #[test]
    fn test_stub_backend_matches_framework() {
        use crate::config::Device;
        for framework in Framework::ALL {
            let options = BackendOptions::new("model", Device::Cuda(0), false);
            let backend = stub_backend(framework, options, 4).unwrap();
            assert_eq!(backend.framework(), framework);
            assert!(backend.is_loaded());
        }
    }

    #[test]
    fn test_failing_stub_engine() {
        let mut engine = StubEngine::failing();
        assert!(engine.run(&Array4::ones((1, 3, 2, 2))).is_err());
        assert_eq!(engine.calls().lock().unwrap().len(), 1);
    }
}
