//! State and behaviour shared by every re-identification backend
//!
//! Each concrete backend wraps a `BackendCore` and only decides how its
//! artifact is validated and which engine loads it.

use crate::{
    error::{ReidError, Result},
    framework::Framework,
    inference::{BackendOptions, InferenceEngine},
    utils::{l2_normalize_rows, to_nhwc, validate_nchw, PreprocessingConfig},
};
use instant::Instant;
use ndarray::{Array2, Array4};
use std::io::Read;
use std::path::Path;

/// Loads the engine for a backend from its options
pub(crate) type EngineLoader = fn(&BackendOptions) -> Result<Box<dyn InferenceEngine>>;

/// Memory layout an engine expects its input batch in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    Nchw,
    Nhwc,
}

pub(crate) struct BackendCore {
    framework: Framework,
    options: BackendOptions,
    layout: TensorLayout,
    input_size: [u32; 2],
    engine: Option<Box<dyn InferenceEngine>>,
    loader: EngineLoader,
}

impl std::fmt::Debug for BackendCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendCore")
            .field("framework", &self.framework)
            .field("options", &self.options)
            .field("layout", &self.layout)
            .field("engine", &self.engine.as_ref().map(|e| e.name()))
            .finish()
    }
}

impl BackendCore {
    pub(crate) fn new(
        framework: Framework,
        options: BackendOptions,
        layout: TensorLayout,
        loader: EngineLoader,
    ) -> Self {
        Self {
            framework,
            options,
            layout,
            input_size: PreprocessingConfig::default().target_size,
            engine: None,
            loader,
        }
    }

    /// Core with an engine that is already loaded
    pub(crate) fn with_engine(
        framework: Framework,
        options: BackendOptions,
        layout: TensorLayout,
        engine: Box<dyn InferenceEngine>,
    ) -> Self {
        let mut core = Self::new(framework, options, layout, injected_only);
        core.engine = Some(engine);
        core
    }

    pub(crate) fn framework(&self) -> Framework {
        self.framework
    }

    pub(crate) fn options(&self) -> &BackendOptions {
        &self.options
    }

    pub(crate) fn layout(&self) -> TensorLayout {
        self.layout
    }

    pub(crate) fn is_loaded(&self) -> bool {
        self.engine.is_some()
    }

    pub(crate) fn preprocess(&self, batch: Array4<f32>) -> Result<Array4<f32>> {
        validate_nchw(&batch)?;
        Ok(match self.layout {
            TensorLayout::Nchw => batch,
            TensorLayout::Nhwc => to_nhwc(batch),
        })
    }

    pub(crate) fn features(&mut self, batch: Array4<f32>) -> Result<Array2<f32>> {
        let items = batch.dim().0;
        if items == 0 {
            return Ok(Array2::zeros((0, 0)));
        }

        let engine = self.engine()?;
        let features = engine.run(&batch)?;
        if features.nrows() != items {
            return Err(ReidError::inference(format!(
                "{} returned {} embeddings for a batch of {items}",
                engine.name(),
                features.nrows()
            )));
        }

        Ok(l2_normalize_rows(features))
    }

    pub(crate) fn warmup(&mut self) -> Result<()> {
        let [height, width] = self.input_size;
        let dummy = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
        let dummy = self.preprocess(dummy)?;
        let start = Instant::now();
        self.features(dummy)?;
        log::debug!(
            "{} warmup finished in {:.2}ms",
            self.framework,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(())
    }

    fn engine(&mut self) -> Result<&mut Box<dyn InferenceEngine>> {
        if self.engine.is_none() {
            let start = Instant::now();
            log::info!(
                "Loading {} weights from {}",
                self.framework.display_name(),
                self.options.weights.display()
            );
            let engine = (self.loader)(&self.options)?;
            log::info!(
                "{} engine ready in {:.0}ms",
                engine.name(),
                start.elapsed().as_secs_f64() * 1000.0
            );
            self.engine = Some(engine);
        }

        self.engine
            .as_mut()
            .ok_or_else(|| ReidError::internal("Engine missing after loading"))
    }
}

/// Loader for cores built around an injected engine; it is never reached
fn injected_only(options: &BackendOptions) -> Result<Box<dyn InferenceEngine>> {
    Err(ReidError::internal(format!(
        "Injected engine for {} was dropped",
        options.weights.display()
    )))
}

/// Ensure the weights path points at a readable file
pub(crate) fn ensure_file(path: &Path, framework: Framework) -> Result<()> {
    if !path.is_file() {
        return Err(ReidError::model_error_with_context(
            "load",
            path,
            &format!("{} weights file not found", framework.display_name()),
            &["check the weights path", "download or export the model first"],
        ));
    }
    Ok(())
}

/// Read up to `len` leading bytes of a file
pub(crate) fn read_header(path: &Path, len: usize) -> Result<Vec<u8>> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| ReidError::model(format!("Failed to open '{}': {e}", path.display())))?;
    let mut header = Vec::with_capacity(len);
    file.by_ref().take(len as u64).read_to_end(&mut header)?;
    Ok(header)
}

/// Zip local file header; torch checkpoints and TorchScript archives start with it
pub(crate) const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Implements `ReidBackend` for a type holding a `core: BackendCore` field
macro_rules! reid_backend {
    ($backend:ty) => {
        impl $crate::inference::ReidBackend for $backend {
            fn framework(&self) -> $crate::framework::Framework {
                self.core.framework()
            }

            fn options(&self) -> &$crate::inference::BackendOptions {
                self.core.options()
            }

            fn preprocess_input(
                &self,
                batch: ::ndarray::Array4<f32>,
            ) -> $crate::error::Result<::ndarray::Array4<f32>> {
                self.core.preprocess(batch)
            }

            fn get_features(
                &mut self,
                batch: ::ndarray::Array4<f32>,
            ) -> $crate::error::Result<::ndarray::Array2<f32>> {
                self.core.features(batch)
            }

            fn warmup(&mut self) -> $crate::error::Result<()> {
                self.core.warmup()
            }

            fn is_loaded(&self) -> bool {
                self.core.is_loaded()
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }
    };
}

pub(crate) use reid_backend;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::StubEngine;
    use crate::config::Device;
    use tempfile::TempDir;

    fn unavailable(_: &BackendOptions) -> Result<Box<dyn InferenceEngine>> {
        Err(ReidError::runtime_unavailable(Framework::PyTorch, "test"))
    }

    #[test]
    fn test_engine_loaded_lazily_and_once() {
        let options = BackendOptions::new("model.onnx", Device::Cpu, false);
        let engine = StubEngine::new(4);
        let calls = engine.calls();
        let mut core = BackendCore::with_engine(
            Framework::Onnx,
            options,
            TensorLayout::Nchw,
            Box::new(engine),
        );

        assert!(core.is_loaded());
        let features = core.features(Array4::ones((2, 3, 8, 4))).unwrap();
        assert_eq!(features.dim(), (2, 4));
        core.features(Array4::ones((1, 3, 8, 4))).unwrap();
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_empty_batch_skips_engine() {
        let options = BackendOptions::new("model.pt", Device::Cpu, false);
        let mut core = BackendCore::new(Framework::PyTorch, options, TensorLayout::Nchw, unavailable);

        let features = core.features(Array4::zeros((0, 3, 256, 128))).unwrap();
        assert_eq!(features.nrows(), 0);
        assert!(!core.is_loaded());
    }

    #[test]
    fn test_loader_errors_propagate() {
        let options = BackendOptions::new("model.pt", Device::Cpu, false);
        let mut core = BackendCore::new(Framework::PyTorch, options, TensorLayout::Nchw, unavailable);

        let err = core.features(Array4::zeros((1, 3, 8, 4))).unwrap_err();
        assert!(matches!(err, ReidError::RuntimeUnavailable { .. }));
        assert!(!core.is_loaded());
    }

    #[test]
    fn test_features_are_normalized() {
        let options = BackendOptions::new("model.onnx", Device::Cpu, false);
        let mut core = BackendCore::with_engine(
            Framework::Onnx,
            options,
            TensorLayout::Nchw,
            Box::new(StubEngine::new(8)),
        );

        let features = core.features(Array4::from_elem((3, 3, 4, 4), 2.0)).unwrap();
        for row in features.rows() {
            let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_row_count_mismatch_is_an_error() {
        let options = BackendOptions::new("model.onnx", Device::Cpu, false);
        let mut core = BackendCore::with_engine(
            Framework::Onnx,
            options,
            TensorLayout::Nchw,
            Box::new(StubEngine::new(4).with_fixed_rows(1)),
        );

        let err = core.features(Array4::ones((3, 3, 4, 4))).unwrap_err();
        assert!(matches!(err, ReidError::Inference(_)));
    }

    #[test]
    fn test_nhwc_layout_and_warmup() {
        let options = BackendOptions::new("model.tflite", Device::Cpu, false);
        let engine = StubEngine::new(4);
        let shapes = engine.calls();
        let mut core = BackendCore::with_engine(
            Framework::TfLite,
            options,
            TensorLayout::Nhwc,
            Box::new(engine),
        );

        let batch = core.preprocess(Array4::zeros((2, 3, 16, 8))).unwrap();
        assert_eq!(batch.shape(), &[2, 16, 8, 3]);
        assert_eq!(core.layout(), TensorLayout::Nhwc);

        core.warmup().unwrap();
        assert_eq!(shapes.lock().unwrap().last().unwrap(), &vec![1, 256, 128, 3]);
    }

    #[test]
    fn test_ensure_file_and_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.torchscript");
        assert!(ensure_file(&path, Framework::TorchScript).is_err());

        std::fs::write(&path, b"PK\x03\x04rest-of-archive").unwrap();
        assert!(ensure_file(&path, Framework::TorchScript).is_ok());
        assert_eq!(read_header(&path, 4).unwrap(), ZIP_MAGIC);
        assert_eq!(read_header(&path, 1024).unwrap().len(), 19);
    }
}
