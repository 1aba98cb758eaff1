//! Automatic backend selection for re-identification models
//!
//! `ReidAutoBackend` identifies the framework of a weights file once, builds the
//! matching backend on first use and forwards batches through it.

use crate::{
    backends::{
        OnnxBackend, OpenVinoBackend, PyTorchBackend, TensorRtBackend, TfLiteBackend,
        TorchScriptBackend,
    },
    config::{Device, SelectorConfig, Weights},
    error::{ReidError, Result},
    framework::{self, identify_framework, Framework, PathList, SuffixSet},
    inference::{BackendOptions, ReidBackend},
    services::{DiagnosticReporter, TracingReporter},
};
use ndarray::{Array2, Array4};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Factory trait for creating backends
///
/// The selector asks the factory exactly once, with the framework it
/// identified and the options it was constructed with.
pub trait BackendFactory: Send + Sync {
    /// Create a backend for the given framework
    ///
    /// # Errors
    /// - Backend construction failures (propagated unchanged by the selector)
    fn create_backend(
        &self,
        framework: Framework,
        options: BackendOptions,
    ) -> Result<Box<dyn ReidBackend>>;

    /// Frameworks this factory can build
    fn available_frameworks(&self) -> Vec<Framework>;
}

/// Factory building the backends shipped with this crate
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(
        &self,
        framework: Framework,
        options: BackendOptions,
    ) -> Result<Box<dyn ReidBackend>> {
        Ok(match framework {
            Framework::PyTorch => Box::new(PyTorchBackend::new(options)?),
            Framework::TorchScript => Box::new(TorchScriptBackend::new(options)?),
            Framework::Onnx => Box::new(OnnxBackend::new(options)?),
            Framework::OpenVino => Box::new(OpenVinoBackend::new(options)?),
            Framework::TensorRt => Box::new(TensorRtBackend::new(options)?),
            Framework::TfLite => Box::new(TfLiteBackend::new(options)?),
        })
    }

    fn available_frameworks(&self) -> Vec<Framework> {
        Framework::ALL.to_vec()
    }
}

/// Backend selector for a single re-identification model
///
/// # Examples
/// ```rust,no_run
/// use ndarray::Array4;
/// use reid_autobackend::{Device, ReidAutoBackend};
///
/// # fn main() -> reid_autobackend::Result<()> {
/// let mut selector = ReidAutoBackend::new("osnet_x0_25_msmt17.onnx", Device::Cpu, false)?;
/// let embeddings = selector.forward(Array4::zeros((4, 3, 256, 128)))?;
/// assert_eq!(embeddings.nrows(), 4);
/// # Ok(())
/// # }
/// ```
pub struct ReidAutoBackend {
    weights: PathBuf,
    device: Device,
    half: bool,
    framework: Framework,
    backend: Option<Box<dyn ReidBackend>>,
    factory: Box<dyn BackendFactory>,
    reporter: Arc<dyn DiagnosticReporter>,
}

impl ReidAutoBackend {
    /// Create a selector reporting through `tracing`
    ///
    /// # Errors
    /// - `ReidError::EmptyWeights` for an empty weights list
    /// - `ReidError::UnsupportedFormat` when the extension maps to no framework
    pub fn new<W: Into<Weights>>(weights: W, device: Device, half: bool) -> Result<Self> {
        Self::with_reporter(weights, device, half, TracingReporter::shared())
    }

    /// Create a selector with an injected diagnostic reporter
    ///
    /// Identification failures are reported through `reporter` before the
    /// error is returned.
    ///
    /// # Errors
    /// - `ReidError::EmptyWeights` for an empty weights list
    /// - `ReidError::UnsupportedFormat` when the extension maps to no framework
    pub fn with_reporter<W: Into<Weights>>(
        weights: W,
        device: Device,
        half: bool,
        reporter: Arc<dyn DiagnosticReporter>,
    ) -> Result<Self> {
        let weights = weights.into();
        let identified = weights
            .primary()
            .and_then(|path| Ok((path.to_path_buf(), identify_framework(path)?)));

        let (weights, framework) = match identified {
            Ok(identified) => identified,
            Err(e) => {
                reporter.error(&e.to_string());
                return Err(e);
            },
        };

        debug!(
            weights = %weights.display(),
            framework = %framework,
            device = %device,
            half,
            "Identified model framework"
        );

        Ok(Self {
            weights,
            device,
            half,
            framework,
            backend: None,
            factory: Box::new(DefaultBackendFactory),
            reporter,
        })
    }

    /// Create a selector from a configuration
    ///
    /// # Errors
    /// - Same as `ReidAutoBackend::new`
    pub fn from_config(config: &SelectorConfig) -> Result<Self> {
        Self::new(config.weights.clone(), config.device, config.half)
    }

    /// Replace the factory used to build the backend
    ///
    /// Has no effect once the backend is bound.
    #[must_use]
    pub fn with_factory(mut self, factory: Box<dyn BackendFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Framework identified at construction
    #[must_use]
    pub fn framework(&self) -> Framework {
        self.framework
    }

    /// Weights path that identified the framework
    #[must_use]
    pub fn weights(&self) -> &Path {
        &self.weights
    }

    #[must_use]
    pub fn device(&self) -> Device {
        self.device
    }

    #[must_use]
    pub fn half(&self) -> bool {
        self.half
    }

    /// Whether the backend has been constructed
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.backend.is_some()
    }

    /// Options the backend is (or will be) constructed with
    #[must_use]
    pub fn backend_options(&self) -> BackendOptions {
        BackendOptions::new(self.weights.clone(), self.device, self.half)
    }

    /// The backend for the identified framework, constructed on first call
    ///
    /// # Errors
    /// - Backend construction failures, unchanged
    /// - `ReidError::InconsistentMapping` if the factory built a backend for
    ///   another framework
    #[instrument(skip(self), fields(framework = %self.framework))]
    pub fn get_backend(&mut self) -> Result<&mut dyn ReidBackend> {
        if self.backend.is_none() {
            let backend = self
                .factory
                .create_backend(self.framework, self.backend_options())?;

            if backend.framework() != self.framework {
                return Err(ReidError::InconsistentMapping {
                    expected: self.framework,
                    actual: backend.framework(),
                });
            }

            info!(
                weights = %self.weights.display(),
                "Bound {} backend",
                self.framework.display_name()
            );
            self.backend = Some(backend);
        }

        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| ReidError::internal("Backend missing after construction"))?;
        Ok(&mut **backend)
    }

    /// Run `preprocess_input` then `get_features` on the backend
    ///
    /// # Errors
    /// - Backend construction, preprocessing or inference failures, unchanged
    #[instrument(skip(self, batch), fields(framework = %self.framework, batch = batch.dim().0))]
    pub fn forward(&mut self, batch: Array4<f32>) -> Result<Array2<f32>> {
        let backend = self.get_backend()?;
        let batch = backend.preprocess_input(batch)?;
        backend.get_features(batch)
    }

    /// Load the model and run one dummy batch
    ///
    /// # Errors
    /// - Backend construction or loading failures
    pub fn warmup(&mut self) -> Result<()> {
        self.get_backend()?.warmup()
    }

    /// Report files whose suffix is not accepted through this selector's reporter
    ///
    /// Returns the number of reported files; never fails.
    pub fn check_suffix<F, S>(&self, files: F, accepted: S, msg: &str) -> usize
    where
        F: Into<PathList>,
        S: Into<SuffixSet>,
    {
        framework::check_suffix(files, accepted, msg, self.reporter.as_ref())
    }
}

impl fmt::Debug for ReidAutoBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReidAutoBackend")
            .field("weights", &self.weights)
            .field("device", &self.device)
            .field("half", &self.half)
            .field("framework", &self.framework)
            .field("bound", &self.is_bound())
            .finish_non_exhaustive()
    }
}
