//! End-to-end selector workflows
//!
//! Exercises backend selection, construction and forwarding through the public
//! API with engines and backends defined here.

use ndarray::{Array2, Array4, Axis};
use reid_autobackend::{
    check_suffix, identify_framework, BackendFactory, BackendOptions, DefaultBackendFactory,
    Device, Framework, InferenceEngine, OnnxBackend, RecordingReporter, ReidAutoBackend,
    ReidBackend, ReidError, ReidPreprocessor, Result, SelectorConfig, TfLiteBackend,
    TorchScriptBackend,
};
use std::any::Any;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

type CallLog = Arc<Mutex<Vec<&'static str>>>;
type ShapeLog = Arc<Mutex<Vec<Vec<usize>>>>;

/// Engine returning the same embedding for every sample
struct ConstantEngine {
    dim: usize,
    runs: ShapeLog,
}

impl InferenceEngine for ConstantEngine {
    fn name(&self) -> &'static str {
        "constant"
    }

    fn run(&mut self, input: &Array4<f32>) -> Result<Array2<f32>> {
        self.runs.lock().unwrap().push(input.shape().to_vec());
        Ok(Array2::from_elem((input.dim().0, self.dim), 3.0))
    }
}

/// Backend logging the order of calls it receives
struct LoggingBackend {
    options: BackendOptions,
    framework: Framework,
    log: CallLog,
}

impl ReidBackend for LoggingBackend {
    fn framework(&self) -> Framework {
        self.framework
    }

    fn options(&self) -> &BackendOptions {
        &self.options
    }

    fn preprocess_input(&self, batch: Array4<f32>) -> Result<Array4<f32>> {
        self.log.lock().unwrap().push("preprocess_input");
        Ok(batch + 1.0)
    }

    fn get_features(&mut self, batch: Array4<f32>) -> Result<Array2<f32>> {
        self.log.lock().unwrap().push("get_features");
        let means: Vec<f32> = batch
            .axis_iter(Axis(0))
            .map(|sample| sample.mean().unwrap_or(0.0))
            .collect();
        Array2::from_shape_vec((means.len(), 1), means)
            .map_err(|e| ReidError::inference(e.to_string()))
    }

    fn warmup(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct LoggingFactory {
    log: CallLog,
    created: Arc<Mutex<Vec<BackendOptions>>>,
}

impl BackendFactory for LoggingFactory {
    fn create_backend(
        &self,
        framework: Framework,
        options: BackendOptions,
    ) -> Result<Box<dyn ReidBackend>> {
        self.created.lock().unwrap().push(options.clone());
        Ok(Box::new(LoggingBackend {
            options,
            framework,
            log: Arc::clone(&self.log),
        }))
    }

    fn available_frameworks(&self) -> Vec<Framework> {
        Framework::ALL.to_vec()
    }
}

/// Factory building real ONNX/TFLite backends around a `ConstantEngine`
struct EngineFactory {
    runs: ShapeLog,
}

impl BackendFactory for EngineFactory {
    fn create_backend(
        &self,
        framework: Framework,
        options: BackendOptions,
    ) -> Result<Box<dyn ReidBackend>> {
        let engine = Box::new(ConstantEngine {
            dim: 512,
            runs: Arc::clone(&self.runs),
        });
        match framework {
            Framework::Onnx => Ok(Box::new(OnnxBackend::with_engine(options, engine))),
            Framework::TfLite => Ok(Box::new(TfLiteBackend::with_engine(options, engine))),
            other => DefaultBackendFactory.create_backend(other, options),
        }
    }

    fn available_frameworks(&self) -> Vec<Framework> {
        vec![Framework::Onnx, Framework::TfLite]
    }
}

#[test]
fn test_extension_table() -> Result<()> {
    let expected = [
        ("osnet.pt", Framework::PyTorch),
        ("osnet.pth", Framework::PyTorch),
        ("osnet.torchscript", Framework::TorchScript),
        ("osnet.onnx", Framework::Onnx),
        ("osnet_openvino_model/osnet.xml", Framework::OpenVino),
        ("osnet.engine", Framework::TensorRt),
        ("osnet.plan", Framework::TensorRt),
        ("osnet.tflite", Framework::TfLite),
        ("weights/OSNET.ONNX", Framework::Onnx),
        ("weights/osnet.Pt", Framework::PyTorch),
    ];

    for (path, framework) in expected {
        assert_eq!(identify_framework(path)?, framework, "{path}");
        let selector = ReidAutoBackend::new(path, Device::Cpu, false)?;
        assert_eq!(selector.framework(), framework, "{path}");
    }
    Ok(())
}

#[test]
fn test_forward_is_preprocess_then_features() -> Result<()> {
    let log = CallLog::default();
    let created = Arc::new(Mutex::new(Vec::new()));
    let factory = LoggingFactory {
        log: Arc::clone(&log),
        created: Arc::clone(&created),
    };

    let mut selector =
        ReidAutoBackend::new(vec!["osnet.torchscript", "ignored.onnx"], Device::Cuda(0), true)?
            .with_factory(Box::new(factory));
    assert!(!selector.is_bound());

    let features = selector.forward(Array4::zeros((3, 3, 4, 2)))?;
    selector.forward(Array4::zeros((1, 3, 4, 2)))?;

    // zeros + 1 from preprocessing, averaged by feature extraction
    assert_eq!(features.column(0).to_vec(), vec![1.0, 1.0, 1.0]);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["preprocess_input", "get_features", "preprocess_input", "get_features"]
    );

    let created = created.lock().unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(
        created[0],
        BackendOptions::new("osnet.torchscript", Device::Cuda(0), true)
    );
    assert!(selector.is_bound());
    Ok(())
}

#[test]
fn test_onnx_forward_with_injected_engine() -> Result<()> {
    let runs = ShapeLog::default();
    let factory = EngineFactory {
        runs: Arc::clone(&runs),
    };
    let mut selector = ReidAutoBackend::new("osnet_x0_25_msmt17.onnx", Device::Cpu, false)?
        .with_factory(Box::new(factory));

    let frame = image::RgbImage::from_pixel(640, 480, image::Rgb([120, 90, 60]));
    let crops = ReidPreprocessor::default().crops_to_tensor(
        &frame,
        &[[10.0, 10.0, 110.0, 250.0], [300.0, 100.0, 360.0, 400.0]],
    )?;
    let embeddings = selector.forward(crops)?;

    assert_eq!(embeddings.dim(), (2, 512));
    for row in embeddings.rows() {
        let norm = row.dot(&row).sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
    assert_eq!(runs.lock().unwrap()[0], vec![2, 3, 256, 128]);

    let backend = selector.get_backend()?;
    assert!(backend.as_any().downcast_ref::<OnnxBackend>().is_some());
    Ok(())
}

#[test]
fn test_tflite_warmup_runs_channels_last() -> Result<()> {
    let runs = ShapeLog::default();
    let factory = EngineFactory {
        runs: Arc::clone(&runs),
    };
    let mut selector =
        ReidAutoBackend::new("osnet.tflite", Device::Cpu, false)?.with_factory(Box::new(factory));

    selector.warmup()?;
    assert_eq!(runs.lock().unwrap()[0], vec![1, 256, 128, 3]);
    assert!(selector.get_backend()?.is_loaded());
    Ok(())
}

#[test]
fn test_default_factory_validates_artifacts_lazily() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let weights = temp_dir.path().join("osnet.torchscript");
    std::fs::write(&weights, b"PK\x03\x04archive")?;

    let mut selector = ReidAutoBackend::new(weights.as_path(), Device::Cpu, false)?;
    let backend = selector.get_backend()?;
    assert_eq!(backend.framework(), Framework::TorchScript);
    assert!(!backend.is_loaded());
    assert!(backend
        .as_any()
        .downcast_ref::<TorchScriptBackend>()
        .is_some());

    let err = selector
        .forward(Array4::zeros((1, 3, 256, 128)))
        .unwrap_err();
    assert!(matches!(err, ReidError::RuntimeUnavailable { .. }));
    Ok(())
}

#[test]
fn test_config_file_to_selector() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("reid.json");
    std::fs::write(
        &path,
        r#"{"weights": ["osnet.engine", "osnet.onnx"], "device": "cuda:0", "half": true}"#,
    )?;

    let config = SelectorConfig::from_json_file(&path)?;
    assert_eq!(config.validate()?, Framework::TensorRt);

    let selector = ReidAutoBackend::from_config(&config)?;
    assert_eq!(selector.framework(), Framework::TensorRt);
    assert_eq!(selector.weights(), Path::new("osnet.engine"));
    assert_eq!(selector.device(), Device::Cuda(0));
    assert!(selector.half());
    Ok(())
}

#[test]
fn test_check_suffix_reports_each_mismatch() {
    let reporter = RecordingReporter::new();

    let mismatches = check_suffix(
        vec!["a.pt", "b.onnx", "c.PT", "d.xml", "no_suffix"],
        vec![".pt", ".pth"],
        "Weights: ",
        &reporter,
    );

    assert_eq!(mismatches, 2);
    let errors = reporter.errors();
    assert_eq!(errors.len(), 2);
    assert!(errors[0].contains("b.onnx"));
    assert!(errors[1].contains("d.xml"));
    assert!(errors[0].contains("[.pt, .pth]"));

    reporter.clear();
    assert_eq!(check_suffix("osnet.pt", ".pt", "", &reporter), 0);
    assert!(reporter.diagnostics().is_empty());
}
