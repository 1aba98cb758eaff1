//! Framework identification from weights file extensions
//!
//! Every serialized re-identification model targets exactly one runtime. The
//! runtime is derived from the weights path extension, compared
//! case-insensitively, and never recomputed afterwards.

use crate::{
    error::{ReidError, Result},
    services::DiagnosticReporter,
};
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Runtime a weights file targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    /// Native framework checkpoint (`.pt`, `.pth`)
    PyTorch,
    /// Compiled graph (`.torchscript`)
    TorchScript,
    /// ONNX graph (`.onnx`)
    Onnx,
    /// Vendor runtime IR (`.xml` with a companion `.bin`)
    OpenVino,
    /// Serialized accelerator plan (`.engine`, `.plan`)
    TensorRt,
    /// Mobile-optimized flatbuffer (`.tflite`)
    TfLite,
}

impl Framework {
    /// All frameworks in selection order
    pub const ALL: [Framework; 6] = [
        Framework::PyTorch,
        Framework::TorchScript,
        Framework::Onnx,
        Framework::OpenVino,
        Framework::TensorRt,
        Framework::TfLite,
    ];

    /// Stable identifier used in configs, logs and the CLI
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PyTorch => "pytorch",
            Self::TorchScript => "torchscript",
            Self::Onnx => "onnx",
            Self::OpenVino => "openvino",
            Self::TensorRt => "tensorrt",
            Self::TfLite => "tflite",
        }
    }

    /// Human-readable format name
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::PyTorch => "PyTorch",
            Self::TorchScript => "TorchScript",
            Self::Onnx => "ONNX",
            Self::OpenVino => "OpenVINO",
            Self::TensorRt => "TensorRT",
            Self::TfLite => "TensorFlow Lite",
        }
    }

    /// Weights suffixes (lowercase, with leading dot) that select this framework
    #[must_use]
    pub fn suffixes(self) -> &'static [&'static str] {
        match self {
            Self::PyTorch => &[".pt", ".pth"],
            Self::TorchScript => &[".torchscript"],
            Self::Onnx => &[".onnx"],
            Self::OpenVino => &[".xml"],
            Self::TensorRt => &[".plan", ".engine"],
            Self::TfLite => &[".tflite"],
        }
    }

    /// Map a file extension (with or without leading dot, any case) to a framework
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        let normalized = extension.trim_start_matches('.').to_ascii_lowercase();
        match normalized.as_str() {
            "pt" | "pth" => Some(Self::PyTorch),
            "torchscript" => Some(Self::TorchScript),
            "onnx" => Some(Self::Onnx),
            "xml" => Some(Self::OpenVino),
            "plan" | "engine" => Some(Self::TensorRt),
            "tflite" => Some(Self::TfLite),
            _ => None,
        }
    }

    /// Every suffix accepted by any framework, in selection order
    #[must_use]
    pub fn supported_suffixes() -> Vec<&'static str> {
        Self::ALL
            .iter()
            .flat_map(|framework| framework.suffixes().iter().copied())
            .collect()
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Framework {
    type Err = ReidError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pytorch" | "native" => Ok(Self::PyTorch),
            "torchscript" | "compiled-graph" => Ok(Self::TorchScript),
            "onnx" => Ok(Self::Onnx),
            "openvino" | "vendor-runtime" => Ok(Self::OpenVino),
            "tensorrt" | "engine" | "accelerator-plan" => Ok(Self::TensorRt),
            "tflite" | "mobile-format" => Ok(Self::TfLite),
            other => Err(ReidError::invalid_config(format!(
                "Unknown framework '{other}'. Expected one of: pytorch, torchscript, onnx, openvino, tensorrt, tflite"
            ))),
        }
    }
}

/// Row of the export format table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportFormat {
    pub framework: Framework,
    /// Argument name used when exporting to this format
    pub argument: &'static str,
    /// Suffix of the exported artifact
    pub suffix: &'static str,
    pub cpu: bool,
    pub gpu: bool,
}

/// Formats a re-identification model can be exported to
pub const EXPORT_FORMATS: [ExportFormat; 6] = [
    ExportFormat {
        framework: Framework::PyTorch,
        argument: "-",
        suffix: ".pt",
        cpu: true,
        gpu: true,
    },
    ExportFormat {
        framework: Framework::TorchScript,
        argument: "torchscript",
        suffix: ".torchscript",
        cpu: true,
        gpu: true,
    },
    ExportFormat {
        framework: Framework::Onnx,
        argument: "onnx",
        suffix: ".onnx",
        cpu: true,
        gpu: true,
    },
    ExportFormat {
        framework: Framework::OpenVino,
        argument: "openvino",
        suffix: "_openvino_model",
        cpu: true,
        gpu: false,
    },
    ExportFormat {
        framework: Framework::TensorRt,
        argument: "engine",
        suffix: ".engine",
        cpu: false,
        gpu: true,
    },
    ExportFormat {
        framework: Framework::TfLite,
        argument: "tflite",
        suffix: ".tflite",
        cpu: true,
        gpu: false,
    },
];

/// Identify the framework a weights file targets from its extension
///
/// Pure function of the extension; comparison is case-insensitive.
///
/// # Errors
/// - `ReidError::UnsupportedFormat` when the extension is missing or unknown
pub fn identify_framework<P: AsRef<Path>>(path: P) -> Result<Framework> {
    let path = path.as_ref();
    path.extension()
        .and_then(OsStr::to_str)
        .and_then(Framework::from_extension)
        .ok_or_else(|| ReidError::unsupported_format(path))
}

/// Lowercase suffix of a path (`".onnx"`), or `None` when the path has none
#[must_use]
pub fn file_suffix(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{ext}"))
}

/// One path or an ordered collection of paths
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PathList(Vec<PathBuf>);

impl PathList {
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.0.iter().map(PathBuf::as_path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for PathList {
    fn from(path: &str) -> Self {
        Self(vec![PathBuf::from(path)])
    }
}

impl From<String> for PathList {
    fn from(path: String) -> Self {
        Self(vec![PathBuf::from(path)])
    }
}

impl From<&Path> for PathList {
    fn from(path: &Path) -> Self {
        Self(vec![path.to_path_buf()])
    }
}

impl From<PathBuf> for PathList {
    fn from(path: PathBuf) -> Self {
        Self(vec![path])
    }
}

impl From<Vec<PathBuf>> for PathList {
    fn from(paths: Vec<PathBuf>) -> Self {
        Self(paths)
    }
}

impl From<&[PathBuf]> for PathList {
    fn from(paths: &[PathBuf]) -> Self {
        Self(paths.to_vec())
    }
}

impl From<Vec<&str>> for PathList {
    fn from(paths: Vec<&str>) -> Self {
        Self(paths.into_iter().map(PathBuf::from).collect())
    }
}

impl From<&[&str]> for PathList {
    fn from(paths: &[&str]) -> Self {
        Self(paths.iter().map(PathBuf::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for PathList {
    fn from(paths: [&str; N]) -> Self {
        Self(paths.iter().map(PathBuf::from).collect())
    }
}

/// One accepted suffix or an ordered collection of them, stored lowercase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuffixSet(Vec<String>);

impl SuffixSet {
    fn normalize(suffix: &str) -> String {
        suffix.to_lowercase()
    }

    /// Whether `suffix` (any case) is accepted
    #[must_use]
    pub fn accepts(&self, suffix: &str) -> bool {
        let suffix = Self::normalize(suffix);
        self.0.iter().any(|accepted| *accepted == suffix)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl Default for SuffixSet {
    fn default() -> Self {
        Self::from(".pt")
    }
}

impl fmt::Display for SuffixSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

impl From<&str> for SuffixSet {
    fn from(suffix: &str) -> Self {
        Self(vec![Self::normalize(suffix)])
    }
}

impl From<Vec<&str>> for SuffixSet {
    fn from(suffixes: Vec<&str>) -> Self {
        Self(suffixes.into_iter().map(Self::normalize).collect())
    }
}

impl From<Vec<String>> for SuffixSet {
    fn from(suffixes: Vec<String>) -> Self {
        Self(suffixes.iter().map(|s| Self::normalize(s)).collect())
    }
}

impl From<&[&str]> for SuffixSet {
    fn from(suffixes: &[&str]) -> Self {
        Self(suffixes.iter().map(|s| Self::normalize(s)).collect())
    }
}

impl<const N: usize> From<[&str; N]> for SuffixSet {
    fn from(suffixes: [&str; N]) -> Self {
        Self(suffixes.iter().map(|s| Self::normalize(s)).collect())
    }
}

/// Report every file whose suffix is present but not accepted
///
/// Files without a suffix are skipped. Nothing is raised: one error is sent to
/// `reporter` per mismatching file and the number of mismatches is returned so
/// the caller decides how to react.
pub fn check_suffix<F, S>(
    files: F,
    accepted: S,
    msg: &str,
    reporter: &dyn DiagnosticReporter,
) -> usize
where
    F: Into<PathList>,
    S: Into<SuffixSet>,
{
    let files = files.into();
    let accepted = accepted.into();
    let mut mismatches = 0;

    for file in files.iter() {
        let Some(suffix) = file_suffix(file) else {
            continue;
        };
        if !accepted.accepts(&suffix) {
            mismatches += 1;
            reporter.error(&format!(
                "{msg}File {} does not have an acceptable suffix. Expected: {accepted}",
                file.display()
            ));
        }
    }

    mismatches
}
