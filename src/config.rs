//! Configuration types for backend selection

use crate::error::{ReidError, Result};
use crate::framework::{identify_framework, Framework};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default re-identification weights file name
pub const DEFAULT_WEIGHTS_FILE: &str = "osnet_x0_25_msmt17.pt";

/// Directory where weights are looked up when no directory is given
#[must_use]
pub fn default_weights_dir() -> PathBuf {
    dirs::cache_dir().map_or_else(
        || PathBuf::from("weights"),
        |dir| dir.join("reid-autobackend").join("weights"),
    )
}

/// Execution device handed to the backend
///
/// The selector never interprets the device; it is passed verbatim to the
/// backend constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    /// Let the engine pick the best available device (CUDA > `CoreML` > CPU)
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA GPU with the given ordinal
    Cuda(usize),
    /// Apple Silicon acceleration
    CoreMl,
}

impl Default for Device {
    fn default() -> Self {
        Self::Cpu
    }
}

impl Device {
    /// Whether the device is an accelerator
    #[must_use]
    pub fn is_accelerator(self) -> bool {
        matches!(self, Self::Cuda(_) | Self::CoreMl)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl FromStr for Device {
    type Err = ReidError;

    /// Accepts `auto`, `cpu`, `cuda`, `cuda:N`, a bare ordinal `N`, `mps` and `coreml`
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "auto" | "" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda(0)),
            "mps" | "coreml" => Ok(Self::CoreMl),
            other => {
                let ordinal = other.strip_prefix("cuda:").unwrap_or(other);
                ordinal.parse::<usize>().map(Self::Cuda).map_err(|_| {
                    ReidError::invalid_config(format!(
                        "Invalid device '{s}'. Expected auto, cpu, cuda, cuda:N, N, mps or coreml"
                    ))
                })
            },
        }
    }
}

impl TryFrom<String> for Device {
    type Error = ReidError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Device> for String {
    fn from(device: Device) -> Self {
        device.to_string()
    }
}

/// Weights reference: a single path or an ordered list of paths
///
/// Only the first path of a list determines the framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Weights {
    Single(PathBuf),
    List(Vec<PathBuf>),
}

impl Weights {
    /// The path that identifies the model
    ///
    /// # Errors
    /// - `ReidError::EmptyWeights` for an empty list
    pub fn primary(&self) -> Result<&Path> {
        match self {
            Self::Single(path) => Ok(path),
            Self::List(paths) => paths
                .first()
                .map(PathBuf::as_path)
                .ok_or(ReidError::EmptyWeights),
        }
    }

    /// All paths in order
    #[must_use]
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            Self::Single(path) => vec![path.as_path()],
            Self::List(paths) => paths.iter().map(PathBuf::as_path).collect(),
        }
    }
}

impl Default for Weights {
    fn default() -> Self {
        Self::Single(default_weights_dir().join(DEFAULT_WEIGHTS_FILE))
    }
}

impl From<PathBuf> for Weights {
    fn from(path: PathBuf) -> Self {
        Self::Single(path)
    }
}

impl From<&Path> for Weights {
    fn from(path: &Path) -> Self {
        Self::Single(path.to_path_buf())
    }
}

impl From<&str> for Weights {
    fn from(path: &str) -> Self {
        Self::Single(PathBuf::from(path))
    }
}

impl From<String> for Weights {
    fn from(path: String) -> Self {
        Self::Single(PathBuf::from(path))
    }
}

impl From<Vec<PathBuf>> for Weights {
    fn from(paths: Vec<PathBuf>) -> Self {
        Self::List(paths)
    }
}

impl From<Vec<&str>> for Weights {
    fn from(paths: Vec<&str>) -> Self {
        Self::List(paths.into_iter().map(PathBuf::from).collect())
    }
}

/// Configuration for a backend selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SelectorConfig {
    /// Model weights (first path decides the framework)
    pub weights: Weights,

    /// Execution device passed to the backend
    #[serde(default)]
    pub device: Device,

    /// Run the model in half precision
    #[serde(default)]
    pub half: bool,
}

impl SelectorConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use reid_autobackend::{Device, SelectorConfig};
    ///
    /// let config = SelectorConfig::builder()
    ///     .weights("osnet_x0_25_msmt17.onnx")
    ///     .device(Device::Cuda(0))
    ///     .half(true)
    ///     .build()
    ///     .unwrap();
    /// assert!(config.half);
    /// ```
    #[must_use]
    pub fn builder() -> SelectorConfigBuilder {
        SelectorConfigBuilder::default()
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// - Empty weights list
    /// - Weights extension that maps to no framework
    /// - Half precision requested on CPU
    pub fn validate(&self) -> Result<Framework> {
        let framework = identify_framework(self.weights.primary()?)?;

        if self.half && self.device == Device::Cpu {
            return Err(ReidError::invalid_config(
                "Half precision requires an accelerator device, got cpu",
            ));
        }

        Ok(framework)
    }

    /// Load a configuration from a JSON file
    ///
    /// # Errors
    /// - File cannot be read
    /// - Malformed JSON or unknown device string
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    ///
    /// # Errors
    /// - Serialization or write failures
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }
}

/// Builder for `SelectorConfig`
#[derive(Debug, Default)]
pub struct SelectorConfigBuilder {
    config: SelectorConfig,
}

impl SelectorConfigBuilder {
    #[must_use]
    pub fn weights<W: Into<Weights>>(mut self, weights: W) -> Self {
        self.config.weights = weights.into();
        self
    }

    #[must_use]
    pub fn device(mut self, device: Device) -> Self {
        self.config.device = device;
        self
    }

    #[must_use]
    pub fn half(mut self, half: bool) -> Self {
        self.config.half = half;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - Any failure reported by `SelectorConfig::validate`
    pub fn build(self) -> Result<SelectorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
