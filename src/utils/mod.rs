//! Utility modules shared across backends

pub mod preprocessing;

pub use preprocessing::{
    l2_normalize_rows, to_nhwc, validate_nchw, PreprocessingConfig, ReidPreprocessor,
};
