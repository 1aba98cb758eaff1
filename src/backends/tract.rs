//! Tract engine for ONNX graphs
//!
//! Pure Rust inference with no native dependencies. The batch dimension is
//! declared symbolic, so one optimized plan serves every batch size of a given
//! crop shape.

use crate::{
    error::{ReidError, Result},
    inference::{flatten_output, BackendOptions, InferenceEngine},
};
use instant::Instant;
use ndarray::{Array2, Array4};
use std::collections::HashMap;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Pure Rust ONNX engine
#[derive(Debug)]
pub struct TractEngine {
    graph: InferenceModel,
    batch: Symbol,
    plans: HashMap<[usize; 3], TractModel>,
}

impl TractEngine {
    /// Parse the ONNX graph; optimization happens per crop shape on first run
    ///
    /// # Errors
    /// - The file is not a readable ONNX graph
    pub fn load(options: &BackendOptions) -> Result<Self> {
        let start = Instant::now();
        if options.device.is_accelerator() {
            log::warn!(
                "Tract runs on CPU only, ignoring device {}",
                options.device
            );
        }
        if options.half {
            log::warn!("Tract executes in f32, ignoring half precision");
        }

        let graph = onnx().model_for_path(options.weights()).map_err(|e| {
            ReidError::model_error_with_context(
                "load",
                options.weights(),
                &e.to_string(),
                &["check that the file is a valid ONNX export"],
            )
        })?;

        log::debug!(
            "Tract parsed {} in {:.0}ms",
            options.weights().display(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        let batch = graph.symbols.sym("N");
        Ok(Self {
            graph,
            batch,
            plans: HashMap::new(),
        })
    }

    fn plan(&mut self, shape: &[usize]) -> Result<&TractModel> {
        let sample: [usize; 3] = match shape {
            [_, c, h, w] => [*c, *h, *w],
            _ => {
                return Err(ReidError::invalid_input(format!(
                    "Tract expects a 4-D batch, got {shape:?}"
                )))
            },
        };

        if !self.plans.contains_key(&sample) {
            let start = Instant::now();
            let fact: Vec<TDim> = std::iter::once(TDim::from(&self.batch))
                .chain(sample.iter().copied().map(TDim::from))
                .collect();
            let plan = self
                .graph
                .clone()
                .with_input_fact(0, f32::fact(fact).into())
                .and_then(|model| model.into_optimized())
                .and_then(|model| model.into_runnable())
                .map_err(|e| {
                    ReidError::model(format!("Failed to optimize graph for input {sample:?}: {e}"))
                })?;
            log::debug!(
                "Tract plan for N x {sample:?} ready in {:.0}ms",
                start.elapsed().as_secs_f64() * 1000.0
            );
            self.plans.insert(sample, plan);
        }

        self.plans
            .get(&sample)
            .ok_or_else(|| ReidError::internal("Tract plan missing after insertion"))
    }

    /// Number of crop shapes a plan has been built for
    #[must_use]
    pub fn cached_plans(&self) -> usize {
        self.plans.len()
    }
}

impl InferenceEngine for TractEngine {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn run(&mut self, input: &Array4<f32>) -> Result<Array2<f32>> {
        let start = Instant::now();
        let plan = self.plan(input.shape())?;

        let input_tensor = Tensor::from(input.clone());
        let outputs = plan
            .run(tvec![input_tensor.into()])
            .map_err(|e| ReidError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| ReidError::inference("No output tensor found"))?
            .into_arc_tensor();
        let output = output_tensor
            .to_array_view::<f32>()
            .map_err(|e| ReidError::inference(format!("Failed to convert output tensor: {e}")))?;

        log::debug!(
            "Tract inference on {:?} took {:.2}ms",
            input.shape(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        flatten_output(output.shape(), output.iter().copied().collect())
    }
}
