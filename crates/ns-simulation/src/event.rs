//! Threshold events `g(X) op t` and parallel model evaluation.

use std::fmt;
use std::sync::Arc;

use ns_core::{ComparisonOperator, Error, Model, Result, Sample};
use ns_prob::Distribution;
use rayon::prelude::*;

/// Points per parallel evaluation chunk.
pub const EVAL_CHUNK: usize = 256;

/// Evaluate `model` on every row of `sample` in parallel chunks.
///
/// Output order follows row order; the call returns only once every chunk is done.
pub fn evaluate_parallel(model: &dyn Model, sample: &Sample) -> Result<Vec<f64>> {
    let dim = sample.dimension();
    if sample.is_empty() {
        return Ok(Vec::new());
    }
    if dim != model.input_dimension() {
        return Err(Error::Validation(format!(
            "model '{}' expects dimension {}, sample has {}",
            model.name(),
            model.input_dimension(),
            dim
        )));
    }
    let chunks: Vec<Vec<f64>> = sample
        .as_flat()
        .par_chunks(EVAL_CHUNK * dim)
        .map(|chunk| {
            let part = Sample::from_flat(dim, chunk.to_vec())?;
            model.evaluate_batch(&part)
        })
        .collect::<Result<Vec<_>>>()?;
    let out: Vec<f64> = chunks.into_iter().flatten().collect();
    if out.len() != sample.len() {
        return Err(Error::Computation(format!(
            "model '{}' returned {} outputs for {} points",
            model.name(),
            out.len(),
            sample.len()
        )));
    }
    Ok(out)
}

/// A threshold event over a random input: `model(X) op threshold`, `X ~ distribution`.
///
/// Read-only to the engine. Cheap to clone (shared handles).
#[derive(Clone)]
pub struct ThresholdEvent {
    distribution: Arc<dyn Distribution>,
    model: Arc<dyn Model>,
    operator: ComparisonOperator,
    threshold: f64,
}

impl ThresholdEvent {
    /// Build an event. Distribution and model dimensions must agree.
    pub fn new(
        distribution: Arc<dyn Distribution>,
        model: Arc<dyn Model>,
        operator: ComparisonOperator,
        threshold: f64,
    ) -> Result<Self> {
        if distribution.dimension() != model.input_dimension() {
            return Err(Error::Validation(format!(
                "distribution dimension {} != model input dimension {}",
                distribution.dimension(),
                model.input_dimension()
            )));
        }
        if !threshold.is_finite() {
            return Err(Error::Validation(format!("threshold must be finite, got {}", threshold)));
        }
        Ok(Self { distribution, model, operator, threshold })
    }

    /// Input (antecedent) distribution.
    pub fn distribution(&self) -> &Arc<dyn Distribution> {
        &self.distribution
    }

    /// Limit-state model.
    pub fn model(&self) -> &Arc<dyn Model> {
        &self.model
    }

    /// Comparison operator.
    pub fn operator(&self) -> ComparisonOperator {
        self.operator
    }

    /// Target threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Input dimension.
    pub fn dimension(&self) -> usize {
        self.distribution.dimension()
    }

    /// `true` when `value op threshold`.
    #[inline]
    pub fn occurs(&self, value: f64) -> bool {
        self.operator.compare(value, self.threshold)
    }

    /// Model outputs for physical-space points.
    pub fn evaluate(&self, sample: &Sample) -> Result<Vec<f64>> {
        evaluate_parallel(self.model.as_ref(), sample)
    }

    /// Model output at one standard-space point.
    pub fn evaluate_standard_point(&self, u: &[f64]) -> Result<f64> {
        let x = self.distribution.from_standard(u)?;
        self.model.evaluate(&x)
    }

    /// Model outputs for standard-space points.
    pub fn evaluate_standard(&self, sample: &Sample) -> Result<Vec<f64>> {
        let physical = ns_prob::sample_from_standard(self.distribution.as_ref(), sample)?;
        self.evaluate(&physical)
    }
}

impl fmt::Debug for ThresholdEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ThresholdEvent({} {} {}, X ~ {})",
            self.model.name(),
            self.operator.symbol(),
            self.threshold,
            self.distribution.name()
        )
    }
}
