//! Core traits for NextStat
//!
//! This module defines the seams between the simulation engine and its
//! collaborators: the engine (ns-simulation) only sees a [`Model`] that maps
//! points to scalar outputs, never a concrete limit-state implementation.

use crate::{Result, Sample};

/// Limit-state / model function: a pure map from input points to a scalar output.
///
/// Implementations must be safe to call concurrently; samplers evaluate blocks
/// in parallel chunks through [`Model::evaluate_batch`].
pub trait Model: Send + Sync {
    /// Input dimension.
    fn input_dimension(&self) -> usize;

    /// Evaluate at a single point.
    fn evaluate(&self, point: &[f64]) -> Result<f64>;

    /// Evaluate a whole sample. Output order follows row order.
    fn evaluate_batch(&self, sample: &Sample) -> Result<Vec<f64>> {
        sample.rows().map(|r| self.evaluate(r)).collect()
    }

    /// Model name (used in logs).
    fn name(&self) -> &str {
        "model"
    }
}

/// Adapter turning a closure into a [`Model`].
pub struct FnModel<F> {
    dimension: usize,
    name: String,
    f: F,
}

impl<F> FnModel<F>
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    /// Wrap `f` as a model of the given input dimension.
    pub fn new(dimension: usize, f: F) -> Self {
        Self { dimension, name: "fn-model".to_string(), f }
    }

    /// Set the name reported in logs.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl<F> Model for FnModel<F>
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    fn input_dimension(&self) -> usize {
        self.dimension
    }

    fn evaluate(&self, point: &[f64]) -> Result<f64> {
        if point.len() != self.dimension {
            return Err(crate::Error::Validation(format!(
                "model '{}' expects dimension {}, got {}",
                self.name,
                self.dimension,
                point.len()
            )));
        }
        Ok((self.f)(point))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_model_batch() {
        let m = FnModel::new(2, |x: &[f64]| x[0] - x[1]).with_name("r-s");
        assert_eq!(m.name(), "r-s");
        let s = Sample::from_rows(&[vec![3.0, 1.0], vec![1.0, 3.0]]).unwrap();
        assert_eq!(m.evaluate_batch(&s).unwrap(), vec![2.0, -2.0]);
    }

    #[test]
    fn test_fn_model_dimension_check() {
        let m = FnModel::new(2, |x: &[f64]| x[0]);
        assert!(m.evaluate(&[1.0]).is_err());
    }
}
