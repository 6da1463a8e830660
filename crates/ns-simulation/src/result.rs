//! Results of single-stage driver runs.

use ns_core::{DerivedValue, Error, Result};
use ns_prob::math::std_normal_quantile;
use serde::{Deserialize, Serialize};

use crate::estimator::RunningEstimate;
use crate::stopping::Termination;

/// Half-width multiplier of a two-sided Normal interval at `level`.
fn two_sided_z(level: f64) -> Result<f64> {
    if !(level > 0.0 && level < 1.0) {
        return Err(Error::Validation(format!("confidence level must be in (0, 1), got {}", level)));
    }
    Ok(std_normal_quantile(0.5 + 0.5 * level))
}

fn coefficient_of_variation(estimate: f64, variance: f64) -> DerivedValue {
    if estimate == 0.0 || !estimate.is_finite() || !variance.is_finite() {
        return DerivedValue::Undefinable;
    }
    DerivedValue::Defined(variance.max(0.0).sqrt() / estimate.abs())
}

/// Probability estimate of a threshold event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilitySimulationResult {
    /// Estimated probability.
    pub probability_estimate: f64,
    /// Variance of the estimator.
    pub variance_estimate: f64,
    /// Number of blocks drawn.
    pub outer_sampling: usize,
    /// Realizations per block.
    pub block_size: usize,
    /// Stopping condition that ended the run.
    pub termination: Termination,
}

impl ProbabilitySimulationResult {
    pub(crate) fn from_estimate(estimate: &RunningEstimate, termination: Termination) -> Self {
        Self {
            probability_estimate: estimate.mean,
            variance_estimate: estimate.variance,
            outer_sampling: estimate.outer_sampling,
            block_size: estimate.block_size,
            termination,
        }
    }

    /// `sd / p`; undefinable when the estimate is zero.
    pub fn coefficient_of_variation(&self) -> DerivedValue {
        coefficient_of_variation(self.probability_estimate, self.variance_estimate)
    }

    /// Standard deviation of the estimator.
    pub fn standard_deviation(&self) -> f64 {
        self.variance_estimate.max(0.0).sqrt()
    }

    /// Length of the two-sided Normal confidence interval at `level`.
    pub fn confidence_length(&self, level: f64) -> Result<f64> {
        Ok(2.0 * two_sided_z(level)? * self.standard_deviation())
    }

    /// Total number of realizations.
    pub fn sample_size(&self) -> usize {
        self.outer_sampling * self.block_size
    }
}

/// Mean estimate of a scalar model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectationSimulationResult {
    /// Estimated mean.
    pub mean: f64,
    /// Variance of the estimator.
    pub variance_estimate: f64,
    /// Number of blocks drawn.
    pub outer_sampling: usize,
    /// Realizations per block.
    pub block_size: usize,
    /// Stopping condition that ended the run.
    pub termination: Termination,
}

impl ExpectationSimulationResult {
    pub(crate) fn from_estimate(estimate: &RunningEstimate, termination: Termination) -> Self {
        Self {
            mean: estimate.mean,
            variance_estimate: estimate.variance,
            outer_sampling: estimate.outer_sampling,
            block_size: estimate.block_size,
            termination,
        }
    }

    /// `sd / |mean|`; undefinable for a zero mean.
    pub fn coefficient_of_variation(&self) -> DerivedValue {
        coefficient_of_variation(self.mean, self.variance_estimate)
    }

    /// Standard deviation of the estimator.
    pub fn standard_deviation(&self) -> f64 {
        self.variance_estimate.max(0.0).sqrt()
    }

    /// Length of the two-sided Normal confidence interval at `level`.
    pub fn confidence_length(&self, level: f64) -> Result<f64> {
        Ok(2.0 * two_sided_z(level)? * self.standard_deviation())
    }
}
