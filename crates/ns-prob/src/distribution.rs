//! The multivariate distribution seam consumed by the simulation engine.
//!
//! Distributions are immutable values shared behind `Arc<dyn Distribution>`.
//! Changing parameters never mutates: [`Distribution::with_parameters`] returns a
//! new distribution, so snapshots held by earlier stages of an adaptive
//! algorithm remain valid.

use std::fmt::Debug;
use std::sync::Arc;

use ns_core::{Error, Result, Sample};
use rand::RngCore;

/// A probability distribution over `R^d`.
pub trait Distribution: Debug + Send + Sync {
    /// Dimension `d` of a realization.
    fn dimension(&self) -> usize;

    /// Draw `size` independent realizations.
    fn sample(&self, rng: &mut dyn RngCore, size: usize) -> Sample;

    /// Log-density at `x` (`-inf` outside the support).
    fn log_pdf(&self, x: &[f64]) -> f64;

    /// Density at `x`.
    fn pdf(&self, x: &[f64]) -> f64 {
        self.log_pdf(x).exp()
    }

    /// Log-density of every point of `sample`, in row order.
    fn log_pdf_sample(&self, sample: &Sample) -> Vec<f64> {
        sample.rows().map(|x| self.log_pdf(x)).collect()
    }

    /// Flat parameter vector.
    fn parameters(&self) -> Vec<f64>;

    /// Names matching [`Distribution::parameters`] one to one.
    fn parameter_names(&self) -> Vec<String>;

    /// A new distribution of the same family with the given parameters.
    fn with_parameters(&self, parameters: &[f64]) -> Result<Arc<dyn Distribution>>;

    /// The `index`-th one-dimensional marginal.
    fn marginal(&self, index: usize) -> Result<Arc<dyn Distribution>> {
        let _ = index;
        Err(Error::NotImplemented(format!("{}: marginal", self.name())))
    }

    /// Iso-probabilistic transform to the standard Normal space.
    fn to_standard(&self, x: &[f64]) -> Result<Vec<f64>> {
        let _ = x;
        Err(Error::NotImplemented(format!("{}: to_standard", self.name())))
    }

    /// Inverse of [`Distribution::to_standard`].
    fn from_standard(&self, u: &[f64]) -> Result<Vec<f64>> {
        let _ = u;
        Err(Error::NotImplemented(format!("{}: from_standard", self.name())))
    }

    /// Component-wise inverse CDF of a point of `(0, 1)^d`.
    fn from_unit_cube(&self, v: &[f64]) -> Result<Vec<f64>> {
        let _ = v;
        Err(Error::NotImplemented(format!("{}: from_unit_cube", self.name())))
    }

    /// Human-readable name (logs, error messages).
    fn name(&self) -> String;
}

pub(crate) fn check_parameter_count(name: &str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(Error::Validation(format!(
            "{} expects {} parameters, got {}",
            name, expected, got
        )));
    }
    Ok(())
}

/// Transform every row of `sample` to the standard space of `dist`.
pub fn sample_to_standard(dist: &dyn Distribution, sample: &Sample) -> Result<Sample> {
    let mut out = Sample::with_capacity(sample.dimension(), sample.len());
    for x in sample.rows() {
        out.push(&dist.to_standard(x)?);
    }
    Ok(out)
}

/// Transform every row of a standard-space `sample` back to the space of `dist`.
pub fn sample_from_standard(dist: &dyn Distribution, sample: &Sample) -> Result<Sample> {
    let mut out = Sample::with_capacity(sample.dimension(), sample.len());
    for u in sample.rows() {
        out.push(&dist.from_standard(u)?);
    }
    Ok(out)
}
