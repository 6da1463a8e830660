//! Finite mixtures of distributions.

use std::sync::Arc;

use ns_core::{Error, Result, Sample};
use rand::RngCore;
use rand_distr::{Distribution as _, Open01};

use crate::distribution::{Distribution, check_parameter_count};
use crate::math::log_sum_exp;

/// Weighted mixture `Σ w_i f_i(x)` of distributions sharing one dimension.
///
/// Weights are normalised on construction. Parameters are the weights followed
/// by every component's parameters, in component order.
#[derive(Debug, Clone)]
pub struct Mixture {
    components: Vec<Arc<dyn Distribution>>,
    weights: Vec<f64>,
    log_weights: Vec<f64>,
    cumulative: Vec<f64>,
}

impl Mixture {
    /// Build a mixture. Weights must be finite, non-negative and not all zero.
    pub fn new(components: Vec<Arc<dyn Distribution>>, weights: Vec<f64>) -> Result<Self> {
        if components.is_empty() {
            return Err(Error::Validation("Mixture needs at least one component".into()));
        }
        if components.len() != weights.len() {
            return Err(Error::Validation(format!(
                "Mixture: {} components but {} weights",
                components.len(),
                weights.len()
            )));
        }
        let dim = components[0].dimension();
        if components.iter().any(|c| c.dimension() != dim) {
            return Err(Error::Validation("Mixture components must share a dimension".into()));
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::Validation("Mixture weights must be finite and >= 0".into()));
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(Error::Validation("Mixture weights sum to zero".into()));
        }
        let weights: Vec<f64> = weights.iter().map(|w| w / total).collect();
        let log_weights = weights.iter().map(|w| w.ln()).collect();
        let mut cumulative = Vec::with_capacity(weights.len());
        let mut acc = 0.0;
        for w in &weights {
            acc += w;
            cumulative.push(acc);
        }
        Ok(Self { components, weights, log_weights, cumulative })
    }

    /// Normalised weights.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Components.
    pub fn components(&self) -> &[Arc<dyn Distribution>] {
        &self.components
    }

    fn pick(&self, v: f64) -> usize {
        let i = self.cumulative.partition_point(|&c| c < v);
        i.min(self.components.len() - 1)
    }
}

impl Distribution for Mixture {
    fn dimension(&self) -> usize {
        self.components[0].dimension()
    }

    fn sample(&self, rng: &mut dyn RngCore, size: usize) -> Sample {
        let mut out = Sample::with_capacity(self.dimension(), size);
        for _ in 0..size {
            let v: f64 = Open01.sample(rng);
            let draw = self.components[self.pick(v)].sample(rng, 1);
            out.push(draw.row(0));
        }
        out
    }

    fn log_pdf(&self, x: &[f64]) -> f64 {
        let terms: Vec<f64> = self
            .components
            .iter()
            .zip(&self.log_weights)
            .map(|(c, lw)| lw + c.log_pdf(x))
            .collect();
        log_sum_exp(&terms)
    }

    fn parameters(&self) -> Vec<f64> {
        let mut p = self.weights.clone();
        for c in &self.components {
            p.extend(c.parameters());
        }
        p
    }

    fn parameter_names(&self) -> Vec<String> {
        let mut names: Vec<String> = (0..self.weights.len()).map(|i| format!("w{}", i)).collect();
        for (i, c) in self.components.iter().enumerate() {
            names.extend(c.parameter_names().into_iter().map(|n| format!("c{}.{}", i, n)));
        }
        names
    }

    fn with_parameters(&self, parameters: &[f64]) -> Result<Arc<dyn Distribution>> {
        let k = self.components.len();
        let expected = k + self.components.iter().map(|c| c.parameters().len()).sum::<usize>();
        check_parameter_count("Mixture", expected, parameters.len())?;
        let mut offset = k;
        let mut components = Vec::with_capacity(k);
        for c in &self.components {
            let n = c.parameters().len();
            components.push(c.with_parameters(&parameters[offset..offset + n])?);
            offset += n;
        }
        Ok(Arc::new(Mixture::new(components, parameters[..k].to_vec())?))
    }

    fn name(&self) -> String {
        format!("Mixture(k={}, dim={})", self.components.len(), self.dimension())
    }
}
