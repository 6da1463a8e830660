use std::sync::Arc;

use ns_core::{Error, Result, Sample};
use ns_prob::Distribution;

use super::{AuxiliaryDensityUpdate, SamplingSpace};
use crate::adaptive::normalised_weights;
use crate::event::ThresholdEvent;
use crate::optimizer::{LbfgsbOptimizer, ObjectiveFunction, OptimizerConfig};

/// Parametric auxiliary density in the physical space.
///
/// The refit maximises the weighted log-likelihood of the critical points over
/// `active_parameters` (indices into [`Distribution::parameters`]) inside `bounds`.
/// Inactive parameters keep their initial values.
#[derive(Debug, Clone)]
pub struct PhysicalSpaceUpdate {
    auxiliary: Arc<dyn Distribution>,
    active_parameters: Vec<usize>,
    bounds: Vec<(f64, f64)>,
    optimizer: OptimizerConfig,
}

impl PhysicalSpaceUpdate {
    /// Update starting from `auxiliary`, one `(lo, hi)` bound per active parameter.
    pub fn new(
        auxiliary: Arc<dyn Distribution>,
        active_parameters: Vec<usize>,
        bounds: Vec<(f64, f64)>,
    ) -> Result<Self> {
        let n_params = auxiliary.parameters().len();
        if active_parameters.is_empty() {
            return Err(Error::Validation("at least one active parameter is required".into()));
        }
        if let Some(&i) = active_parameters.iter().find(|&&i| i >= n_params) {
            return Err(Error::Validation(format!(
                "active parameter {} out of range ({} has {} parameters)",
                i,
                auxiliary.name(),
                n_params
            )));
        }
        if active_parameters.len() != bounds.len() {
            return Err(Error::Validation(format!(
                "{} active parameters but {} bounds",
                active_parameters.len(),
                bounds.len()
            )));
        }
        if let Some(k) = bounds.iter().position(|(lo, hi)| !(lo <= hi)) {
            return Err(Error::Validation(format!(
                "empty bound interval for active parameter {}",
                k
            )));
        }
        Ok(Self { auxiliary, active_parameters, bounds, optimizer: OptimizerConfig::default() })
    }

    /// Replace the optimizer settings.
    pub fn with_optimizer_config(mut self, config: OptimizerConfig) -> Result<Self> {
        config.validate()?;
        self.optimizer = config;
        Ok(self)
    }

    /// Indices of the refitted parameters.
    pub fn active_parameters(&self) -> &[usize] {
        &self.active_parameters
    }

    /// Bounds of the active parameters.
    pub fn bounds(&self) -> &[(f64, f64)] {
        &self.bounds
    }
}

/// `-sum_i w_i log q_theta(x_i)` with normalised weights.
struct WeightedNegLogLikelihood<'a> {
    template: &'a Arc<dyn Distribution>,
    full: Vec<f64>,
    active: &'a [usize],
    critical: &'a Sample,
    weights: Vec<f64>,
}

impl WeightedNegLogLikelihood<'_> {
    fn distribution(&self, active_values: &[f64]) -> Result<Arc<dyn Distribution>> {
        let mut theta = self.full.clone();
        for (&i, &v) in self.active.iter().zip(active_values) {
            theta[i] = v;
        }
        self.template.with_parameters(&theta)
    }
}

impl ObjectiveFunction for WeightedNegLogLikelihood<'_> {
    fn eval(&self, params: &[f64]) -> Result<f64> {
        let q = self.distribution(params)?;
        Ok(-self.critical.rows().zip(&self.weights).map(|(x, w)| w * q.log_pdf(x)).sum::<f64>())
    }
}

impl AuxiliaryDensityUpdate for PhysicalSpaceUpdate {
    fn space(&self) -> SamplingSpace {
        SamplingSpace::Physical
    }

    fn initial(&self, event: &ThresholdEvent) -> Result<Arc<dyn Distribution>> {
        if self.auxiliary.dimension() != event.dimension() {
            return Err(Error::Validation(format!(
                "auxiliary dimension {} != event dimension {}",
                self.auxiliary.dimension(),
                event.dimension()
            )));
        }
        Ok(self.auxiliary.clone())
    }

    fn refit(
        &self,
        current: &Arc<dyn Distribution>,
        critical: &Sample,
        log_weights: &[f64],
    ) -> Result<Arc<dyn Distribution>> {
        if critical.len() != log_weights.len() {
            return Err(Error::Validation(format!(
                "{} critical points but {} weights",
                critical.len(),
                log_weights.len()
            )));
        }
        let full = current.parameters();
        let init: Vec<f64> = self.active_parameters.iter().map(|&i| full[i]).collect();
        let objective = WeightedNegLogLikelihood {
            template: current,
            full,
            active: &self.active_parameters,
            critical,
            weights: normalised_weights(log_weights)?,
        };
        let fit =
            LbfgsbOptimizer::new(self.optimizer.clone()).minimize(&objective, &init, &self.bounds)?;
        if !fit.converged {
            log::debug!("physical-space refit stopped early: {}", fit.message);
        }
        objective.distribution(&fit.parameters)
    }

    fn name(&self) -> &'static str {
        "physical-space-cross-entropy"
    }
}
