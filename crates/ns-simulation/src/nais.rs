//! Non-parametric adaptive importance sampling (NAIS).
//!
//! The auxiliary density starts at the input distribution and is replaced at every
//! stage by a weighted Gaussian kernel mixture centred on the critical points. The
//! staged loop is the cross-entropy one.

use std::sync::Arc;

use ns_core::{Error, Result, Sample};
use ns_prob::{Distribution, Mixture, Normal};

use crate::adaptive::{normalised_weights, weighted_moments};
use crate::cross_entropy::{
    AuxiliaryDensityUpdate, CrossEntropyImportanceSampling, CrossEntropyResult, SamplingSpace,
};
use crate::event::ThresholdEvent;

/// NAIS estimator.
pub type Nais = CrossEntropyImportanceSampling<NaisUpdate>;
/// Result of a NAIS run.
pub type NaisResult = CrossEntropyResult;

/// Kernel-mixture refit in the physical space.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaisUpdate;

/// Silverman factor `(n_eff (d + 2) / 4)^(-1 / (d + 4))`.
pub fn silverman_factor(effective_size: f64, dimension: usize) -> f64 {
    let d = dimension as f64;
    (effective_size * (d + 2.0) / 4.0).powf(-1.0 / (d + 4.0))
}

/// Effective sample size `(sum w)^2 / sum w^2`.
pub fn effective_sample_size(weights: &[f64]) -> f64 {
    let s: f64 = weights.iter().sum();
    let s2: f64 = weights.iter().map(|w| w * w).sum();
    if s2 > 0.0 { s * s / s2 } else { 0.0 }
}

impl AuxiliaryDensityUpdate for NaisUpdate {
    fn space(&self) -> SamplingSpace {
        SamplingSpace::Physical
    }

    fn initial(&self, event: &ThresholdEvent) -> Result<Arc<dyn Distribution>> {
        Ok(event.distribution().clone())
    }

    fn refit(
        &self,
        _current: &Arc<dyn Distribution>,
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
        let w = normalised_weights(log_weights)?;
        let d = critical.dimension();
        let (_, var) = weighted_moments(critical, &w);
        let factor = silverman_factor(effective_sample_size(&w), d);
        let bandwidth: Vec<f64> = var.iter().map(|v| v.sqrt() * factor).collect();
        if let Some(k) = bandwidth.iter().position(|h| !(h.is_finite() && *h > 0.0)) {
            return Err(Error::Computation(format!(
                "degenerate kernel bandwidth in coordinate {} over {} critical points",
                k,
                critical.len()
            )));
        }
        log::debug!(
            "nais refit: {} kernels, n_eff={:.1}",
            critical.len(),
            effective_sample_size(&w)
        );

        let kernels = critical
            .rows()
            .map(|x| {
                Ok(Arc::new(Normal::new(x.to_vec(), bandwidth.clone())?) as Arc<dyn Distribution>)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Arc::new(Mixture::new(kernels, w)?))
    }

    fn name(&self) -> &'static str {
        "nais"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cross_entropy::CrossEntropyConfig;
    use approx::assert_relative_eq;
    use ns_core::{ComparisonOperator, FnModel, Model};
    use ns_prob::math::std_normal_cdf;

    #[test]
    fn test_silverman_and_effective_size() {
        assert_relative_eq!(effective_sample_size(&[1.0; 8]), 8.0);
        assert_relative_eq!(effective_sample_size(&[1.0, 0.0, 0.0]), 1.0);
        // d = 1: (3n/4)^(-1/5).
        assert_relative_eq!(silverman_factor(100.0, 1), 75f64.powf(-0.2), epsilon = 1e-12);
    }

    #[test]
    fn test_refit_is_kernel_mixture() {
        let critical = Sample::from_rows(&[vec![-1.0], vec![1.0]]).unwrap();
        let current: Arc<dyn Distribution> = Arc::new(Normal::standard(1).unwrap());
        let q = NaisUpdate.refit(&current, &critical, &[0.0, 0.0]).unwrap();
        let h = silverman_factor(2.0, 1);
        let direct = 0.5 * Normal::new(vec![-1.0], vec![h]).unwrap().pdf(&[0.3])
            + 0.5 * Normal::new(vec![1.0], vec![h]).unwrap().pdf(&[0.3]);
        assert_relative_eq!(q.pdf(&[0.3]), direct, epsilon = 1e-12);
    }

    #[test]
    fn test_linear_limit_state() {
        let beta = 3.0;
        let d: Arc<dyn Distribution> = Arc::new(Normal::standard(2).unwrap());
        let m: Arc<dyn Model> =
            Arc::new(FnModel::new(2, move |x: &[f64]| beta - (x[0] + x[1]) / 2f64.sqrt()));
        let event = ThresholdEvent::new(d, m, ComparisonOperator::Less, 0.0).unwrap();
        let cfg =
            CrossEntropyConfig { block_size: 100, max_outer_sampling: 20, ..Default::default() };
        let r: NaisResult = Nais::new(event, NaisUpdate, cfg).unwrap().run().unwrap();
        let exact = std_normal_cdf(-beta);
        assert!(r.target_reached);
        assert!(
            ((r.probability_estimate - exact) / exact).abs() < 0.3,
            "p={} exact={}",
            r.probability_estimate,
            exact
        );
        assert!(r.auxiliary_distribution().name().starts_with("Mixture"));
    }
}
