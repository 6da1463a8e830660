use std::sync::Arc;

use ns_core::{Error, Result, Sample};
use ns_prob::{Distribution, Normal};

use super::{AuxiliaryDensityUpdate, SamplingSpace};
use crate::adaptive::{normalised_weights, weighted_moments};
use crate::event::ThresholdEvent;

/// Independent Normal auxiliary density in the standard space.
///
/// Stage 0 is the standard Normal; each refit takes the weighted mean and standard
/// deviation of the critical points, coordinate by coordinate.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardSpaceUpdate;

impl AuxiliaryDensityUpdate for StandardSpaceUpdate {
    fn space(&self) -> SamplingSpace {
        SamplingSpace::Standard
    }

    fn initial(&self, event: &ThresholdEvent) -> Result<Arc<dyn Distribution>> {
        Ok(Arc::new(Normal::standard(event.dimension())?))
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
        let (mean, var) = weighted_moments(critical, &w);
        let sigma: Vec<f64> = var.iter().map(|v| v.sqrt()).collect();
        if let Some(k) = sigma.iter().position(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(Error::Computation(format!(
                "degenerate auxiliary density: zero spread in coordinate {} ({} critical points)",
                k,
                critical.len()
            )));
        }
        Ok(Arc::new(Normal::new(mean, sigma)?))
    }

    fn name(&self) -> &'static str {
        "standard-space-cross-entropy"
    }
}
