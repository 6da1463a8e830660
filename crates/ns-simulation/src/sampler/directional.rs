//! Directional sampling in the standard space.
//!
//! A realization is a set of unit directions (see [`SamplingStrategy`]). Along
//! each direction `a` the limit state is searched for roots `r_1 < r_2 < ...` of
//! `g(T^-1(r a)) - t`, and the direction contributes the radial mass of the
//! event segments, with `P(R > r) = P(chi2_d > r^2)`. The realization value is
//! the mean over its directions.

use ns_core::{Error, Result, Sample};
use rand::rngs::StdRng;
use rayon::prelude::*;
use statrs::distribution::{ChiSquared, ContinuousCDF};

use super::{Block, BlockSampler};
use crate::event::ThresholdEvent;
use crate::root_strategy::RootStrategy;
use crate::sampling_strategy::SamplingStrategy;

/// Radial mass of the event along one ray.
///
/// Shared with the adaptive directional stratification.
#[derive(Debug, Clone)]
pub(crate) struct RadialSearch {
    event: ThresholdEvent,
    root_strategy: RootStrategy,
    radial: ChiSquared,
}

impl RadialSearch {
    pub(crate) fn new(event: ThresholdEvent, root_strategy: RootStrategy) -> Result<Self> {
        root_strategy.validate()?;
        let d = event.dimension();
        event.distribution().from_standard(&vec![0.0; d]).map_err(|e| {
            Error::Validation(format!(
                "directional sampling needs a standard-space transform for {}: {}",
                event.distribution().name(),
                e
            ))
        })?;
        let radial = ChiSquared::new(d as f64)
            .map_err(|e| Error::Validation(format!("radial law for dimension {}: {}", d, e)))?;
        Ok(Self { event, root_strategy, radial })
    }

    pub(crate) fn event(&self) -> &ThresholdEvent {
        &self.event
    }

    /// Model output at the standard-space origin, minus the threshold.
    pub(crate) fn origin_value(&self) -> Result<f64> {
        let d = self.event.dimension();
        Ok(self.event.evaluate_standard_point(&vec![0.0; d])? - self.event.threshold())
    }

    /// Event mass along `direction` (unit norm), given the origin value.
    pub(crate) fn mass(&self, direction: &[f64], origin: f64) -> Result<f64> {
        let t = self.event.threshold();
        let mut point = vec![0.0; direction.len()];
        let f = |r: f64| -> Result<f64> {
            for (p, &a) in point.iter_mut().zip(direction) {
                *p = r * a;
            }
            Ok(self.event.evaluate_standard_point(&point)? - t)
        };
        let roots = self.root_strategy.solve(f, origin)?;
        let inside = self.event.occurs(origin + t);
        let (mut mass, mut sign) = if inside { (1.0, -1.0) } else { (0.0, 1.0) };
        for r in roots {
            mass += sign * self.radial.sf(r * r);
            sign = -sign;
        }
        Ok(mass.clamp(0.0, 1.0))
    }

    /// Masses of many directions, evaluated in parallel. Order follows input order.
    pub(crate) fn masses(&self, directions: &[Vec<f64>], origin: f64) -> Result<Vec<f64>> {
        directions.par_iter().map(|a| self.mass(a, origin)).collect()
    }
}

/// Block sampler of the directional estimator.
#[derive(Debug, Clone)]
pub struct DirectionalSampler {
    search: RadialSearch,
    sampling_strategy: SamplingStrategy,
    origin: Option<f64>,
}

impl DirectionalSampler {
    /// Build from an event whose distribution supports the standard-space transform.
    pub fn new(
        event: ThresholdEvent,
        root_strategy: RootStrategy,
        sampling_strategy: SamplingStrategy,
    ) -> Result<Self> {
        sampling_strategy.validate(event.dimension())?;
        let search = RadialSearch::new(event, root_strategy)?;
        Ok(Self { search, sampling_strategy, origin: None })
    }

    /// Root strategy in use.
    pub fn root_strategy(&self) -> &RootStrategy {
        &self.search.root_strategy
    }

    /// Direction strategy in use.
    pub fn sampling_strategy(&self) -> SamplingStrategy {
        self.sampling_strategy
    }

    fn origin(&mut self) -> Result<f64> {
        match self.origin {
            Some(v) => Ok(v),
            None => {
                let v = self.search.origin_value()?;
                self.origin = Some(v);
                Ok(v)
            }
        }
    }
}

impl BlockSampler for DirectionalSampler {
    fn compute_block(&mut self, size: usize, rng: &mut StdRng) -> Result<Block> {
        let d = self.search.event().dimension();
        let origin = self.origin()?;

        let sets: Vec<Vec<Vec<f64>>> =
            (0..size).map(|_| self.sampling_strategy.generate(d, rng)).collect();
        let flat: Vec<Vec<f64>> = sets.iter().flatten().cloned().collect();
        let masses = self.search.masses(&flat, origin)?;

        let mut inputs = Sample::with_capacity(d, size);
        let mut contributions = Vec::with_capacity(size);
        let mut offset = 0;
        for set in &sets {
            let n = set.len();
            let m = masses[offset..offset + n].iter().sum::<f64>() / n as f64;
            offset += n;
            inputs.push(&set[0]);
            contributions.push(m);
        }
        Ok(Block { inputs, outputs: contributions.clone(), weights: None, contributions })
    }

    fn reset(&mut self) {
        self.origin = None;
    }

    fn name(&self) -> &'static str {
        "directional-sampling"
    }
}
