//! Crude sampling with Monte-Carlo, randomized LHS or randomized QMC experiments.

use std::fmt;
use std::sync::Arc;

use ns_core::{ComparisonOperator, Error, Model, Result, Sample};
use ns_prob::Distribution;
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand_distr::{Distribution as _, Open01};
use serde::{Deserialize, Serialize};

use super::{Block, BlockSampler};
use crate::event::{ThresholdEvent, evaluate_parallel};

/// How the inputs of a crude block are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Experiment {
    /// Independent draws from the input distribution.
    #[default]
    MonteCarlo,
    /// Randomized Latin hypercube: per block, per coordinate, a random permutation
    /// of the strata plus uniform jitter inside each stratum.
    Lhs,
    /// Halton sequence with one Cranley-Patterson random shift per run. The
    /// sequence position carries over from one block to the next.
    Qmc,
}

/// Halton low-discrepancy sequence on `(0, 1)^d`.
#[derive(Debug, Clone)]
struct HaltonSequence {
    primes: Vec<u64>,
    index: u64,
    shift: Option<Vec<f64>>,
}

impl HaltonSequence {
    fn new(dimension: usize) -> Self {
        Self { primes: first_primes(dimension), index: 0, shift: None }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.shift = None;
    }

    fn next_point<R: Rng + ?Sized>(&mut self, rng: &mut R, out: &mut [f64]) {
        let d = self.primes.len();
        let shift = self
            .shift
            .get_or_insert_with(|| (0..d).map(|_| Open01.sample(rng)).collect::<Vec<f64>>());
        self.index += 1;
        for (k, x) in out.iter_mut().enumerate() {
            let v = (radical_inverse(self.index, self.primes[k]) + shift[k]).fract();
            *x = v.clamp(f64::EPSILON, 1.0 - f64::EPSILON);
        }
    }
}

fn radical_inverse(mut i: u64, base: u64) -> f64 {
    let inv = 1.0 / base as f64;
    let mut f = inv;
    let mut r = 0.0;
    while i > 0 {
        r += f * (i % base) as f64;
        i /= base;
        f *= inv;
    }
    r
}

fn first_primes(n: usize) -> Vec<u64> {
    let mut primes: Vec<u64> = Vec::with_capacity(n);
    let mut c = 2u64;
    while primes.len() < n {
        if primes.iter().take_while(|&&p| p * p <= c).all(|&p| c % p != 0) {
            primes.push(c);
        }
        c += 1;
    }
    primes
}

/// Crude estimator of `P(event)` (indicator contributions) or of `E[g(X)]`
/// (raw output contributions).
#[derive(Clone)]
pub struct CrudeSampler {
    distribution: Arc<dyn Distribution>,
    model: Arc<dyn Model>,
    event: Option<(ComparisonOperator, f64)>,
    experiment: Experiment,
    halton: HaltonSequence,
}

impl CrudeSampler {
    /// Sampler of the event indicator.
    pub fn new(event: &ThresholdEvent, experiment: Experiment) -> Result<Self> {
        let mut s =
            Self::expectation(event.distribution().clone(), event.model().clone(), experiment)?;
        s.event = Some((event.operator(), event.threshold()));
        Ok(s)
    }

    /// Sampler of the raw model output.
    pub fn expectation(
        distribution: Arc<dyn Distribution>,
        model: Arc<dyn Model>,
        experiment: Experiment,
    ) -> Result<Self> {
        let d = distribution.dimension();
        if d != model.input_dimension() {
            return Err(Error::Validation(format!(
                "distribution dimension {} != model input dimension {}",
                d,
                model.input_dimension()
            )));
        }
        if experiment != Experiment::MonteCarlo {
            distribution.from_unit_cube(&vec![0.5; d]).map_err(|e| {
                Error::Validation(format!(
                    "{:?} experiment needs an inverse-CDF map for {}: {}",
                    experiment,
                    distribution.name(),
                    e
                ))
            })?;
        }
        Ok(Self { distribution, model, event: None, experiment, halton: HaltonSequence::new(d) })
    }

    /// Experiment in use.
    pub fn experiment(&self) -> Experiment {
        self.experiment
    }

    fn draw_inputs(&mut self, size: usize, rng: &mut StdRng) -> Result<Sample> {
        let d = self.distribution.dimension();
        match self.experiment {
            Experiment::MonteCarlo => Ok(self.distribution.sample(rng, size)),
            Experiment::Lhs => {
                let mut cube = vec![0.0; size * d];
                let mut perm: Vec<usize> = (0..size).collect();
                for k in 0..d {
                    perm.shuffle(rng);
                    for (i, &stratum) in perm.iter().enumerate() {
                        let jitter: f64 = Open01.sample(rng);
                        cube[i * d + k] = (stratum as f64 + jitter) / size as f64;
                    }
                }
                self.map_cube(&cube, size)
            }
            Experiment::Qmc => {
                let mut cube = vec![0.0; size * d];
                for row in cube.chunks_exact_mut(d) {
                    self.halton.next_point(rng, row);
                }
                self.map_cube(&cube, size)
            }
        }
    }

    fn map_cube(&self, cube: &[f64], size: usize) -> Result<Sample> {
        let d = self.distribution.dimension();
        let mut out = Sample::with_capacity(d, size);
        for v in cube.chunks_exact(d) {
            out.push(&self.distribution.from_unit_cube(v)?);
        }
        Ok(out)
    }
}

impl BlockSampler for CrudeSampler {
    fn compute_block(&mut self, size: usize, rng: &mut StdRng) -> Result<Block> {
        let inputs = self.draw_inputs(size, rng)?;
        let outputs = evaluate_parallel(self.model.as_ref(), &inputs)?;
        let contributions = match self.event {
            Some((op, t)) => {
                outputs.iter().map(|&y| if op.compare(y, t) { 1.0 } else { 0.0 }).collect()
            }
            None => outputs.clone(),
        };
        Ok(Block { inputs, outputs, weights: None, contributions })
    }

    fn reset(&mut self) {
        self.halton.reset();
    }

    fn name(&self) -> &'static str {
        match self.experiment {
            Experiment::MonteCarlo => "monte-carlo",
            Experiment::Lhs => "lhs",
            Experiment::Qmc => "qmc",
        }
    }
}

impl fmt::Debug for CrudeSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrudeSampler")
            .field("distribution", &self.distribution.name())
            .field("model", &self.model.name())
            .field("event", &self.event)
            .field("experiment", &self.experiment)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::block_rng;
    use ns_core::FnModel;
    use ns_prob::{ComposedDistribution, Marginal, Mixture, Normal};

    fn uniform_event(op: ComparisonOperator, t: f64) -> ThresholdEvent {
        let d: Arc<dyn Distribution> = Arc::new(
            ComposedDistribution::new(vec![Marginal::uniform(0.0, 1.0).unwrap(); 2]).unwrap(),
        );
        let m: Arc<dyn Model> = Arc::new(FnModel::new(2, |x: &[f64]| x[0] + x[1]));
        ThresholdEvent::new(d, m, op, t).unwrap()
    }

    #[test]
    fn test_radical_inverse() {
        assert_eq!(radical_inverse(1, 2), 0.5);
        assert_eq!(radical_inverse(3, 2), 0.75);
        assert!((radical_inverse(5, 3) - (2.0 / 3.0 + 1.0 / 9.0)).abs() < 1e-15);
        assert_eq!(first_primes(5), vec![2, 3, 5, 7, 11]);
    }

    #[test]
    fn test_block_has_requested_size_and_indicators() {
        let e = uniform_event(ComparisonOperator::Less, 1.0);
        let mut s = CrudeSampler::new(&e, Experiment::MonteCarlo).unwrap();
        let b = s.compute_block(64, &mut block_rng(3, 0)).unwrap();
        assert_eq!(b.len(), 64);
        assert_eq!(b.inputs.len(), 64);
        assert!(b.contributions.iter().all(|&c| c == 0.0 || c == 1.0));
        assert!(b.weights.is_none());
    }

    #[test]
    fn test_lhs_one_point_per_stratum() {
        let e = uniform_event(ComparisonOperator::Less, 1.0);
        let mut s = CrudeSampler::new(&e, Experiment::Lhs).unwrap();
        let n = 50;
        let b = s.compute_block(n, &mut block_rng(4, 0)).unwrap();
        for k in 0..2 {
            let mut strata: Vec<usize> =
                b.inputs.rows().map(|r| (r[k] * n as f64) as usize).collect();
            strata.sort_unstable();
            assert_eq!(strata, (0..n).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_qmc_sequence_continues_across_blocks_and_resets() {
        let e = uniform_event(ComparisonOperator::Less, 1.0);
        let mut s = CrudeSampler::new(&e, Experiment::Qmc).unwrap();
        let a = s.compute_block(4, &mut block_rng(5, 0)).unwrap();
        let b = s.compute_block(4, &mut block_rng(5, 1)).unwrap();
        assert_ne!(a.inputs, b.inputs);
        s.reset();
        let c = s.compute_block(4, &mut block_rng(5, 0)).unwrap();
        assert_eq!(a.inputs, c.inputs);
    }

    #[test]
    fn test_expectation_contributions_are_outputs() {
        let e = uniform_event(ComparisonOperator::Less, 1.0);
        let (d, m) = (e.distribution().clone(), e.model().clone());
        let mut s = CrudeSampler::expectation(d, m, Experiment::MonteCarlo).unwrap();
        let b = s.compute_block(10, &mut block_rng(6, 0)).unwrap();
        assert_eq!(b.outputs, b.contributions);
    }

    #[test]
    fn test_lhs_requires_inverse_cdf() {
        let c: Arc<dyn Distribution> = Arc::new(Normal::standard(1).unwrap());
        let mix: Arc<dyn Distribution> = Arc::new(Mixture::new(vec![c], vec![1.0]).unwrap());
        let m: Arc<dyn Model> = Arc::new(FnModel::new(1, |x: &[f64]| x[0]));
        assert!(CrudeSampler::expectation(mix.clone(), m.clone(), Experiment::Lhs).is_err());
        assert!(CrudeSampler::expectation(mix, m, Experiment::MonteCarlo).is_ok());
    }
}
