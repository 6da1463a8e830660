//! The streaming-statistics driver loop shared by all single-stage methods.
//!
//! ## Architecture
//!
//! ```text
//! Idle -> Running -> Finished(Converged | MaxOuterSampling | UserStopped | TimeBudget)
//!                 -> Failed (sampler error, propagated to the caller)
//! ```
//!
//! Each iteration draws block `k` from the stream `block_rng(seed, k)`, folds its
//! contributions into the [`RunningEstimator`], appends a snapshot to the
//! [`ConvergenceHistory`], reports progress and evaluates the stopping rules.
//! The history stays readable after a failure.

use std::sync::Arc;
use std::time::Instant;

use ns_core::{Error, Model, Result};
use ns_prob::Distribution;
use serde::{Deserialize, Serialize};

use crate::estimator::{RunningEstimate, RunningEstimator};
use crate::history::ConvergenceHistory;
use crate::result::{ExpectationSimulationResult, ProbabilitySimulationResult};
use crate::rng::block_rng;
use crate::sampler::{BlockSampler, CrudeSampler, EventSampler, Experiment};
use crate::stopping::{Callbacks, StoppingConfig, Termination};

/// Driver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Realizations per block (default 1).
    pub block_size: usize,
    /// Stopping rules.
    #[serde(flatten)]
    pub stopping: StoppingConfig,
    /// Seed of the per-block streams (default 42).
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self { block_size: 1, stopping: StoppingConfig::default(), seed: 42 }
    }
}

impl SimulationConfig {
    /// Validate block size and stopping rules.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::Validation("block_size must be > 0".into()));
        }
        self.stopping.validate()
    }
}

/// Lifecycle of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Not run yet.
    Idle,
    /// Inside `run`.
    Running,
    /// Last run ended normally.
    Finished(Termination),
    /// Last run raised an error.
    Failed,
}

/// Repeatedly draws blocks from a sampler until a stopping rule fires.
#[derive(Debug)]
pub struct SimulationDriver<S: BlockSampler = EventSampler> {
    sampler: S,
    config: SimulationConfig,
    callbacks: Callbacks,
    history: ConvergenceHistory,
    state: DriverState,
}

impl<S: BlockSampler> SimulationDriver<S> {
    /// Driver with the default configuration.
    pub fn new(sampler: S) -> Self {
        Self {
            sampler,
            config: SimulationConfig::default(),
            callbacks: Callbacks::default(),
            history: ConvergenceHistory::new(),
            state: DriverState::Idle,
        }
    }

    /// Driver with an explicit, validated configuration.
    pub fn with_config(sampler: S, config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let mut d = Self::new(sampler);
        d.config = config;
        Ok(d)
    }

    /// Current configuration.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Replace the whole configuration after validating it.
    pub fn set_config(&mut self, config: SimulationConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Set the block size. Zero is rejected.
    pub fn set_block_size(&mut self, block_size: usize) -> Result<()> {
        if block_size == 0 {
            return Err(Error::Validation("block_size must be > 0".into()));
        }
        self.config.block_size = block_size;
        Ok(())
    }

    /// Set the maximum number of blocks. Zero is rejected.
    pub fn set_max_outer_sampling(&mut self, n: usize) -> Result<()> {
        let stopping = StoppingConfig { max_outer_sampling: n, ..self.config.stopping.clone() };
        stopping.validate()?;
        self.config.stopping = stopping;
        Ok(())
    }

    /// Set the coefficient-of-variation target (`0` disables).
    pub fn set_max_coefficient_of_variation(&mut self, cov: f64) -> Result<()> {
        let stopping =
            StoppingConfig { max_coefficient_of_variation: cov, ..self.config.stopping.clone() };
        stopping.validate()?;
        self.config.stopping = stopping;
        Ok(())
    }

    /// Set the standard-deviation target (`0` disables).
    pub fn set_max_standard_deviation(&mut self, sd: f64) -> Result<()> {
        let stopping =
            StoppingConfig { max_standard_deviation: sd, ..self.config.stopping.clone() };
        stopping.validate()?;
        self.config.stopping = stopping;
        Ok(())
    }

    /// Set (or clear) the wall-clock budget in seconds.
    pub fn set_max_duration_secs(&mut self, secs: Option<f64>) -> Result<()> {
        let stopping = StoppingConfig { max_duration_secs: secs, ..self.config.stopping.clone() };
        stopping.validate()?;
        self.config.stopping = stopping;
        Ok(())
    }

    /// Set the seed.
    pub fn set_seed(&mut self, seed: u64) {
        self.config.seed = seed;
    }

    /// Install the progress hook, called once per block with a percentage.
    pub fn set_progress_callback<F>(&mut self, f: F)
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.callbacks.progress = Some(Arc::new(f));
    }

    /// Install the stop hook, polled once per block.
    pub fn set_stop_callback<F>(&mut self, f: F)
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.callbacks.stop = Some(Arc::new(f));
    }

    /// Snapshots of the last (or current) run.
    pub fn history(&self) -> &ConvergenceHistory {
        &self.history
    }

    /// Lifecycle state.
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// The block sampler.
    pub fn sampler(&self) -> &S {
        &self.sampler
    }

    /// Run and return a probability result (contributions are event indicators or
    /// likelihood-ratio weighted indicators).
    pub fn run(&mut self) -> Result<ProbabilitySimulationResult> {
        let (estimate, termination) = self.drive()?;
        Ok(ProbabilitySimulationResult::from_estimate(&estimate, termination))
    }

    fn drive(&mut self) -> Result<(RunningEstimate, Termination)> {
        self.config.validate()?;
        self.history = ConvergenceHistory::new();
        self.state = DriverState::Running;
        self.sampler.reset();
        match self.drive_loop() {
            Ok((estimate, termination)) => {
                self.state = DriverState::Finished(termination);
                log::info!(
                    "{}: estimate={:.6e} var={:.3e} blocks={} ({:?})",
                    self.sampler.name(),
                    estimate.mean,
                    estimate.variance,
                    estimate.outer_sampling,
                    termination
                );
                Ok((estimate, termination))
            }
            Err(e) => {
                self.state = DriverState::Failed;
                Err(e)
            }
        }
    }

    fn drive_loop(&mut self) -> Result<(RunningEstimate, Termination)> {
        let block_size = self.config.block_size;
        let mut estimator = RunningEstimator::new(block_size);
        let started = Instant::now();
        loop {
            let k = estimator.outer_sampling();
            let mut rng = block_rng(self.config.seed, k as u64);
            let block = self.sampler.compute_block(block_size, &mut rng)?;
            if block.len() != block_size {
                return Err(Error::Computation(format!(
                    "{} returned {} realizations for a block of {}",
                    self.sampler.name(),
                    block.len(),
                    block_size
                )));
            }
            if block.contributions.iter().any(|c| !c.is_finite()) {
                return Err(Error::Computation(format!(
                    "{} produced a non-finite contribution in block {}",
                    self.sampler.name(),
                    k
                )));
            }
            estimator.update(&block.contributions);
            let snapshot = estimator.snapshot();
            self.history.push(snapshot);
            self.callbacks.report(self.config.stopping.progress(&snapshot, started));
            if let Some(t) = self.config.stopping.check(&snapshot, started, &self.callbacks) {
                return Ok((snapshot, t));
            }
        }
    }
}

/// Mean of a scalar model output with the driver loop.
#[derive(Debug)]
pub struct ExpectationSimulation {
    driver: SimulationDriver<CrudeSampler>,
}

impl ExpectationSimulation {
    /// Estimate `E[model(X)]`, `X ~ distribution`.
    pub fn new(
        distribution: Arc<dyn Distribution>,
        model: Arc<dyn Model>,
        experiment: Experiment,
    ) -> Result<Self> {
        let sampler = CrudeSampler::expectation(distribution, model, experiment)?;
        Ok(Self { driver: SimulationDriver::new(sampler) })
    }

    /// The underlying driver (setters, callbacks, history).
    pub fn driver(&self) -> &SimulationDriver<CrudeSampler> {
        &self.driver
    }

    /// Mutable access for configuration.
    pub fn driver_mut(&mut self) -> &mut SimulationDriver<CrudeSampler> {
        &mut self.driver
    }

    /// Run; the coefficient of variation is taken relative to `|mean|`.
    pub fn run(&mut self) -> Result<ExpectationSimulationResult> {
        let (estimate, termination) = self.driver.drive()?;
        Ok(ExpectationSimulationResult::from_estimate(&estimate, termination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ThresholdEvent;
    use crate::sampler::{Block, ImportanceSampler};
    use ns_core::{ComparisonOperator, FnModel, Sample};
    use ns_prob::{ComposedDistribution, Marginal, Normal};
    use rand::rngs::StdRng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn half_event() -> ThresholdEvent {
        let d: Arc<dyn Distribution> = Arc::new(Normal::standard(1).unwrap());
        let m: Arc<dyn Model> = Arc::new(FnModel::new(1, |x: &[f64]| x[0]));
        ThresholdEvent::new(d, m, ComparisonOperator::Less, 0.0).unwrap()
    }

    fn crude_driver() -> SimulationDriver {
        let s = CrudeSampler::new(&half_event(), Experiment::MonteCarlo).unwrap();
        SimulationDriver::new(EventSampler::from(s))
    }

    #[test]
    fn test_block_size_zero_rejected() {
        let mut d = crude_driver();
        assert!(matches!(d.set_block_size(0), Err(Error::Validation(_))));
        assert_eq!(d.config().block_size, 1);
        assert!(d.set_max_outer_sampling(0).is_err());
        assert!(d.set_max_coefficient_of_variation(-1.0).is_err());
    }

    #[test]
    fn test_converges_on_half() {
        let mut d = crude_driver();
        d.set_block_size(100).unwrap();
        d.set_max_coefficient_of_variation(0.02).unwrap();
        let r = d.run().unwrap();
        assert_eq!(r.termination, Termination::Converged);
        assert!((r.probability_estimate - 0.5).abs() < 0.05);
        assert!(r.coefficient_of_variation().value().unwrap() <= 0.02);
        assert_eq!(d.history().len(), r.outer_sampling);
        assert_eq!(d.state(), DriverState::Finished(Termination::Converged));
    }

    #[test]
    fn test_error_shrinks_with_sample_size() {
        // Mean absolute error over seeds at 100, 1000 and 10000 draws.
        let checkpoints = [1usize, 10, 100];
        let seeds = 30;
        let mut error = [0.0f64; 3];
        for seed in 0..seeds {
            let mut d = crude_driver();
            d.set_seed(seed);
            d.set_block_size(100).unwrap();
            d.set_max_outer_sampling(100).unwrap();
            d.set_max_coefficient_of_variation(0.0).unwrap();
            d.run().unwrap();
            let means = d.history().means();
            for (e, &k) in error.iter_mut().zip(&checkpoints) {
                let (outer, mean) = means[k - 1];
                assert_eq!(outer, k);
                *e += (mean - 0.5).abs() / seeds as f64;
            }
        }
        assert!(error.windows(2).all(|w| w[1] <= w[0] + 2e-3), "{:?}", error);
        assert!(error[2] < 0.01, "{:?}", error);
    }

    #[test]
    fn test_reproducible_for_fixed_seed() {
        let mut a = crude_driver();
        let mut b = crude_driver();
        for d in [&mut a, &mut b] {
            d.set_block_size(10).unwrap();
            d.set_max_outer_sampling(20).unwrap();
            d.set_max_coefficient_of_variation(0.0).unwrap();
        }
        let ra = a.run().unwrap();
        let rb = b.run().unwrap();
        assert_eq!(ra, rb);
        assert_eq!(ra.termination, Termination::MaxOuterSampling);
        assert_eq!(ra.outer_sampling, 20);
    }

    #[test]
    fn test_stop_callback_and_progress() {
        let mut d = crude_driver();
        d.set_max_coefficient_of_variation(0.0).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        d.set_stop_callback(move || c.fetch_add(1, Ordering::Relaxed) + 1 >= 5);
        let reports = Arc::new(AtomicUsize::new(0));
        let rc = reports.clone();
        d.set_progress_callback(move |p| {
            assert!((0.0..=100.0).contains(&p));
            rc.fetch_add(1, Ordering::Relaxed);
        });
        let r = d.run().unwrap();
        assert_eq!(r.termination, Termination::UserStopped);
        assert_eq!(r.outer_sampling, 5);
        assert_eq!(reports.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn test_importance_with_initial_density_matches_crude() {
        let e = half_event();
        let mut crude = crude_driver();
        let mut is = SimulationDriver::new(EventSampler::from(
            ImportanceSampler::new(e.clone(), e.distribution().clone()).unwrap(),
        ));
        for d in [&mut crude, &mut is] {
            d.set_block_size(50).unwrap();
            d.set_max_outer_sampling(10).unwrap();
            d.set_max_coefficient_of_variation(0.0).unwrap();
        }
        let rc = crude.run().unwrap();
        let ri = is.run().unwrap();
        assert_eq!(rc.probability_estimate, ri.probability_estimate);
        assert_eq!(rc.variance_estimate, ri.variance_estimate);
    }

    #[derive(Debug)]
    struct Failing {
        calls: usize,
    }

    impl BlockSampler for Failing {
        fn compute_block(&mut self, size: usize, _rng: &mut StdRng) -> Result<Block> {
            self.calls += 1;
            if self.calls > 3 {
                return Err(Error::Computation("model crashed".into()));
            }
            Ok(Block {
                inputs: Sample::from_flat(1, vec![0.0; size]).unwrap(),
                outputs: vec![1.0; size],
                weights: None,
                contributions: vec![1.0; size],
            })
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[test]
    fn test_error_propagates_history_kept() {
        let mut d = SimulationDriver::new(Failing { calls: 0 });
        d.set_max_coefficient_of_variation(0.0).unwrap();
        assert!(matches!(d.run(), Err(Error::Computation(_))));
        assert_eq!(d.state(), DriverState::Failed);
        assert_eq!(d.history().len(), 3);
    }

    #[test]
    fn test_expectation_of_uniform() {
        let dist: Arc<dyn Distribution> = Arc::new(
            ComposedDistribution::new(vec![Marginal::uniform(0.0, 2.0).unwrap()]).unwrap(),
        );
        let m: Arc<dyn Model> = Arc::new(FnModel::new(1, |x: &[f64]| x[0]));
        let mut sim = ExpectationSimulation::new(dist, m, Experiment::Lhs).unwrap();
        sim.driver_mut().set_block_size(200).unwrap();
        sim.driver_mut().set_max_coefficient_of_variation(0.001).unwrap();
        sim.driver_mut().set_max_outer_sampling(200).unwrap();
        let r = sim.run().unwrap();
        assert!((r.mean - 1.0).abs() < 0.01, "mean={}", r.mean);
    }

    #[test]
    fn test_config_serde_flattens_stopping() {
        let c: SimulationConfig =
            serde_json::from_str(r#"{"block_size": 10, "max_outer_sampling": 5}"#).unwrap();
        assert_eq!(c.block_size, 10);
        assert_eq!(c.stopping.max_outer_sampling, 5);
        assert_eq!(c.seed, 42);
    }
}
