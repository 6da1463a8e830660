//! Cross-entropy importance sampling.
//!
//! ## Architecture
//!
//! Every variant shares one staged loop, [`CrossEntropyImportanceSampling`], and
//! differs only in its [`AuxiliaryDensityUpdate`]:
//!
//! - [`StandardSpaceUpdate`]: independent Normal in the standard space, refit by
//!   weighted mean and standard deviation.
//! - [`PhysicalSpaceUpdate`]: a user auxiliary distribution in the physical space,
//!   refit by maximising the weighted log-likelihood over its active parameters.
//! - [`NaisUpdate`](crate::nais::NaisUpdate): weighted Gaussian kernel mixture.
//!
//! Stage `i` draws `N` points from the current auxiliary density with
//! `stage_rng(seed, i, 0)`, sets the intermediate threshold to the
//! `quantile_level`-quantile of the outputs and refits on the critical points,
//! weighted by `p_initial / p_aux`. Once the quantile lies in the target event the
//! threshold freezes at the target and the last stage's critical points give the
//! likelihood-ratio estimate. Reaching `max_iterations` first still applies the
//! estimator at the target threshold on the last stage.

mod physical;
mod standard;

pub use physical::PhysicalSpaceUpdate;
pub use standard::StandardSpaceUpdate;

use std::fmt;
use std::sync::Arc;

use ns_core::{DerivedValue, Error, Result, Sample};
use ns_prob::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::adaptive::{
    LevelSample, ThresholdSchedule, critical_indices, intermediate_threshold,
    likelihood_ratio_estimate, warn_if_undersized,
};
use crate::estimator::RunningEstimate;
use crate::event::ThresholdEvent;
use crate::history::ConvergenceHistory;
use crate::rng::stage_rng;
use crate::stopping::{Callbacks, StageControl, validate_duration};

/// Space in which the auxiliary density lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingSpace {
    /// Standard Normal space reached through the iso-probabilistic transform.
    Standard,
    /// Space of the event's input distribution.
    Physical,
}

/// Initial auxiliary density and its per-stage refit.
pub trait AuxiliaryDensityUpdate: fmt::Debug + Send + Sync {
    /// Space of the densities this update produces.
    fn space(&self) -> SamplingSpace;

    /// Auxiliary density of stage 0.
    fn initial(&self, event: &ThresholdEvent) -> Result<Arc<dyn Distribution>>;

    /// Next auxiliary density from the critical points of a stage.
    ///
    /// `log_weights[i]` is `log p_initial - log p_aux` at `critical.row(i)`, both
    /// densities taken in [`space`](Self::space).
    fn refit(
        &self,
        current: &Arc<dyn Distribution>,
        critical: &Sample,
        log_weights: &[f64],
    ) -> Result<Arc<dyn Distribution>>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Cross-entropy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossEntropyConfig {
    /// Points per block (default 1).
    pub block_size: usize,
    /// Blocks per stage (default 1000). Stage sample size is their product.
    pub max_outer_sampling: usize,
    /// Fraction of each stage kept as critical (default 0.1).
    pub quantile_level: f64,
    /// Stage cap (default 100).
    pub max_iterations: usize,
    /// Keep every stage's inputs and outputs in the result.
    pub keep_sample: bool,
    /// Seed (default 42).
    pub seed: u64,
    /// Wall-clock budget in seconds.
    pub max_duration_secs: Option<f64>,
}

impl Default for CrossEntropyConfig {
    fn default() -> Self {
        Self {
            block_size: 1,
            max_outer_sampling: 1000,
            quantile_level: 0.1,
            max_iterations: 100,
            keep_sample: false,
            seed: 42,
            max_duration_secs: None,
        }
    }
}

impl CrossEntropyConfig {
    /// Points per stage.
    pub fn sample_size(&self) -> usize {
        self.block_size * self.max_outer_sampling
    }

    /// Validate all fields.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::Validation("block_size must be > 0".into()));
        }
        if self.max_outer_sampling == 0 {
            return Err(Error::Validation("max_outer_sampling must be > 0".into()));
        }
        if self.sample_size() < 2 {
            return Err(Error::Validation(format!(
                "the likelihood-ratio estimator needs more than one point per stage, got {}",
                self.sample_size()
            )));
        }
        if !(self.quantile_level > 0.0 && self.quantile_level < 1.0) {
            return Err(Error::Validation(format!(
                "quantile_level must be in (0, 1), got {}",
                self.quantile_level
            )));
        }
        if self.max_iterations == 0 {
            return Err(Error::Validation("max_iterations must be > 0".into()));
        }
        validate_duration(self.max_duration_secs)
    }
}

/// Result of a cross-entropy run.
#[derive(Debug, Clone)]
pub struct CrossEntropyResult {
    /// Likelihood-ratio estimate at the target threshold.
    pub probability_estimate: f64,
    /// Variance of the estimate.
    pub variance_estimate: f64,
    /// Blocks per stage.
    pub outer_sampling: usize,
    /// Points per block.
    pub block_size: usize,
    /// Intermediate thresholds in stage order.
    pub thresholds: Vec<f64>,
    /// `false` when the stage cap was hit before the target threshold.
    pub target_reached: bool,
    /// Per-stage samples when `keep_sample` is set.
    pub samples: Option<Vec<LevelSample>>,
    auxiliary: Arc<dyn Distribution>,
}

impl CrossEntropyResult {
    /// Auxiliary density of the last stage.
    pub fn auxiliary_distribution(&self) -> &Arc<dyn Distribution> {
        &self.auxiliary
    }

    /// Number of stages run.
    pub fn iterations(&self) -> usize {
        self.thresholds.len()
    }

    /// Coefficient of variation of the estimate.
    pub fn coefficient_of_variation(&self) -> DerivedValue {
        if self.probability_estimate <= 0.0 || !self.probability_estimate.is_finite() {
            return DerivedValue::Undefinable;
        }
        DerivedValue::Defined(self.variance_estimate.max(0.0).sqrt() / self.probability_estimate)
    }

    /// Standard deviation of the estimate.
    pub fn standard_deviation(&self) -> f64 {
        self.variance_estimate.max(0.0).sqrt()
    }
}

/// Staged cross-entropy estimator over an auxiliary-density update rule.
#[derive(Debug)]
pub struct CrossEntropyImportanceSampling<U: AuxiliaryDensityUpdate> {
    event: ThresholdEvent,
    update: U,
    config: CrossEntropyConfig,
    callbacks: Callbacks,
    history: ConvergenceHistory,
}

/// Cross-entropy with an independent Normal in the standard space.
pub type StandardSpaceCrossEntropy = CrossEntropyImportanceSampling<StandardSpaceUpdate>;
/// Cross-entropy with a parametric auxiliary distribution in the physical space.
pub type PhysicalSpaceCrossEntropy = CrossEntropyImportanceSampling<PhysicalSpaceUpdate>;

impl<U: AuxiliaryDensityUpdate> CrossEntropyImportanceSampling<U> {
    /// Build with a validated configuration.
    pub fn new(event: ThresholdEvent, update: U, config: CrossEntropyConfig) -> Result<Self> {
        config.validate()?;
        if update.space() == SamplingSpace::Standard {
            event.distribution().from_standard(&vec![0.0; event.dimension()]).map_err(|e| {
                Error::Validation(format!(
                    "{} needs a standard-space transform for {}: {}",
                    update.name(),
                    event.distribution().name(),
                    e
                ))
            })?;
        }
        Ok(Self {
            event,
            update,
            config,
            callbacks: Callbacks::default(),
            history: ConvergenceHistory::new(),
        })
    }

    /// Configuration.
    pub fn config(&self) -> &CrossEntropyConfig {
        &self.config
    }

    /// Auxiliary-density update rule.
    pub fn update(&self) -> &U {
        &self.update
    }

    /// Set the block size. Zero is rejected.
    pub fn set_block_size(&mut self, block_size: usize) -> Result<()> {
        let config = CrossEntropyConfig { block_size, ..self.config.clone() };
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Install the progress hook.
    pub fn set_progress_callback<F>(&mut self, f: F)
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.callbacks.progress = Some(Arc::new(f));
    }

    /// Install the stop hook, polled before every stage.
    pub fn set_stop_callback<F>(&mut self, f: F)
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.callbacks.stop = Some(Arc::new(f));
    }

    /// One snapshot per stage: likelihood-ratio estimate of that stage's event.
    pub fn history(&self) -> &ConvergenceHistory {
        &self.history
    }

    fn reference_density(&self) -> Result<Arc<dyn Distribution>> {
        match self.update.space() {
            SamplingSpace::Standard => Ok(Arc::new(Normal::standard(self.event.dimension())?)),
            SamplingSpace::Physical => Ok(self.event.distribution().clone()),
        }
    }

    fn evaluate(&self, sample: &Sample) -> Result<Vec<f64>> {
        match self.update.space() {
            SamplingSpace::Standard => self.event.evaluate_standard(sample),
            SamplingSpace::Physical => self.event.evaluate(sample),
        }
    }

    fn physical_inputs(&self, sample: &Sample) -> Result<Sample> {
        match self.update.space() {
            SamplingSpace::Standard => {
                ns_prob::sample_from_standard(self.event.distribution().as_ref(), sample)
            }
            SamplingSpace::Physical => Ok(sample.clone()),
        }
    }

    /// Run all stages.
    pub fn run(&mut self) -> Result<CrossEntropyResult> {
        self.history = ConvergenceHistory::new();
        let control = StageControl::new(self.config.max_duration_secs, self.callbacks.clone());
        let n = self.config.sample_size();
        let rho = self.config.quantile_level;
        let op = self.event.operator();
        let target = self.event.threshold();
        warn_if_undersized(n, rho);

        let reference = self.reference_density()?;
        let mut auxiliary = self.update.initial(&self.event)?;
        if auxiliary.dimension() != self.event.dimension() {
            return Err(Error::Validation(format!(
                "auxiliary dimension {} != event dimension {}",
                auxiliary.dimension(),
                self.event.dimension()
            )));
        }
        let mut schedule = ThresholdSchedule::new(op, target);
        let mut samples: Vec<LevelSample> = Vec::new();

        for stage in 0..self.config.max_iterations {
            control.poll(stage)?;
            let mut rng = stage_rng(self.config.seed, stage as u64, 0);
            let points = auxiliary.sample(&mut rng, n);
            let outputs = self.evaluate(&points)?;
            if self.config.keep_sample {
                samples.push(LevelSample {
                    inputs: self.physical_inputs(&points)?,
                    outputs: outputs.clone(),
                });
            }
            let log_ratios: Vec<f64> = reference
                .log_pdf_sample(&points)
                .into_iter()
                .zip(auxiliary.log_pdf_sample(&points))
                .map(|(lp, la)| lp - la)
                .collect();

            let (quantile, reached) = intermediate_threshold(op, &outputs, rho, target)?;
            let (threshold, clamped) = schedule.advance(quantile);
            let last = stage + 1 == self.config.max_iterations;
            if last && !reached {
                log::warn!(
                    "{}: stage cap {} hit at threshold {:.6e}, estimating at the target {}",
                    self.update.name(),
                    self.config.max_iterations,
                    threshold,
                    target
                );
            }
            let level = if reached || last { target } else { threshold };
            let critical = match critical_indices(op, &outputs, level) {
                // Nothing beyond the repeated level: refit on the stage's own quantile.
                Err(_) if clamped && !last => critical_indices(op, &outputs, quantile)?,
                selected => selected?,
            };
            let critical_ratios: Vec<f64> = critical.iter().map(|&i| log_ratios[i]).collect();
            let estimate = likelihood_ratio_estimate(&critical_ratios, n)?;
            self.history.push(RunningEstimate {
                mean: estimate.probability,
                variance: estimate.variance,
                outer_sampling: stage + 1,
                block_size: n,
            });
            log::debug!(
                "{} stage {}: threshold={:.6e} critical={} p={:.6e}",
                self.update.name(),
                stage,
                threshold,
                critical.len(),
                estimate.probability
            );

            if reached || last {
                control.report(100.0);
                log::info!(
                    "{}: P={:.6e} sd={:.3e} stages={} ({:.2}s)",
                    self.update.name(),
                    estimate.probability,
                    estimate.variance.max(0.0).sqrt(),
                    schedule.len(),
                    control.elapsed_secs()
                );
                return Ok(CrossEntropyResult {
                    probability_estimate: estimate.probability,
                    variance_estimate: estimate.variance,
                    outer_sampling: self.config.max_outer_sampling,
                    block_size: self.config.block_size,
                    thresholds: schedule.thresholds().to_vec(),
                    target_reached: reached,
                    samples: self.config.keep_sample.then_some(samples),
                    auxiliary,
                });
            }

            auxiliary = self.update.refit(&auxiliary, &points.select(&critical), &critical_ratios)?;
            control.report(100.0 * (stage + 1) as f64 / self.config.max_iterations as f64);
        }
        Err(Error::Computation("cross-entropy loop ended without a final stage".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ns_core::{ComparisonOperator, FnModel, Model};
    use ns_prob::math::std_normal_cdf;

    fn linear_event(beta: f64) -> ThresholdEvent {
        let d: Arc<dyn Distribution> = Arc::new(Normal::standard(2).unwrap());
        let m: Arc<dyn Model> =
            Arc::new(FnModel::new(2, move |x: &[f64]| beta - (x[0] + x[1]) / 2f64.sqrt()));
        ThresholdEvent::new(d, m, ComparisonOperator::Less, 0.0).unwrap()
    }

    fn config() -> CrossEntropyConfig {
        CrossEntropyConfig { block_size: 100, max_outer_sampling: 20, ..Default::default() }
    }

    fn standard(beta: f64, cfg: CrossEntropyConfig) -> StandardSpaceCrossEntropy {
        StandardSpaceCrossEntropy::new(linear_event(beta), StandardSpaceUpdate, cfg).unwrap()
    }

    #[test]
    fn test_standard_space_linear() {
        let beta = 3.5;
        let mut ce = standard(beta, config());
        let r = ce.run().unwrap();
        let exact = std_normal_cdf(-beta);
        assert!(r.target_reached);
        assert!(
            ((r.probability_estimate - exact) / exact).abs() < 0.25,
            "p={} exact={}",
            r.probability_estimate,
            exact
        );
        assert_eq!(*r.thresholds.last().unwrap(), 0.0);
        assert!(r.thresholds.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(ce.history().len(), r.iterations());
    }

    #[test]
    fn test_stage_cap_still_estimates_at_target() {
        // One stage from the initial density is crude Monte Carlo at the target.
        let cfg = CrossEntropyConfig { max_iterations: 1, ..config() };
        let r = standard(1.0, cfg).run().unwrap();
        assert!(!r.target_reached);
        let exact = std_normal_cdf(-1.0);
        assert!((r.probability_estimate - exact).abs() < 0.03);
    }

    #[test]
    fn test_stage_cap_with_empty_critical_sample_raises() {
        let cfg = CrossEntropyConfig { max_iterations: 1, ..config() };
        let r = standard(6.0, cfg).run();
        assert!(matches!(r, Err(Error::Computation(_))));
    }

    #[test]
    fn test_reproducible_with_seed() {
        let a = standard(3.0, config()).run().unwrap();
        let b = standard(3.0, config()).run().unwrap();
        assert_eq!(a.probability_estimate, b.probability_estimate);
        assert_eq!(a.thresholds, b.thresholds);
    }

    #[test]
    fn test_keep_sample_in_physical_space() {
        let cfg = CrossEntropyConfig { keep_sample: true, ..config() };
        let r = standard(2.0, cfg).run().unwrap();
        let s = r.samples.as_ref().unwrap();
        assert_eq!(s.len(), r.iterations());
        assert!(s.iter().all(|l| l.inputs.len() == 2000 && l.outputs.len() == 2000));
    }

    #[test]
    fn test_config_validation() {
        assert!(CrossEntropyConfig { quantile_level: 0.0, ..config() }.validate().is_err());
        let degenerate = CrossEntropyConfig { block_size: 1, max_outer_sampling: 1, ..config() };
        assert!(degenerate.validate().is_err());
        assert!(CrossEntropyConfig { max_iterations: 0, ..config() }.validate().is_err());
        let mut ce = standard(1.0, config());
        assert!(ce.set_block_size(0).is_err());
    }

    #[test]
    fn test_stop_callback() {
        let mut ce = standard(3.0, config());
        ce.set_stop_callback(|| true);
        assert!(matches!(ce.run(), Err(Error::UserStopped(_))));
    }
}
