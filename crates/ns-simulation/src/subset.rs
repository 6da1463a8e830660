//! Subset sampling.
//!
//! ## Architecture
//!
//! The target event is reached through nested intermediate events
//! `g(X) op t_1 ⊃ g(X) op t_2 ⊃ ... ⊃ g(X) op t`. Level 0 is a crude sample in the
//! standard space. At every level the `conditional_probability`-quantile of the
//! outputs gives the next threshold; the critical points seed Markov chains
//! (component-wise modified Metropolis) that repopulate the level conditionally
//! on the new intermediate event.
//!
//! - All chains advance synchronously: the candidates of one chain step are
//!   evaluated as one parallel batch.
//! - Chain step `s` of level `j` draws from `stage_rng(seed, j, s)`.
//! - Each level reports a coefficient of variation
//!   `cov_j^2 = (1 - p_j) / (N p_j) (1 + gamma_j)`, where `gamma_j` accounts for the
//!   correlation of the indicator along the chains; the estimator variance is
//!   `P^2 sum_j cov_j^2`.

use std::sync::Arc;

use ns_core::{DerivedValue, Error, Result, Sample};
use rand::Rng;
use rand_distr::{Distribution as _, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::adaptive::{LevelSample, ThresholdSchedule, critical_indices, intermediate_threshold};
use crate::estimator::RunningEstimate;
use crate::event::ThresholdEvent;
use crate::history::ConvergenceHistory;
use crate::rng::stage_rng;
use crate::stopping::{Callbacks, StageControl, validate_duration};

/// Subset sampling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubsetConfig {
    /// Points per block (default 1).
    pub block_size: usize,
    /// Blocks per level (default 1000). Level sample size is `block_size * max_outer_sampling`.
    pub max_outer_sampling: usize,
    /// Target probability of each intermediate event (default 0.1).
    pub conditional_probability: f64,
    /// Width of the uniform component proposal (default 2.0).
    pub proposal_range: f64,
    /// Level cap (default 100).
    pub max_levels: usize,
    /// Abort once the running product of level probabilities falls below this.
    pub minimum_probability: f64,
    /// Keep every level's inputs and outputs in the result.
    pub keep_sample: bool,
    /// Seed (default 42).
    pub seed: u64,
    /// Wall-clock budget in seconds.
    pub max_duration_secs: Option<f64>,
}

impl Default for SubsetConfig {
    fn default() -> Self {
        Self {
            block_size: 1,
            max_outer_sampling: 1000,
            conditional_probability: 0.1,
            proposal_range: 2.0,
            max_levels: 100,
            minimum_probability: f64::MIN_POSITIVE.sqrt(),
            keep_sample: false,
            seed: 42,
            max_duration_secs: None,
        }
    }
}

impl SubsetConfig {
    /// Points per level.
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
        if !(self.conditional_probability > 0.0 && self.conditional_probability < 1.0) {
            return Err(Error::Validation(format!(
                "conditional_probability must be in (0, 1), got {}",
                self.conditional_probability
            )));
        }
        if (self.sample_size() as f64 * self.conditional_probability) < 1.0 {
            return Err(Error::Validation(format!(
                "{} points per level leave no seed at conditional probability {}",
                self.sample_size(),
                self.conditional_probability
            )));
        }
        if !self.proposal_range.is_finite() || self.proposal_range <= 0.0 {
            return Err(Error::Validation(format!(
                "proposal_range must be finite and > 0, got {}",
                self.proposal_range
            )));
        }
        if self.max_levels == 0 {
            return Err(Error::Validation("max_levels must be > 0".into()));
        }
        if !(self.minimum_probability > 0.0 && self.minimum_probability < 1.0) {
            return Err(Error::Validation(format!(
                "minimum_probability must be in (0, 1), got {}",
                self.minimum_probability
            )));
        }
        validate_duration(self.max_duration_secs)
    }
}

/// Diagnostics of one level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubsetLevel {
    /// Threshold of the level's event.
    pub threshold: f64,
    /// Conditional probability estimate of the level.
    pub probability: f64,
    /// Coefficient of variation of the level probability.
    pub coefficient_of_variation: f64,
    /// Chain-correlation factor (0 at level 0).
    pub gamma: f64,
    /// Markov-chain acceptance rate that produced the level (1 at level 0).
    pub acceptance_rate: f64,
}

/// Result of a subset sampling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsetSamplingResult {
    /// Product of the level probabilities.
    pub probability_estimate: f64,
    /// `P^2 sum_j cov_j^2`.
    pub variance_estimate: f64,
    /// Blocks per level.
    pub outer_sampling: usize,
    /// Points per block.
    pub block_size: usize,
    /// Per-level diagnostics.
    pub levels: Vec<SubsetLevel>,
    /// Per-level samples when `keep_sample` is set.
    pub samples: Option<Vec<LevelSample>>,
}

impl SubsetSamplingResult {
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

    /// Level thresholds; the last one is the target.
    pub fn thresholds(&self) -> Vec<f64> {
        self.levels.iter().map(|l| l.threshold).collect()
    }
}

/// Subset sampling estimator.
#[derive(Debug)]
pub struct SubsetSampling {
    event: ThresholdEvent,
    config: SubsetConfig,
    callbacks: Callbacks,
    history: ConvergenceHistory,
}

impl SubsetSampling {
    /// Build with a validated configuration. The event distribution must support
    /// the standard-space transform.
    pub fn new(event: ThresholdEvent, config: SubsetConfig) -> Result<Self> {
        config.validate()?;
        event.distribution().from_standard(&vec![0.0; event.dimension()]).map_err(|e| {
            Error::Validation(format!(
                "subset sampling needs a standard-space transform for {}: {}",
                event.distribution().name(),
                e
            ))
        })?;
        Ok(Self {
            event,
            config,
            callbacks: Callbacks::default(),
            history: ConvergenceHistory::new(),
        })
    }

    /// Configuration.
    pub fn config(&self) -> &SubsetConfig {
        &self.config
    }

    /// Set the block size. Zero is rejected.
    pub fn set_block_size(&mut self, block_size: usize) -> Result<()> {
        let config = SubsetConfig { block_size, ..self.config.clone() };
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

    /// Install the stop hook, polled before every level.
    pub fn set_stop_callback<F>(&mut self, f: F)
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.callbacks.stop = Some(Arc::new(f));
    }

    /// One snapshot per level: running product and its variance.
    pub fn history(&self) -> &ConvergenceHistory {
        &self.history
    }

    /// Run all levels.
    pub fn run(&mut self) -> Result<SubsetSamplingResult> {
        self.history = ConvergenceHistory::new();
        let control = StageControl::new(self.config.max_duration_secs, self.callbacks.clone());
        let n = self.config.sample_size();
        let d = self.event.dimension();
        let op = self.event.operator();
        let target = self.event.threshold();
        let p0 = self.config.conditional_probability;

        control.poll(0)?;
        let mut rng = stage_rng(self.config.seed, 0, 0);
        let mut u = Sample::with_capacity(d, n);
        let mut point = vec![0.0; d];
        for _ in 0..n {
            point.iter_mut().for_each(|v| *v = StandardNormal.sample(&mut rng));
            u.push(&point);
        }
        let mut y = self.event.evaluate_standard(&u)?;
        let mut chains: Option<Vec<Vec<usize>>> = None;
        let mut acceptance_rate = 1.0;

        let mut schedule = ThresholdSchedule::new(op, target);
        let mut levels: Vec<SubsetLevel> = Vec::new();
        let mut samples: Vec<LevelSample> = Vec::new();
        let mut probability = 1.0;
        let mut cov2_sum = 0.0;

        loop {
            let j = levels.len();
            if j >= self.config.max_levels {
                return Err(Error::Computation(format!(
                    "subset sampling did not reach threshold {} within {} levels (last {:?})",
                    target,
                    self.config.max_levels,
                    schedule.last()
                )));
            }
            if self.config.keep_sample {
                let inputs = ns_prob::sample_from_standard(self.event.distribution().as_ref(), &u)?;
                samples.push(LevelSample { inputs, outputs: y.clone() });
            }

            let (threshold, reached) = intermediate_threshold(op, &y, p0, target)?;
            schedule.push(threshold)?;
            let critical = critical_indices(op, &y, threshold)?;
            let pj = critical.len() as f64 / n as f64;
            let gamma = match &chains {
                Some(c) => {
                    let indicator: Vec<bool> =
                        y.iter().map(|&v| op.compare(v, threshold)).collect();
                    chain_correlation_factor(c, &indicator, pj)
                }
                None => 0.0,
            };
            let cov2 = (1.0 - pj) / (n as f64 * pj) * (1.0 + gamma);
            probability *= pj;
            cov2_sum += cov2;
            levels.push(SubsetLevel {
                threshold,
                probability: pj,
                coefficient_of_variation: cov2.sqrt(),
                gamma,
                acceptance_rate,
            });
            self.history.push(RunningEstimate {
                mean: probability,
                variance: probability * probability * cov2_sum,
                outer_sampling: j + 1,
                block_size: n,
            });
            log::debug!(
                "subset level {}: threshold={:.6e} p={:.4} gamma={:.3} P={:.6e}",
                j,
                threshold,
                pj,
                gamma,
                probability
            );

            if reached {
                break;
            }
            if probability < self.config.minimum_probability {
                return Err(Error::Computation(format!(
                    "probability {:.3e} fell below the minimum {:.3e} before reaching {}",
                    probability, self.config.minimum_probability, target
                )));
            }
            control.report(100.0 * (j + 1) as f64 / self.config.max_levels as f64);
            control.poll(j + 1)?;

            let seeds = u.select(&critical);
            let seed_values: Vec<f64> = critical.iter().map(|&i| y[i]).collect();
            let next = self.conditional_sampling(&seeds, &seed_values, threshold, j + 1)?;
            if next.acceptance_rate < 0.1 {
                log::warn!(
                    "subset level {}: low acceptance rate {:.3}, consider a smaller proposal_range",
                    j + 1,
                    next.acceptance_rate
                );
            }
            u = next.points;
            y = next.values;
            chains = Some(next.chains);
            acceptance_rate = next.acceptance_rate;
        }
        control.report(100.0);

        let variance = probability * probability * cov2_sum;
        log::info!(
            "subset sampling: P={:.6e} cov={:.3} levels={} ({:.2}s)",
            probability,
            cov2_sum.sqrt(),
            levels.len(),
            control.elapsed_secs()
        );
        Ok(SubsetSamplingResult {
            probability_estimate: probability,
            variance_estimate: variance,
            outer_sampling: self.config.max_outer_sampling,
            block_size: self.config.block_size,
            levels,
            samples: self.config.keep_sample.then_some(samples),
        })
    }

    /// Repopulate a level from the seeds with synchronous modified-Metropolis chains.
    fn conditional_sampling(
        &self,
        seeds: &Sample,
        seed_values: &[f64],
        threshold: f64,
        level: usize,
    ) -> Result<ChainPopulation> {
        let n = self.config.sample_size();
        let d = seeds.dimension();
        let m = seeds.len();
        let op = self.event.operator();
        let lengths: Vec<usize> = (0..m).map(|c| n / m + usize::from(c < n % m)).collect();
        let max_len = lengths.iter().copied().max().unwrap_or(0);

        let mut states: Vec<Vec<f64>> = seeds.rows().map(|r| r.to_vec()).collect();
        let mut values = seed_values.to_vec();
        let mut points = Sample::with_capacity(d, n);
        let mut outputs = Vec::with_capacity(n);
        let mut chains: Vec<Vec<usize>> = vec![Vec::with_capacity(max_len); m];
        for c in 0..m {
            chains[c].push(outputs.len());
            points.push(&states[c]);
            outputs.push(values[c]);
        }

        let mut proposals = 0usize;
        let mut accepted = 0usize;
        for step in 1..max_len {
            let mut rng = stage_rng(self.config.seed, level as u64, step as u64);
            let active: Vec<usize> = (0..m).filter(|&c| lengths[c] > step).collect();
            let mut moved: Vec<(usize, Vec<f64>)> = Vec::new();
            for &c in &active {
                proposals += 1;
                if let Some(candidate) = self.propose(&states[c], &mut rng) {
                    moved.push((c, candidate));
                }
            }
            if !moved.is_empty() {
                let mut batch = Sample::with_capacity(d, moved.len());
                for (_, cand) in &moved {
                    batch.push(cand);
                }
                let ys = self.event.evaluate_standard(&batch)?;
                for ((c, cand), yc) in moved.into_iter().zip(ys) {
                    if op.compare(yc, threshold) {
                        states[c] = cand;
                        values[c] = yc;
                        accepted += 1;
                    }
                }
            }
            for &c in &active {
                chains[c].push(outputs.len());
                points.push(&states[c]);
                outputs.push(values[c]);
            }
        }

        let acceptance_rate = if proposals == 0 { 1.0 } else { accepted as f64 / proposals as f64 };
        Ok(ChainPopulation { points, values: outputs, chains, acceptance_rate })
    }

    /// Component-wise modified Metropolis proposal for a standard Normal target.
    ///
    /// Returns `None` when no component moved.
    fn propose<R: Rng + ?Sized>(&self, current: &[f64], rng: &mut R) -> Option<Vec<f64>> {
        let half = 0.5 * self.config.proposal_range;
        let mut candidate = current.to_vec();
        let mut any = false;
        for (k, xk) in candidate.iter_mut().enumerate() {
            let xi = current[k] + rng.random_range(-half..half);
            let log_ratio = 0.5 * (current[k] * current[k] - xi * xi);
            let accept = log_ratio >= 0.0 || rng.random::<f64>() < log_ratio.exp();
            if accept {
                *xk = xi;
                any = true;
            }
        }
        any.then_some(candidate)
    }
}

struct ChainPopulation {
    points: Sample,
    values: Vec<f64>,
    chains: Vec<Vec<usize>>,
    acceptance_rate: f64,
}

/// `gamma = 2 sum_k (1 - k/L) rho(k)` from the lag-`k` correlation of the level
/// indicator along the chains. Clamped at 0.
fn chain_correlation_factor(chains: &[Vec<usize>], indicator: &[bool], p: f64) -> f64 {
    let r0 = p * (1.0 - p);
    let max_len = chains.iter().map(Vec::len).max().unwrap_or(0);
    if r0 <= 0.0 || max_len < 2 {
        return 0.0;
    }
    let mut gamma = 0.0;
    for k in 1..max_len {
        let mut hits = 0usize;
        let mut pairs = 0usize;
        for chain in chains.iter().filter(|c| c.len() > k) {
            for t in 0..chain.len() - k {
                pairs += 1;
                if indicator[chain[t]] && indicator[chain[t + k]] {
                    hits += 1;
                }
            }
        }
        if pairs == 0 {
            break;
        }
        let rk = hits as f64 / pairs as f64 - p * p;
        gamma += 2.0 * (1.0 - k as f64 / max_len as f64) * rk / r0;
    }
    gamma.max(0.0)
}
