//! Adaptive directional stratification.
//!
//! ## Architecture
//!
//! Direction space is split into orthants over the stratified coordinates: stratum
//! `i` holds the unit directions whose coordinate `c_b` is negative exactly when
//! bit `b` of `i` is set. Every orthant has probability `1 / m`, `m = 2^d'`.
//!
//! - The direction budget `N = block_size * max_outer_sampling` is split across
//!   steps by `gamma`. Step 0 allocates uniformly, later steps follow the Neyman
//!   rule `w_i ∝ sigma_i`. A stratum allocated no direction keeps its previous
//!   estimate.
//! - With `partial_stratification`, the influence statistic
//!   `T_k = 1/2 sum_i |P_i - P_(i xor 2^k)|` computed after step 0 keeps only the
//!   `max_stratification_dimension` most influential coordinates for every later
//!   step.
//! - The reported estimate is the one of the last step.

use std::sync::Arc;

use ns_core::{DerivedValue, Error, Result};
use serde::{Deserialize, Serialize};

use crate::estimator::RunningEstimate;
use crate::event::ThresholdEvent;
use crate::history::ConvergenceHistory;
use crate::rng::stage_rng;
use crate::root_strategy::RootStrategy;
use crate::sampler::directional::RadialSearch;
use crate::sampling_strategy::uniform_direction;
use crate::stopping::{Callbacks, StageControl, validate_duration};

/// Largest dimension whose orthants are enumerated.
const MAX_STRATIFIED_DIMENSION: usize = 20;

/// Adaptive directional stratification configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdsConfig {
    /// Directions per block (default 1).
    pub block_size: usize,
    /// Blocks over the whole run (default 1000).
    pub max_outer_sampling: usize,
    /// Budget fraction of each step (default `[0.5, 0.5]`), normalised to sum 1.
    pub gamma: Vec<f64>,
    /// Reduce the stratified coordinates after step 0.
    pub partial_stratification: bool,
    /// Coordinates kept by the reduction (default 3).
    pub max_stratification_dimension: usize,
    /// Root search along each direction.
    pub root_strategy: RootStrategy,
    /// Seed (default 42).
    pub seed: u64,
    /// Wall-clock budget in seconds.
    pub max_duration_secs: Option<f64>,
}

impl Default for AdsConfig {
    fn default() -> Self {
        Self {
            block_size: 1,
            max_outer_sampling: 1000,
            gamma: vec![0.5, 0.5],
            partial_stratification: false,
            max_stratification_dimension: 3,
            root_strategy: RootStrategy::default(),
            seed: 42,
            max_duration_secs: None,
        }
    }
}

impl AdsConfig {
    /// Directions over the whole run.
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
        if self.gamma.is_empty() {
            return Err(Error::Validation("gamma needs at least one step".into()));
        }
        if self.gamma.iter().any(|g| !g.is_finite() || *g <= 0.0) {
            return Err(Error::Validation(format!(
                "gamma fractions must be finite and > 0, got {:?}",
                self.gamma
            )));
        }
        if self.max_stratification_dimension == 0 {
            return Err(Error::Validation("max_stratification_dimension must be > 0".into()));
        }
        self.root_strategy.validate()?;
        validate_duration(self.max_duration_secs)
    }

    /// Directions of each step; rounding drift goes to the last step.
    fn step_budgets(&self) -> Vec<usize> {
        let total: f64 = self.gamma.iter().sum();
        let n = self.sample_size();
        let mut budgets: Vec<usize> =
            self.gamma.iter().map(|g| (g / total * n as f64).floor() as usize).collect();
        let used: usize = budgets.iter().sum();
        if let Some(last) = budgets.last_mut() {
            *last += n - used;
        }
        budgets
    }
}

/// Diagnostics of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdsStep {
    /// Stratified estimate after the step.
    pub probability: f64,
    /// Its variance.
    pub variance: f64,
    /// Directions given to each stratum.
    pub allocation: Vec<usize>,
}

/// Result of an adaptive directional stratification run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdsResult {
    /// Estimate of the last step.
    pub probability_estimate: f64,
    /// Variance of the last step's estimate.
    pub variance_estimate: f64,
    /// Blocks over the run.
    pub outer_sampling: usize,
    /// Directions per block.
    pub block_size: usize,
    /// Per-step estimates and allocations.
    pub steps: Vec<AdsStep>,
    /// Coordinates stratified in the last step.
    pub stratified_coordinates: Vec<usize>,
    /// Influence statistic per coordinate, when the reduction ran.
    pub influence: Option<Vec<f64>>,
    /// Neyman weights used by the last step.
    pub allocation_weights: Vec<f64>,
}

impl AdsResult {
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

/// Running statistics of one stratum.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct StratumEstimate {
    probability: f64,
    sigma: f64,
    variance_of_mean: f64,
}

impl StratumEstimate {
    fn from_masses(masses: &[f64]) -> Self {
        let n = masses.len() as f64;
        let p = masses.iter().sum::<f64>() / n;
        let var = if masses.len() > 1 {
            masses.iter().map(|m| (m - p) * (m - p)).sum::<f64>() / (n - 1.0)
        } else {
            0.0
        };
        Self { probability: p, sigma: var.sqrt(), variance_of_mean: var / n }
    }
}

/// Adaptive directional stratification estimator.
#[derive(Debug)]
pub struct AdaptiveDirectionalStratification {
    search: RadialSearch,
    config: AdsConfig,
    callbacks: Callbacks,
    history: ConvergenceHistory,
}

impl AdaptiveDirectionalStratification {
    /// Build from an event whose distribution supports the standard-space transform.
    pub fn new(event: ThresholdEvent, config: AdsConfig) -> Result<Self> {
        config.validate()?;
        let d = event.dimension();
        if d > MAX_STRATIFIED_DIMENSION {
            return Err(Error::Validation(format!(
                "dimension {} gives too many orthants (at most {} coordinates)",
                d, MAX_STRATIFIED_DIMENSION
            )));
        }
        let first = config.step_budgets()[0];
        if first < 2 << d {
            return Err(Error::Validation(format!(
                "first step has {} directions, needs at least two per orthant ({})",
                first,
                2 << d
            )));
        }
        let search = RadialSearch::new(event, config.root_strategy)?;
        Ok(Self {
            search,
            config,
            callbacks: Callbacks::default(),
            history: ConvergenceHistory::new(),
        })
    }

    /// Configuration.
    pub fn config(&self) -> &AdsConfig {
        &self.config
    }

    /// Install the progress hook.
    pub fn set_progress_callback<F>(&mut self, f: F)
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.callbacks.progress = Some(Arc::new(f));
    }

    /// Install the stop hook, polled before every step.
    pub fn set_stop_callback<F>(&mut self, f: F)
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.callbacks.stop = Some(Arc::new(f));
    }

    /// One snapshot per step.
    pub fn history(&self) -> &ConvergenceHistory {
        &self.history
    }

    /// Run all steps.
    pub fn run(&mut self) -> Result<AdsResult> {
        self.history = ConvergenceHistory::new();
        let control = StageControl::new(self.config.max_duration_secs, self.callbacks.clone());
        let d = self.search.event().dimension();
        let origin = self.search.origin_value()?;
        let budgets = self.config.step_budgets();

        let mut stratified: Vec<usize> = (0..d).collect();
        let mut strata = vec![StratumEstimate::default(); 1 << d];
        let mut weights = vec![1.0 / strata.len() as f64; strata.len()];
        let mut influence = None;
        let mut steps: Vec<AdsStep> = Vec::with_capacity(budgets.len());

        for (step, &budget) in budgets.iter().enumerate() {
            control.poll(step)?;
            let allocation = allocate(&weights, budget);
            let mut rng = stage_rng(self.config.seed, step as u64, 0);
            let mut directions = Vec::with_capacity(budget);
            for (i, &n_i) in allocation.iter().enumerate() {
                for _ in 0..n_i {
                    directions.push(orthant_direction(d, &stratified, i, &mut rng));
                }
            }
            let masses = self.search.masses(&directions, origin)?;
            let mut offset = 0;
            for (i, &n_i) in allocation.iter().enumerate() {
                if n_i > 0 {
                    strata[i] = StratumEstimate::from_masses(&masses[offset..offset + n_i]);
                    offset += n_i;
                }
            }

            let m = strata.len() as f64;
            let probability = strata.iter().map(|s| s.probability).sum::<f64>() / m;
            let variance = strata.iter().map(|s| s.variance_of_mean).sum::<f64>() / (m * m);
            self.history.push(RunningEstimate {
                mean: probability,
                variance,
                outer_sampling: steps.len() + 1,
                block_size: budget,
            });
            log::debug!(
                "ads step {}: {} directions over {} strata, P={:.6e} sd={:.3e}",
                step,
                budget,
                strata.len(),
                probability,
                variance.max(0.0).sqrt()
            );
            steps.push(AdsStep { probability, variance, allocation });

            if step == 0 && self.config.partial_stratification {
                let t = influence_statistic(&strata, d);
                let kept = reduce_coordinates(&t, self.config.max_stratification_dimension)?;
                log::info!("ads: stratifying coordinates {:?} (T = {:?})", kept, t);
                strata = project_strata(&strata, &kept);
                stratified = kept;
                influence = Some(t);
            }
            weights = neyman_weights(&strata);
            control.report(100.0 * (step + 1) as f64 / budgets.len() as f64);
        }

        let last = steps.last().ok_or_else(|| Error::Computation("no step was run".into()))?;
        log::info!(
            "ads: P={:.6e} sd={:.3e} steps={} ({:.2}s)",
            last.probability,
            last.variance.max(0.0).sqrt(),
            steps.len(),
            control.elapsed_secs()
        );
        Ok(AdsResult {
            probability_estimate: last.probability,
            variance_estimate: last.variance,
            outer_sampling: self.config.max_outer_sampling,
            block_size: self.config.block_size,
            stratified_coordinates: stratified,
            influence,
            allocation_weights: weights,
            steps,
        })
    }
}

/// Uniform direction restricted to orthant `index` of the stratified coordinates.
fn orthant_direction<R: rand::Rng + ?Sized>(
    dimension: usize,
    stratified: &[usize],
    index: usize,
    rng: &mut R,
) -> Vec<f64> {
    let mut u = uniform_direction(dimension, rng);
    for (bit, &k) in stratified.iter().enumerate() {
        let negative = index & (1 << bit) != 0;
        u[k] = if negative { -u[k].abs() } else { u[k].abs() };
    }
    u
}

/// Integer allocation of `budget` proportional to `weights` (largest remainder).
fn allocate(weights: &[f64], budget: usize) -> Vec<usize> {
    let exact: Vec<f64> = weights.iter().map(|w| w * budget as f64).collect();
    let mut counts: Vec<usize> = exact.iter().map(|e| e.floor() as usize).collect();
    let rest = budget.saturating_sub(counts.iter().sum());
    let mut order: Vec<usize> = (0..weights.len()).filter(|&i| weights[i] > 0.0).collect();
    order.sort_by(|&a, &b| (exact[b] - exact[b].floor()).total_cmp(&(exact[a] - exact[a].floor())));
    if !order.is_empty() {
        for &i in order.iter().cycle().take(rest) {
            counts[i] += 1;
        }
    }
    counts
}

/// `w_i ∝ sigma_i`; uniform when every stratum has zero spread.
fn neyman_weights(strata: &[StratumEstimate]) -> Vec<f64> {
    let total: f64 = strata.iter().map(|s| s.sigma).sum();
    if total > 0.0 {
        strata.iter().map(|s| s.sigma / total).collect()
    } else {
        vec![1.0 / strata.len() as f64; strata.len()]
    }
}

/// `T_k = 1/2 sum_i |P_i - P_(i xor 2^k)|` over fully stratified strata.
fn influence_statistic(strata: &[StratumEstimate], dimension: usize) -> Vec<f64> {
    (0..dimension)
        .map(|k| {
            0.5 * (0..strata.len())
                .map(|i| (strata[i].probability - strata[i ^ (1 << k)].probability).abs())
                .sum::<f64>()
        })
        .collect()
}

/// Top `max_dimension` coordinates by influence, among those with `T_k > 0`.
fn reduce_coordinates(influence: &[f64], max_dimension: usize) -> Result<Vec<usize>> {
    let mut ranked: Vec<usize> = (0..influence.len()).filter(|&k| influence[k] > 0.0).collect();
    if ranked.is_empty() {
        return Err(Error::Computation(
            "no coordinate influences the event probability, all orthant estimates are equal"
                .into(),
        ));
    }
    ranked.sort_by(|&a, &b| influence[b].total_cmp(&influence[a]));
    ranked.truncate(max_dimension);
    ranked.sort_unstable();
    Ok(ranked)
}

/// Merge fully stratified strata onto the orthants of `kept` coordinates.
///
/// Merged strata are equally likely, so the merged probability is their mean and
/// the merged spread follows the law of total variance.
fn project_strata(strata: &[StratumEstimate], kept: &[usize]) -> Vec<StratumEstimate> {
    let mut groups: Vec<Vec<StratumEstimate>> = vec![Vec::new(); 1 << kept.len()];
    for (i, s) in strata.iter().enumerate() {
        let j =
            kept.iter().enumerate().fold(0usize, |acc, (bit, &k)| acc | (((i >> k) & 1) << bit));
        groups[j].push(*s);
    }
    groups
        .iter()
        .map(|g| {
            let n = g.len() as f64;
            let p = g.iter().map(|s| s.probability).sum::<f64>() / n;
            let within = g.iter().map(|s| s.sigma * s.sigma).sum::<f64>() / n;
            let between = g.iter().map(|s| (s.probability - p).powi(2)).sum::<f64>() / n;
            let variance_of_mean = g.iter().map(|s| s.variance_of_mean).sum::<f64>() / (n * n);
            StratumEstimate { probability: p, sigma: (within + between).sqrt(), variance_of_mean }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::block_rng;
    use ns_core::{ComparisonOperator, FnModel, Model};
    use ns_prob::math::std_normal_cdf;
    use ns_prob::{Distribution, Normal};

    fn linear_event(dim: usize, beta: f64) -> ThresholdEvent {
        let d: Arc<dyn Distribution> = Arc::new(Normal::standard(dim).unwrap());
        let m: Arc<dyn Model> =
            Arc::new(FnModel::new(dim, move |x: &[f64]| beta - (x[0] + x[1]) / 2f64.sqrt()));
        ThresholdEvent::new(d, m, ComparisonOperator::Less, 0.0).unwrap()
    }

    fn config() -> AdsConfig {
        AdsConfig { block_size: 100, max_outer_sampling: 40, ..Default::default() }
    }

    #[test]
    fn test_linear_limit_state() {
        let beta = 2.5;
        let mut ads =
            AdaptiveDirectionalStratification::new(linear_event(2, beta), config()).unwrap();
        let r = ads.run().unwrap();
        let exact = std_normal_cdf(-beta);
        assert!(
            ((r.probability_estimate - exact) / exact).abs() < 0.2,
            "p={} exact={}",
            r.probability_estimate,
            exact
        );
        assert_eq!(r.steps.len(), 2);
        assert_eq!(r.steps[0].allocation, vec![500; 4]);
        assert_eq!(r.steps[1].allocation.iter().sum::<usize>(), 2000);
        // Only the all-positive orthant sees the failure domain.
        assert!(r.allocation_weights[0] > 0.5);
    }

    #[test]
    fn test_partial_stratification_keeps_influential_coordinates() {
        let cfg =
            AdsConfig { partial_stratification: true, max_stratification_dimension: 2, ..config() };
        let mut ads = AdaptiveDirectionalStratification::new(linear_event(4, 2.0), cfg).unwrap();
        let r = ads.run().unwrap();
        assert_eq!(r.stratified_coordinates, vec![0, 1]);
        assert_eq!(r.steps[1].allocation.len(), 4);
        let t = r.influence.unwrap();
        assert!(t[0] > t[2] && t[1] > t[3]);
        assert_eq!(ads.history().len(), 2);
    }

    #[test]
    fn test_reduction_without_influence_raises() {
        let d: Arc<dyn Distribution> = Arc::new(Normal::standard(2).unwrap());
        let m: Arc<dyn Model> = Arc::new(FnModel::new(2, |_: &[f64]| 1.0));
        let event = ThresholdEvent::new(d, m, ComparisonOperator::Less, 0.0).unwrap();
        let cfg = AdsConfig { partial_stratification: true, ..config() };
        let r = AdaptiveDirectionalStratification::new(event, cfg).unwrap().run();
        assert!(matches!(r, Err(Error::Computation(_))));
    }

    #[test]
    fn test_allocate_largest_remainder() {
        assert_eq!(allocate(&[0.5, 0.25, 0.25], 10), vec![5, 3, 2]);
        assert_eq!(allocate(&[1.0, 0.0], 7), vec![7, 0]);
        assert_eq!(allocate(&[1.0 / 3.0; 3], 10).iter().sum::<usize>(), 10);
    }

    #[test]
    fn test_orthant_direction_signs() {
        let mut rng = block_rng(3, 0);
        for i in 0..4 {
            let u = orthant_direction(3, &[0, 2], i, &mut rng);
            assert_eq!(u[0] < 0.0, i & 1 != 0);
            assert_eq!(u[2] < 0.0, i & 2 != 0);
            assert!((u.iter().map(|v| v * v).sum::<f64>() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_projection_preserves_mean() {
        let strata: Vec<StratumEstimate> = [0.1, 0.3, 0.0, 0.2]
            .iter()
            .map(|&p| StratumEstimate { probability: p, sigma: 0.1, variance_of_mean: 1e-4 })
            .collect();
        let merged = project_strata(&strata, &[0]);
        assert_eq!(merged.len(), 2);
        assert!((merged[0].probability - 0.05).abs() < 1e-12);
        assert!((merged[1].probability - 0.25).abs() < 1e-12);
        let before = strata.iter().map(|s| s.probability).sum::<f64>() / 4.0;
        let after = merged.iter().map(|s| s.probability).sum::<f64>() / 2.0;
        assert!((before - after).abs() < 1e-12);
    }

    #[test]
    fn test_validation() {
        assert!(AdsConfig { gamma: vec![], ..config() }.validate().is_err());
        assert!(AdsConfig { gamma: vec![0.5, -0.1], ..config() }.validate().is_err());
        // 4 orthants need at least 8 directions in step 0.
        let cfg = AdsConfig { block_size: 1, max_outer_sampling: 10, ..Default::default() };
        assert!(AdaptiveDirectionalStratification::new(linear_event(2, 1.0), cfg).is_err());
    }
}
