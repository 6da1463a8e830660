//! Study files: one simulation declared in JSON.
//!
//! ```json
//! {
//!   "marginals": [
//!     {"type": "normal", "mu": 0.0, "sigma": 1.0},
//!     {"type": "normal", "mu": 0.0, "sigma": 1.0}
//!   ],
//!   "model": {"type": "hyperplane", "dimension": 2, "beta": 3.0},
//!   "operator": "less",
//!   "threshold": 0.0,
//!   "algorithm": {"type": "subset", "config": {"block_size": 100, "max_outer_sampling": 20}},
//!   "seed": 7
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use ns_core::{ComparisonOperator, DerivedValue};
use ns_prob::{ComposedDistribution, Distribution, Marginal, Normal};
use ns_simulation::{
    AdaptiveDirectionalStratification, AdsConfig, CrossEntropyConfig, CrossEntropyResult,
    CrudeSampler, DirectionalSampler, EventSampler, ExpectationSimulation, Experiment,
    ImportanceSampler, ModelSpec, Nais, NaisUpdate, PhysicalSpaceCrossEntropy, PhysicalSpaceUpdate,
    RootStrategy, SamplingStrategy, SimulationConfig, SimulationDriver, StandardSpaceCrossEntropy,
    StandardSpaceUpdate, SubsetConfig, SubsetSampling, ThresholdEvent,
};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Clone, Deserialize)]
pub struct StudySpec {
    /// Independent input marginals.
    pub marginals: Vec<Marginal>,
    pub model: ModelSpec,
    #[serde(default = "default_operator")]
    pub operator: ComparisonOperator,
    #[serde(default)]
    pub threshold: f64,
    pub algorithm: AlgorithmSpec,
    /// Overrides the seed of the algorithm configuration.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_operator() -> ComparisonOperator {
    ComparisonOperator::Less
}

/// Gaussian auxiliary density with independent components.
#[derive(Debug, Clone, Deserialize)]
pub struct GaussianSpec {
    pub mean: Vec<f64>,
    pub sigma: Vec<f64>,
}

impl GaussianSpec {
    fn build(&self) -> Result<Arc<dyn Distribution>> {
        Ok(Arc::new(Normal::new(self.mean.clone(), self.sigma.clone())?))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlgorithmSpec {
    /// Crude sampling of the event probability.
    MonteCarlo {
        #[serde(default)]
        experiment: Experiment,
        #[serde(default)]
        config: SimulationConfig,
    },
    /// Mean of the model output; `operator` and `threshold` are ignored.
    Expectation {
        #[serde(default)]
        experiment: Experiment,
        #[serde(default)]
        config: SimulationConfig,
    },
    Importance {
        auxiliary: GaussianSpec,
        #[serde(default)]
        config: SimulationConfig,
    },
    Directional {
        #[serde(default)]
        root_strategy: RootStrategy,
        #[serde(default)]
        sampling_strategy: SamplingStrategy,
        #[serde(default)]
        config: SimulationConfig,
    },
    Subset {
        #[serde(default)]
        config: SubsetConfig,
    },
    CrossEntropyStandard {
        #[serde(default)]
        config: CrossEntropyConfig,
    },
    /// Cross-entropy on a Gaussian auxiliary density in the physical space.
    /// `active_parameters` index the interleaved `(mu_0, sigma_0, mu_1, ...)` vector.
    CrossEntropyPhysical {
        auxiliary: GaussianSpec,
        active_parameters: Vec<usize>,
        bounds: Vec<(f64, f64)>,
        #[serde(default)]
        config: CrossEntropyConfig,
    },
    Nais {
        #[serde(default)]
        config: CrossEntropyConfig,
    },
    Ads {
        #[serde(default)]
        config: AdsConfig,
    },
}

impl AlgorithmSpec {
    pub fn name(&self) -> &'static str {
        match self {
            AlgorithmSpec::MonteCarlo { .. } => "monte_carlo",
            AlgorithmSpec::Expectation { .. } => "expectation",
            AlgorithmSpec::Importance { .. } => "importance",
            AlgorithmSpec::Directional { .. } => "directional",
            AlgorithmSpec::Subset { .. } => "subset",
            AlgorithmSpec::CrossEntropyStandard { .. } => "cross_entropy_standard",
            AlgorithmSpec::CrossEntropyPhysical { .. } => "cross_entropy_physical",
            AlgorithmSpec::Nais { .. } => "nais",
            AlgorithmSpec::Ads { .. } => "ads",
        }
    }

    fn override_seed(&mut self, seed: u64) {
        match self {
            AlgorithmSpec::MonteCarlo { config, .. }
            | AlgorithmSpec::Expectation { config, .. }
            | AlgorithmSpec::Importance { config, .. }
            | AlgorithmSpec::Directional { config, .. } => config.seed = seed,
            AlgorithmSpec::Subset { config } => config.seed = seed,
            AlgorithmSpec::CrossEntropyStandard { config }
            | AlgorithmSpec::CrossEntropyPhysical { config, .. }
            | AlgorithmSpec::Nais { config } => config.seed = seed,
            AlgorithmSpec::Ads { config } => config.seed = seed,
        }
    }
}

pub fn read_study(path: &Path) -> Result<StudySpec> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn derived(v: DerivedValue) -> serde_json::Value {
    v.value().map_or(serde_json::Value::Null, |x| json!(x))
}

fn driver_json(mut driver: SimulationDriver) -> Result<serde_json::Value> {
    let r = driver.run()?;
    Ok(json!({
        "result": r,
        "coefficient_of_variation": derived(r.coefficient_of_variation()),
        "standard_deviation": r.standard_deviation(),
        "sample_size": r.sample_size(),
    }))
}

fn cross_entropy_json(r: &CrossEntropyResult) -> serde_json::Value {
    json!({
        "probability_estimate": r.probability_estimate,
        "variance_estimate": r.variance_estimate,
        "outer_sampling": r.outer_sampling,
        "block_size": r.block_size,
        "thresholds": r.thresholds,
        "target_reached": r.target_reached,
        "iterations": r.iterations(),
        "auxiliary_parameters": r.auxiliary_distribution().parameters(),
        "samples": r.samples,
        "coefficient_of_variation": derived(r.coefficient_of_variation()),
        "standard_deviation": r.standard_deviation(),
    })
}

/// Run the study and return its JSON report.
pub fn run_study(spec: StudySpec) -> Result<serde_json::Value> {
    let StudySpec { marginals, model, operator, threshold, mut algorithm, seed } = spec;
    if let Some(seed) = seed {
        algorithm.override_seed(seed);
    }
    let name = algorithm.name();

    let distribution: Arc<dyn Distribution> = Arc::new(ComposedDistribution::new(marginals)?);
    let model = model.build()?;
    tracing::info!(
        algorithm = name,
        dimension = distribution.dimension(),
        model = model.name(),
        "starting study"
    );

    let report = match algorithm {
        AlgorithmSpec::Expectation { experiment, config } => {
            let mut sim = ExpectationSimulation::new(distribution, model, experiment)?;
            sim.driver_mut().set_config(config)?;
            let r = sim.run()?;
            json!({
                "result": r,
                "coefficient_of_variation": derived(r.coefficient_of_variation()),
                "standard_deviation": r.standard_deviation(),
            })
        }
        algorithm => {
            let event = ThresholdEvent::new(distribution, model, operator, threshold)?;
            run_event(event, algorithm)?
        }
    };

    tracing::info!(algorithm = name, "study complete");
    Ok(json!({ "algorithm": name, "report": report }))
}

fn run_event(event: ThresholdEvent, algorithm: AlgorithmSpec) -> Result<serde_json::Value> {
    match algorithm {
        AlgorithmSpec::MonteCarlo { experiment, config } => {
            let sampler = CrudeSampler::new(&event, experiment)?;
            driver_json(SimulationDriver::with_config(EventSampler::from(sampler), config)?)
        }
        AlgorithmSpec::Importance { auxiliary, config } => {
            let sampler = ImportanceSampler::new(event, auxiliary.build()?)?;
            driver_json(SimulationDriver::with_config(EventSampler::from(sampler), config)?)
        }
        AlgorithmSpec::Directional { root_strategy, sampling_strategy, config } => {
            let sampler = DirectionalSampler::new(event, root_strategy, sampling_strategy)?;
            driver_json(SimulationDriver::with_config(EventSampler::from(sampler), config)?)
        }
        AlgorithmSpec::Subset { config } => {
            let r = SubsetSampling::new(event, config)?.run()?;
            Ok(json!({
                "result": r,
                "thresholds": r.thresholds(),
                "coefficient_of_variation": derived(r.coefficient_of_variation()),
                "standard_deviation": r.standard_deviation(),
            }))
        }
        AlgorithmSpec::CrossEntropyStandard { config } => {
            let r = StandardSpaceCrossEntropy::new(event, StandardSpaceUpdate, config)?.run()?;
            Ok(cross_entropy_json(&r))
        }
        AlgorithmSpec::CrossEntropyPhysical { auxiliary, active_parameters, bounds, config } => {
            let update = PhysicalSpaceUpdate::new(auxiliary.build()?, active_parameters, bounds)?;
            let r = PhysicalSpaceCrossEntropy::new(event, update, config)?.run()?;
            Ok(cross_entropy_json(&r))
        }
        AlgorithmSpec::Nais { config } => {
            let r = Nais::new(event, NaisUpdate, config)?.run()?;
            Ok(cross_entropy_json(&r))
        }
        AlgorithmSpec::Ads { config } => {
            let r = AdaptiveDirectionalStratification::new(event, config)?.run()?;
            Ok(json!({
                "result": r,
                "coefficient_of_variation": derived(r.coefficient_of_variation()),
                "standard_deviation": r.standard_deviation(),
            }))
        }
        AlgorithmSpec::Expectation { .. } => {
            anyhow::bail!("expectation studies do not define an event")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn study(algorithm: &str) -> StudySpec {
        serde_json::from_value(json!({
            "marginals": [
                {"type": "normal", "mu": 0.0, "sigma": 1.0},
                {"type": "normal", "mu": 0.0, "sigma": 1.0}
            ],
            "model": {"type": "hyperplane", "dimension": 2, "beta": 2.0},
            "algorithm": serde_json::from_str::<serde_json::Value>(algorithm).unwrap(),
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let s = study(r#"{"type": "monte_carlo"}"#);
        assert_eq!(s.operator, ComparisonOperator::Less);
        assert_eq!(s.threshold, 0.0);
        assert!(s.seed.is_none());
        match s.algorithm {
            AlgorithmSpec::MonteCarlo { experiment, config } => {
                assert_eq!(experiment, Experiment::MonteCarlo);
                assert_eq!(config, SimulationConfig::default());
            }
            other => panic!("unexpected algorithm {:?}", other),
        }
    }

    #[test]
    fn test_seed_override() {
        let mut s = study(r#"{"type": "nais", "config": {"seed": 1}}"#);
        s.algorithm.override_seed(99);
        match s.algorithm {
            AlgorithmSpec::Nais { config } => assert_eq!(config.seed, 99),
            other => panic!("unexpected algorithm {:?}", other),
        }
    }

    #[test]
    fn test_subset_report() {
        let s =
            study(r#"{"type": "subset", "config": {"block_size": 100, "max_outer_sampling": 10}}"#);
        let v = run_study(s).unwrap();
        assert_eq!(v["algorithm"], "subset");
        let p = v["report"]["result"]["probability_estimate"].as_f64().unwrap();
        assert!(p > 0.0 && p < 0.1, "p={}", p);
        let last = v["report"]["thresholds"].as_array().unwrap().last().unwrap().as_f64();
        assert_eq!(last, Some(0.0));
    }

    #[test]
    fn test_expectation_report() {
        let s = study(
            r#"{"type": "expectation", "config": {"block_size": 1000, "max_outer_sampling": 10}}"#,
        );
        let v = run_study(s).unwrap();
        // E[2 - (X1 + X2) / sqrt(2)] = 2.
        let mean = v["report"]["result"]["mean"].as_f64().unwrap();
        assert!((mean - 2.0).abs() < 0.1, "mean={}", mean);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut s = study(r#"{"type": "monte_carlo"}"#);
        s.model = ModelSpec::Hyperplane { dimension: 3, beta: 2.0 };
        assert!(run_study(s).is_err());
    }

    #[test]
    fn test_unknown_algorithm() {
        let v = json!({
            "marginals": [{"type": "normal", "mu": 0.0, "sigma": 1.0}],
            "model": {"type": "hyperplane", "dimension": 1, "beta": 2.0},
            "algorithm": {"type": "markov_chain"},
        });
        assert!(serde_json::from_value::<StudySpec>(v).is_err());
    }
}
