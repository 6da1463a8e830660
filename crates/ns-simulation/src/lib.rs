//! # ns-simulation
//!
//! Adaptive rare-event Monte-Carlo simulation for NextStat.
//!
//! This crate provides:
//! - a block-wise simulation driver with streaming mean/variance, stopping rules,
//!   progress/stop callbacks and a convergence history
//! - crude Monte Carlo (plain, LHS, QMC), importance and directional sampling
//! - multi-stage adaptive algorithms: subset sampling, cross-entropy importance
//!   sampling (standard and physical space), NAIS and adaptive directional
//!   stratification
//! - order-statistics confidence bounds on quantiles (Wilks)
//!
//! ## Architecture
//!
//! The engine only sees a [`ThresholdEvent`]: an `ns_prob::Distribution`, an
//! `ns_core::Model` and a comparison against a threshold. Model evaluation is
//! parallel inside a block (rayon); every random draw comes from a counter-based
//! stream so a fixed seed reproduces a run exactly, whatever the thread count.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Shared pieces of the staged algorithms: quantiles, thresholds, likelihood ratios.
pub mod adaptive;
/// Adaptive directional stratification.
pub mod ads;
/// Cross-entropy importance sampling.
pub mod cross_entropy;
/// Block-wise simulation driver.
pub mod driver;
/// Streaming mean/variance over blocks.
pub mod estimator;
/// Threshold events and parallel evaluation.
pub mod event;
/// Convergence history.
pub mod history;
/// Reference limit states.
pub mod models;
/// Non-parametric adaptive importance sampling.
pub mod nais;
/// L-BFGS-B optimizer for auxiliary-density refits.
pub mod optimizer;
/// Order-statistics bounds on quantiles.
pub mod quantile_confidence;
/// Driver results.
pub mod result;
/// Counter-based random streams.
pub mod rng;
/// Root localisation along rays.
pub mod root_strategy;
/// Block samplers of the driver.
pub mod sampler;
/// Direction sets for directional sampling.
pub mod sampling_strategy;
/// Scalar root solver.
pub mod solver;
/// Stopping rules and callbacks.
pub mod stopping;
/// Subset sampling.
pub mod subset;

pub use ads::{AdaptiveDirectionalStratification, AdsConfig, AdsResult};
pub use cross_entropy::{
    AuxiliaryDensityUpdate, CrossEntropyConfig, CrossEntropyImportanceSampling, CrossEntropyResult,
    PhysicalSpaceCrossEntropy, PhysicalSpaceUpdate, SamplingSpace, StandardSpaceCrossEntropy,
    StandardSpaceUpdate,
};
pub use driver::{DriverState, ExpectationSimulation, SimulationConfig, SimulationDriver};
pub use estimator::{RunningEstimate, RunningEstimator};
pub use event::ThresholdEvent;
pub use history::ConvergenceHistory;
pub use models::{FourBranchModel, LinearModel, ModelSpec, QuadraticModel};
pub use nais::{Nais, NaisResult, NaisUpdate};
pub use quantile_confidence::{QuantileConfidence, Wilks};
pub use result::{ExpectationSimulationResult, ProbabilitySimulationResult};
pub use root_strategy::{RootSearch, RootStrategy};
pub use sampler::{
    BlockSampler, CrudeSampler, DirectionalSampler, EventSampler, Experiment, ImportanceSampler,
};
pub use sampling_strategy::SamplingStrategy;
pub use stopping::{StoppingConfig, Termination};
pub use subset::{SubsetConfig, SubsetSampling, SubsetSamplingResult};
