//! Probability building blocks for NextStat.
//!
//! This crate hosts the distribution library consumed by the simulation engine:
//! - the multivariate [`Distribution`] trait (sampling, log-density, functional
//!   parameter updates, iso-probabilistic transforms)
//! - one-dimensional [`Marginal`] laws and their [`ComposedDistribution`]
//! - the independent multivariate [`Normal`] and finite [`Mixture`]s
//! - scalar helpers (Normal/Exponential/Weibull/Binomial densities and CDFs)
//! - small numeric helpers (stable log-sum-exp, standard Normal CDF/quantile)

pub mod binomial;
pub mod composed;
pub mod distribution;
pub mod exponential;
pub mod marginal;
pub mod math;
pub mod mixture;
pub mod normal;
pub mod weibull;

pub use composed::ComposedDistribution;
pub use distribution::{Distribution, sample_from_standard, sample_to_standard};
pub use marginal::Marginal;
pub use mixture::Mixture;
pub use normal::Normal;
