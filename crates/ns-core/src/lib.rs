//! # ns-core
//!
//! Core types and traits shared by the NextStat rare-event simulation crates:
//! the error type, the [`Sample`] point-set container, the event
//! [`ComparisonOperator`] and the [`Model`] seam through which the engine
//! evaluates limit-state functions.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Error type and `Result` alias.
pub mod error;
/// Model trait and closure adapter.
pub mod traits;
/// Sample container, comparison operator, derived values.
pub mod types;

pub use error::{Error, Result};
pub use traits::{FnModel, Model};
pub use types::{ComparisonOperator, DerivedValue, Sample};

/// Crate version, shared by the CLI `version` command.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
