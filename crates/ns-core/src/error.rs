//! Error types for NextStat

use thiserror::Error;

/// NextStat error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error: bad dimensions, out-of-range probabilities, non-positive sizes.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A derived quantity has no meaningful value (e.g. a probability outside `[0, 1]`).
    #[error("Not defined: {0}")]
    NotDefined(String),

    /// The configured time budget was exhausted before a terminal state was reached.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The stop callback requested an abort.
    #[error("Stopped by user: {0}")]
    UserStopped(String),

    /// Computation error: numerical degeneracy or a tripped internal guard.
    #[error("Computation error: {0}")]
    Computation(String),

    /// Not implemented
    #[error("Not implemented: {0}")]
    NotImplemented(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
