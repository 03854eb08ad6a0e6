//! Error types for stripstat-core.

use thiserror::Error;

/// Result type alias for stripstat operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for stripstat operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (geometry, mapping or analysis parameters).
    ///
    /// Fatal: a run never starts with an invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Unknown detector region.
    #[error("unknown region: {0}")]
    UnknownRegion(u32),

    /// Event decoding error.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Errors that invalidate a single event.
///
/// The offending event is skipped and counted; processing continues.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Channel and timestamp arrays differ in length.
    #[error("hit arrays differ in length: {channels} channels, {times} timestamps")]
    LengthMismatch { channels: usize, times: usize },

    /// Event numbers are never negative.
    #[error("negative event number: {0}")]
    NegativeEventNumber(i64),

    /// Timestamp is NaN, infinite or negative.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(f64),
}

/// Gaussian peak fit failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    /// Not enough filled bins in the fit range.
    #[error("too few filled bins for fit: {found} < {required}")]
    TooFewPoints { found: usize, required: usize },

    /// Normal equations could not be solved.
    #[error("singular normal matrix")]
    Singular,

    /// Parameters left the finite domain or sigma collapsed.
    #[error("fit diverged")]
    Diverged,

    /// Iteration limit reached without convergence.
    #[error("no convergence after {0} iterations")]
    NotConverged(usize),
}
