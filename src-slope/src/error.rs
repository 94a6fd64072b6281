//! Error taxonomy of the fitting entry points.
//!
//! Non-convergence is intentionally absent: hitting the iteration caps is
//! reported through the pass counts and final duality gaps on the results,
//! not as an error.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SlopeError {
    /// Incompatible dimensions between inputs (X rows vs Y rows, lambda
    /// length vs predictor count, fold indices vs sample count).
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A value outside its admissible domain, or an unknown configuration
    /// string.
    #[error("invalid argument: {0}")]
    Domain(String),

    /// NaN or infinity produced during optimization. Fatal for the current
    /// path step; the path keeps what was accumulated before the failure.
    #[error("numerical failure: {0}")]
    Numerical(String),
}

pub type Result<T> = std::result::Result<T, SlopeError>;
